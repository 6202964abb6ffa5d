//! Admission rules and longest-prefix matching.
//!
//! A [`RuleTable`] answers one question: which [`AdmissionRule`], if any, governs a
//! call identified by `(method, path)`. Matching is a plain string prefix test on the
//! path (query string stripped) with a case-insensitive method comparison. The longest
//! matching prefix wins; ties go to the rule that appears first in the table. The
//! tie-break depends only on table order and carries no other priority meaning.

use std::fmt;
use std::time::Duration;

use tracing::warn;

/// Global pacing interval matching the service's documented 10 requests/second budget.
pub const DEFAULT_GLOBAL_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// One row of admission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRule {
    /// HTTP method, uppercase after normalization. Empty matches any method.
    pub method: String,
    /// Path prefix this rule governs. Must be non-empty.
    pub path_prefix: String,
    /// Minimum spacing between admissions; zero disables pacing for this rule.
    pub min_interval: Duration,
    /// Maximum outstanding admissions; zero disables concurrency limiting.
    pub max_concurrent: usize,
    /// Partition gate state by account when an account id is known.
    pub per_account: bool,
}

impl AdmissionRule {
    /// Rule for `method` calls under `path_prefix` with no limits yet attached.
    pub fn new(method: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_prefix: path_prefix.into(),
            min_interval: Duration::ZERO,
            max_concurrent: 0,
            per_account: false,
        }
    }

    /// Rule matching every method under `path_prefix`.
    pub fn any_method(path_prefix: impl Into<String>) -> Self {
        Self::new("", path_prefix)
    }

    /// Require at least `interval` between admissions.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Allow at most `max` admissions to be outstanding at once.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Keep separate pacing/concurrency state per account.
    pub fn per_account(mut self) -> Self {
        self.per_account = true;
        self
    }

    /// Whether this rule asks for interval pacing.
    pub fn is_paced(&self) -> bool {
        self.min_interval > Duration::ZERO
    }

    /// Whether this rule asks for a concurrency cap.
    pub fn is_bounded(&self) -> bool {
        self.max_concurrent > 0
    }

    /// Identity of the gate state this rule uses for `account`.
    ///
    /// The account only takes part when the rule is per-account and the id is non-empty.
    pub fn key_for(&self, account: Option<&str>) -> RuleKey {
        let account = match account {
            Some(id) if self.per_account && !id.is_empty() => Some(id.to_string()),
            _ => None,
        };
        RuleKey {
            method: self.method.to_ascii_uppercase(),
            path_prefix: self.path_prefix.clone(),
            account,
        }
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        (self.method.is_empty() || self.method.eq_ignore_ascii_case(method))
            && path.starts_with(self.path_prefix.as_str())
    }
}

/// Identity used to look up cached gate state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    method: String,
    path_prefix: String,
    account: Option<String>,
}

impl RuleKey {
    /// Uppercased method (empty for any-method rules).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path prefix of the rule this key was derived from.
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Account partition, if the rule is per-account and an account was supplied.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path_prefix)?;
        if let Some(account) = &self.account {
            write!(f, " {account}")?;
        }
        Ok(())
    }
}

/// Normalized, immutable set of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<AdmissionRule>,
}

impl RuleTable {
    /// Build a table, uppercasing methods and dropping rules with an empty prefix.
    pub fn new(rules: impl IntoIterator<Item = AdmissionRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|mut rule| {
                if rule.path_prefix.is_empty() {
                    warn!(
                        target: "turnstile::rule",
                        method = %rule.method,
                        "dropping admission rule with empty path prefix"
                    );
                    return None;
                }
                rule.method.make_ascii_uppercase();
                Some(rule)
            })
            .collect();
        Self { rules }
    }

    /// Table built from [`default_rules`].
    pub fn with_defaults() -> Self {
        Self::new(default_rules())
    }

    /// Rule governing `(method, path)`, if any.
    pub fn matching(&self, method: &str, path: &str) -> Option<&AdmissionRule> {
        let path = strip_query(path);
        let mut best: Option<&AdmissionRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(method, path)) {
            match best {
                // Strictly longer only, so the first of equal-length prefixes stays.
                Some(b) if b.path_prefix.len() >= rule.path_prefix.len() => {}
                _ => best = Some(rule),
            }
        }
        best
    }

    /// Rules in table order.
    pub fn rules(&self) -> &[AdmissionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<AdmissionRule> for RuleTable {
    fn from_iter<I: IntoIterator<Item = AdmissionRule>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Path with everything from the first `?` removed.
pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Per-endpoint limits documented for the Client Portal web API.
///
/// Not applied unless installed, e.g. through `LimiterSwitch::enable_defaults`.
pub fn default_rules() -> Vec<AdmissionRule> {
    const SECOND: Duration = Duration::from_secs(1);
    const FIVE_SECONDS: Duration = Duration::from_secs(5);
    const MINUTE: Duration = Duration::from_secs(60);
    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    vec![
        AdmissionRule::new("GET", "/fyi/unreadnumber").min_interval(SECOND),
        AdmissionRule::new("GET", "/fyi/settings").min_interval(SECOND),
        AdmissionRule::new("POST", "/fyi/settings").min_interval(SECOND),
        AdmissionRule::new("GET", "/fyi/disclaimer").min_interval(SECOND),
        AdmissionRule::new("PUT", "/fyi/disclaimer").min_interval(SECOND),
        AdmissionRule::new("GET", "/fyi/deliveryoptions").min_interval(SECOND),
        AdmissionRule::new("PUT", "/fyi/deliveryoptions/email").min_interval(SECOND),
        AdmissionRule::new("POST", "/fyi/deliveryoptions/device").min_interval(SECOND),
        AdmissionRule::new("DELETE", "/fyi/deliveryoptions").min_interval(SECOND),
        AdmissionRule::new("GET", "/fyi/notifications").min_interval(SECOND),
        AdmissionRule::new("GET", "/fyi/notifications/more").min_interval(SECOND),
        AdmissionRule::new("PUT", "/fyi/notifications").min_interval(SECOND),
        AdmissionRule::new("GET", "/iserver/account/orders")
            .min_interval(FIVE_SECONDS)
            .per_account(),
        AdmissionRule::new("GET", "/iserver/account/pnl/partitioned")
            .min_interval(FIVE_SECONDS)
            .per_account(),
        AdmissionRule::new("GET", "/iserver/account/trades")
            .min_interval(FIVE_SECONDS)
            .per_account(),
        AdmissionRule::new("GET", "/iserver/marketdata/history").max_concurrent(5),
        AdmissionRule::new("GET", "/iserver/marketdata/snapshot")
            .min_interval(Duration::from_millis(100)),
        AdmissionRule::new("GET", "/iserver/scanner/params").min_interval(FIFTEEN_MINUTES),
        AdmissionRule::new("POST", "/iserver/scanner/run").min_interval(SECOND),
        AdmissionRule::new("POST", "/pa/performance").min_interval(FIFTEEN_MINUTES).per_account(),
        AdmissionRule::new("POST", "/pa/summary").min_interval(FIFTEEN_MINUTES).per_account(),
        AdmissionRule::new("POST", "/pa/transactions").min_interval(FIFTEEN_MINUTES).per_account(),
        AdmissionRule::new("GET", "/portfolio/accounts").min_interval(FIVE_SECONDS),
        AdmissionRule::new("GET", "/portfolio/subaccounts").min_interval(FIVE_SECONDS),
        AdmissionRule::new("GET", "/sso/validate").min_interval(MINUTE),
        AdmissionRule::new("GET", "/tickle").min_interval(SECOND),
    ]
}
