//! Registry of lazily created gates, keyed by [`RuleKey`].
//!
//! The lock is held only for lookup-or-insert. Callers wait on the returned gate
//! after the guard is gone, so unrelated keys never contend on bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::concurrency::ConcurrencyGate;
use crate::pacing::PacingGate;
use crate::rule::RuleKey;

/// Kind of gate stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GateKind {
    Pacing,
    Concurrency,
}

#[derive(Debug, Default)]
struct Gates {
    pacing: HashMap<RuleKey, Arc<PacingGate>>,
    concurrency: HashMap<RuleKey, Arc<ConcurrencyGate>>,
}

/// Gate state owned by one limiter. Entries are never evicted.
#[derive(Debug, Default)]
pub struct GateRegistry {
    inner: Mutex<Gates>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pacing gate for `key`, created with `interval` on first use.
    ///
    /// An existing gate keeps the interval it was created with.
    pub fn pacing(&self, key: &RuleKey, interval: Duration) -> Arc<PacingGate> {
        let mut gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = gates.pacing.get(key) {
            return gate.clone();
        }
        debug!(target: "turnstile::registry", key = %key, ?interval, "creating pacing gate");
        let gate = Arc::new(PacingGate::new(interval));
        gates.pacing.insert(key.clone(), gate.clone());
        gate
    }

    /// Concurrency gate for `key`, created with `max_concurrent` permits on first use.
    pub fn concurrency(&self, key: &RuleKey, max_concurrent: usize) -> Arc<ConcurrencyGate> {
        let mut gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = gates.concurrency.get(key) {
            return gate.clone();
        }
        debug!(
            target: "turnstile::registry",
            key = %key,
            max_concurrent,
            "creating concurrency gate"
        );
        let gate = Arc::new(ConcurrencyGate::new(max_concurrent));
        gates.concurrency.insert(key.clone(), gate.clone());
        gate
    }

    /// Existing pacing gate for `key`, without creating one.
    pub fn get_pacing(&self, key: &RuleKey) -> Option<Arc<PacingGate>> {
        let gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        gates.pacing.get(key).cloned()
    }

    /// Existing concurrency gate for `key`, without creating one.
    pub fn get_concurrency(&self, key: &RuleKey) -> Option<Arc<ConcurrencyGate>> {
        let gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        gates.concurrency.get(key).cloned()
    }

    /// Number of gates created so far, of either kind.
    pub fn len(&self) -> usize {
        let gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        gates.pacing.len() + gates.concurrency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of created gates sorted by key, then kind.
    pub fn snapshot(&self) -> Vec<(RuleKey, GateKind)> {
        let gates = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(RuleKey, GateKind)> = gates
            .pacing
            .keys()
            .map(|k| (k.clone(), GateKind::Pacing))
            .chain(gates.concurrency.keys().map(|k| (k.clone(), GateKind::Concurrency)))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::AdmissionRule;
    use std::sync::Mutex as StdMutex;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<StdMutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<StdMutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn key(prefix: &str, account: Option<&str>) -> RuleKey {
        AdmissionRule::new("GET", prefix).per_account().key_for(account)
    }

    #[test]
    fn same_key_returns_same_gate() {
        let registry = GateRegistry::new();
        let a = registry.pacing(&key("/a", None), Duration::from_secs(1));
        let b = registry.pacing(&key("/a", None), Duration::from_secs(9));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.interval(), Duration::from_secs(1), "first creation wins");

        let c = registry.concurrency(&key("/a", None), 3);
        let d = registry.concurrency(&key("/a", None), 7);
        assert!(Arc::ptr_eq(&c, &d));
        assert_eq!(d.max_concurrent(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn distinct_accounts_get_distinct_gates() {
        let registry = GateRegistry::new();
        let u1 = registry.concurrency(&key("/a", Some("U1")), 1);
        let u2 = registry.concurrency(&key("/a", Some("U2")), 1);
        assert!(!Arc::ptr_eq(&u1, &u2));
        assert!(registry.get_concurrency(&key("/a", Some("U3"))).is_none());
        assert!(registry.get_pacing(&key("/a", Some("U1"))).is_none());
    }

    #[test]
    fn snapshot_is_sorted() {
        let registry = GateRegistry::new();
        assert!(registry.is_empty());
        registry.concurrency(&key("/b", None), 1);
        registry.pacing(&key("/a", None), Duration::from_secs(1));
        registry.pacing(&key("/b", None), Duration::from_secs(1));

        let snapshot = registry.snapshot();
        let rendered: Vec<(String, GateKind)> =
            snapshot.into_iter().map(|(k, kind)| (k.to_string(), kind)).collect();
        assert_eq!(
            rendered,
            vec![
                ("GET /a".to_string(), GateKind::Pacing),
                ("GET /b".to_string(), GateKind::Pacing),
                ("GET /b".to_string(), GateKind::Concurrency),
            ]
        );
    }

    #[test]
    fn gate_creation_is_logged() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let writer = SharedWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(writer))
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = GateRegistry::new();
        registry.pacing(&key("/logged", Some("U9")), Duration::from_secs(1));
        registry.pacing(&key("/logged", Some("U9")), Duration::from_secs(1));

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("creating pacing gate").count(), 1);
        assert!(logs.contains("GET /logged U9"));
    }
}
