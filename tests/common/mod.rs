//! Shared stub capabilities for integration tests.
//!
//! The engine and orchestrator only see the capability traits, so the
//! whole chain is exercised here without a browser or network.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use mstfinder::error::LookupError;
use mstfinder::name_api::{NameLookup, NameRecovery, RecoveredName};
use mstfinder::record::KvRecord;
use mstfinder::registry::RegistryClient;

pub fn kv(pairs: &[(&str, &str)]) -> KvRecord {
    let mut record = KvRecord::new();
    for (k, v) in pairs {
        record.insert(*k, *v);
    }
    record
}

type LookupFn = Box<dyn Fn(&str) -> Result<KvRecord, LookupError> + Send + Sync>;

/// Registry stub with closure-driven behavior and call counters.
pub struct StubRegistry {
    id: &'static str,
    fetch: LookupFn,
    search: LookupFn,
    pub fetch_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl StubRegistry {
    pub fn new(
        id: &'static str,
        fetch: impl Fn(&str) -> Result<KvRecord, LookupError> + Send + Sync + 'static,
        search: impl Fn(&str) -> Result<KvRecord, LookupError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            fetch: Box::new(fetch),
            search: Box::new(search),
            fetch_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    /// A registry that fails every operation with `NotFound`.
    pub fn dead(id: &'static str) -> Self {
        Self::new(
            id,
            |_| Err(LookupError::NotFound("detail tables empty".into())),
            |_| Err(LookupError::NoResults),
        )
    }
}

impl RegistryClient for StubRegistry {
    fn id(&self) -> &str {
        self.id
    }

    fn fetch_by_link(&self, url: &str) -> Result<KvRecord, LookupError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        (self.fetch)(url)
    }

    fn search_by_identifier(&self, identifier: &str) -> Result<KvRecord, LookupError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        (self.search)(identifier)
    }
}

/// Name-lookup stub returning a fixed recovery result.
pub struct StubNames {
    recovery: NameRecovery,
    pub calls: AtomicUsize,
}

impl StubNames {
    pub fn recovering(name: &str, source: &str) -> Self {
        Self {
            recovery: NameRecovery {
                name: Some(RecoveredName {
                    name: name.to_string(),
                    source: source.to_string(),
                }),
                errors: Vec::new(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty_handed(errors: &[&str]) -> Self {
        Self {
            recovery: NameRecovery {
                name: None,
                errors: errors.iter().map(|e| e.to_string()).collect(),
            },
            calls: AtomicUsize::new(0),
        }
    }
}

impl NameLookup for StubNames {
    fn recover_name(&self, _identifier: &str) -> impl Future<Output = NameRecovery> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let recovery = self.recovery.clone();
        async move { recovery }
    }
}
