//! Data carriers for one resolution attempt: the input row, the parsed
//! registry record, and the terminal outcome of the fallback chain.

use serde::{Deserialize, Serialize};

/// One input row, immutable for the lifetime of its resolution attempt.
/// Only the fields the engine acts on are carried here; the orchestrator
/// keeps the full row (including opaque extra columns) in the sheet.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub seq: String,
    pub customer_id: String,
    pub display_name: String,
    /// Tax code as it appeared in the input.
    pub raw_identifier: String,
    /// Canonical tax code; empty means "no identifier, refuse to query".
    pub identifier: String,
    /// Candidate detail URL synthesized from the customer name, when both
    /// the identifier and the name slug were non-empty.
    pub link: Option<String>,
}

/// A flat, ordered attribute record parsed from a registry detail view.
/// Insertion order is preserved so output columns appear in the order the
/// source presented them; inserting an existing key overwrites its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvRecord(Vec<(String, String)>);

impl KvRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One stage of the ordered fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    DirectLink,
    NameRecovery,
    PrimarySearch,
    SecondarySearch,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::DirectLink => "direct_link",
            Tier::NameRecovery => "name_recovery",
            Tier::PrimarySearch => "primary_search",
            Tier::SecondarySearch => "secondary_search",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one tier failed. The full trail, in tier order, is the audit record
/// for manual triage of exhausted rows.
#[derive(Debug, Clone)]
pub struct TierFailure {
    pub tier: Tier,
    pub message: String,
}

impl TierFailure {
    pub fn new(tier: Tier, message: impl Into<String>) -> Self {
        Self {
            tier,
            message: message.into(),
        }
    }
}

/// Terminal result of the chain for one row. Never retried.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    Success {
        record: KvRecord,
        tier: Tier,
        /// Row status, e.g. `ok_masothue_link` or `ok_tvpl_search`.
        status: String,
        /// Provenance tag: `customer_link`, `api_link(<source>)`, or
        /// `fallback_search`.
        source: String,
    },
    Failure { trail: Vec<TierFailure> },
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResolutionOutcome::Success { .. })
    }
}

/// Join a failure trail into the single error cell written to the output.
pub fn join_trail(trail: &[TierFailure]) -> String {
    trail
        .iter()
        .map(|f| format!("{}={}", f.tier, f.message))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_record_preserves_insertion_order() {
        let mut r = KvRecord::new();
        r.insert("b", "2");
        r.insert("a", "1");
        r.insert("c", "3");
        let keys: Vec<_> = r.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_kv_record_insert_overwrites_in_place() {
        let mut r = KvRecord::new();
        r.insert("a", "1");
        r.insert("b", "2");
        r.insert("a", "9");
        assert_eq!(r.get("a"), Some("9"));
        assert_eq!(r.len(), 2);
        let keys: Vec<_> = r.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_trail_joins_in_tier_order() {
        let trail = vec![
            TierFailure::new(Tier::DirectLink, "timed out: load"),
            TierFailure::new(Tier::NameRecovery, "no canonical name recovered"),
        ];
        assert_eq!(
            join_trail(&trail),
            "direct_link=timed out: load | name_recovery=no canonical name recovered"
        );
    }
}
