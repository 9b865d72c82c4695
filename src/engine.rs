//! The resolution engine: an ordered fallback chain over registry and
//! name-lookup capabilities.
//!
//! Tiers run in fixed priority order, each at most once per row, with
//! early exit on the first success:
//!
//! 1. DirectLink - fetch the detail URL synthesized from the customer name
//! 2. NameRecovery - recover the registered name from lookup APIs,
//!    resynthesize the link, retry the fetch once
//! 3. PrimarySearch - drive the primary registry's search
//! 4. SecondarySearch - drive the secondary registry's search
//! 5. Exhausted - terminal failure carrying every tier's error in order
//!
//! The engine owns no I/O of its own; everything external arrives through
//! the injected capabilities, so the chain is testable with stubs.

use tracing::debug;

use crate::link::LinkSynthesizer;
use crate::name_api::NameLookup;
use crate::record::{CandidateRow, KvRecord, ResolutionOutcome, Tier, TierFailure};
use crate::registry::RegistryClient;

/// Name-recovery bookkeeping surfaced to the output sheet alongside the
/// outcome: which API answered, with what, and what went wrong.
#[derive(Debug, Clone, Default)]
pub struct ApiTrace {
    pub name: String,
    pub source: String,
    pub link: String,
    pub error: String,
}

/// Everything the orchestrator writes back for one row. `trail` holds every
/// tier failure observed before the terminal outcome, in tier order - on
/// exhaustion it equals the failure list inside the outcome, on success it
/// records what the earlier tiers tried, without blocking the success.
#[derive(Debug)]
pub struct RowResolution {
    pub outcome: ResolutionOutcome,
    pub api: ApiTrace,
    pub trail: Vec<TierFailure>,
}

pub struct ResolutionEngine<'a, P, S, N> {
    primary: &'a P,
    secondary: &'a S,
    names: &'a N,
    links: &'a LinkSynthesizer,
}

impl<'a, P, S, N> ResolutionEngine<'a, P, S, N>
where
    P: RegistryClient,
    S: RegistryClient,
    N: NameLookup,
{
    pub fn new(
        primary: &'a P,
        secondary: &'a S,
        names: &'a N,
        links: &'a LinkSynthesizer,
    ) -> Self {
        Self {
            primary,
            secondary,
            names,
            links,
        }
    }

    /// Run the chain for one row. Terminal: the outcome is never retried.
    pub async fn resolve(&self, row: &CandidateRow) -> RowResolution {
        let mut trail: Vec<TierFailure> = Vec::new();
        let mut api = ApiTrace::default();

        // Tier 1: DirectLink
        match &row.link {
            Some(url) => match self.primary.fetch_by_link(url) {
                Ok(record) => {
                    return self.link_success(record, Tier::DirectLink, "customer_link".into(), api, trail)
                }
                Err(e) => trail.push(TierFailure::new(Tier::DirectLink, e.to_string())),
            },
            None => trail.push(TierFailure::new(
                Tier::DirectLink,
                "no candidate link (identifier or name slug empty)",
            )),
        }

        // Tier 2: NameRecovery
        if row.identifier.is_empty() {
            trail.push(TierFailure::new(
                Tier::NameRecovery,
                "empty identifier, lookup refused",
            ));
        } else {
            let recovery = self.names.recover_name(&row.identifier).await;
            api.error = recovery.errors.join(" | ");

            match recovery.name {
                Some(found) => {
                    api.name = found.name.clone();
                    api.source = found.source.clone();
                    match self.links.synthesize(&row.identifier, &found.name) {
                        Some(url) => {
                            api.link = url.clone();
                            // One relink retry with the recovered name.
                            match self.primary.fetch_by_link(&url) {
                                Ok(record) => {
                                    return self.link_success(
                                        record,
                                        Tier::NameRecovery,
                                        format!("api_link({})", found.source),
                                        api,
                                        trail,
                                    )
                                }
                                Err(e) => trail
                                    .push(TierFailure::new(Tier::NameRecovery, e.to_string())),
                            }
                        }
                        None => trail.push(TierFailure::new(
                            Tier::NameRecovery,
                            "recovered name produced an empty slug",
                        )),
                    }
                }
                None => trail.push(TierFailure::new(
                    Tier::NameRecovery,
                    "no canonical name recovered from lookup APIs",
                )),
            }
        }

        // Tier 3: PrimarySearch
        match self.search_tier(self.primary, Tier::PrimarySearch, row) {
            Ok(record) => {
                return self.search_success(record, Tier::PrimarySearch, self.primary.id(), api, trail)
            }
            Err(failure) => trail.push(failure),
        }

        // Tier 4: SecondarySearch
        match self.search_tier(self.secondary, Tier::SecondarySearch, row) {
            Ok(record) => {
                return self.search_success(
                    record,
                    Tier::SecondarySearch,
                    self.secondary.id(),
                    api,
                    trail,
                )
            }
            Err(failure) => trail.push(failure),
        }

        // Tier 5: Exhausted
        debug!("chain exhausted for seq={} mst={}", row.seq, row.identifier);
        RowResolution {
            outcome: ResolutionOutcome::Failure {
                trail: trail.clone(),
            },
            api,
            trail,
        }
    }

    fn search_tier<C: RegistryClient>(
        &self,
        client: &C,
        tier: Tier,
        row: &CandidateRow,
    ) -> Result<KvRecord, TierFailure> {
        if row.identifier.is_empty() {
            return Err(TierFailure::new(tier, "empty identifier, search refused"));
        }
        client
            .search_by_identifier(&row.identifier)
            .map_err(|e| TierFailure::new(tier, e.to_string()))
    }

    /// Link-tier success: both link tiers land on the primary registry.
    fn link_success(
        &self,
        record: KvRecord,
        tier: Tier,
        source: String,
        api: ApiTrace,
        trail: Vec<TierFailure>,
    ) -> RowResolution {
        RowResolution {
            outcome: ResolutionOutcome::Success {
                record,
                tier,
                status: format!("ok_{}_link", self.primary.id()),
                source,
            },
            api,
            trail,
        }
    }

    fn search_success(
        &self,
        record: KvRecord,
        tier: Tier,
        registry_id: &str,
        api: ApiTrace,
        trail: Vec<TierFailure>,
    ) -> RowResolution {
        RowResolution {
            outcome: ResolutionOutcome::Success {
                record,
                tier,
                status: format!("ok_{registry_id}_search"),
                source: "fallback_search".into(),
            },
            api,
            trail,
        }
    }
}
