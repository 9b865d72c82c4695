//! Primary registry client (masothue.com).
//!
//! Business detail pages live at deterministic `/{mst}-{slug}` paths, so the
//! cheap path is a direct navigation; the fallback is the home-page search
//! box. Detail pages carry one or two keyed tables under the main section.

use anyhow::{anyhow, Result};
use scraper::Selector;
use std::time::Duration;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::PrimaryRegistryConfig;
use crate::error::LookupError;
use crate::record::KvRecord;
use crate::registry::{absent_as_no_results, parse_detail_tables, RegistryClient};

pub struct MasothueClient<'a> {
    session: &'a BrowserSession,
    config: PrimaryRegistryConfig,
    table_selector: Selector,
    table_wait: Duration,
}

impl<'a> MasothueClient<'a> {
    pub fn new(
        session: &'a BrowserSession,
        config: &PrimaryRegistryConfig,
        table_wait: Duration,
    ) -> Result<Self> {
        let table_selector = Selector::parse(&config.detail_table_selector)
            .map_err(|_| anyhow!("invalid selector: {}", config.detail_table_selector))?;
        Ok(Self {
            session,
            config: config.clone(),
            table_selector,
            table_wait,
        })
    }

    /// Parse the detail view the session is currently on. The record always
    /// leads with the canonical source URL.
    fn fetch_from_current_page(&self) -> Result<KvRecord, LookupError> {
        self.session
            .wait_for(&self.config.detail_table_selector, self.table_wait)?;

        let html = self.session.content()?;
        let parsed = parse_detail_tables(
            &html,
            &self.table_selector,
            self.config.max_detail_tables,
            &self.config.key_prefix,
        );
        if parsed.is_empty() {
            return Err(LookupError::NotFound("detail tables empty".into()));
        }

        let mut record = KvRecord::new();
        record.insert(self.config.url_key.as_str(), self.session.current_url());
        for (key, value) in parsed.iter() {
            record.insert(key, value);
        }
        Ok(record)
    }
}

impl RegistryClient for MasothueClient<'_> {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn fetch_by_link(&self, url: &str) -> Result<KvRecord, LookupError> {
        debug!("{}: fetch by link {url}", self.config.id);
        self.session.goto(url)?;
        self.fetch_from_current_page()
    }

    fn search_by_identifier(&self, identifier: &str) -> Result<KvRecord, LookupError> {
        if identifier.is_empty() {
            return Err(LookupError::NoResults);
        }
        debug!("{}: search for {identifier}", self.config.id);

        self.session.goto(&self.config.home_url)?;
        self.session
            .submit_search(&self.config.search_selector, identifier)?;
        // A search is the one interaction that can land on a fresh
        // challenge page even when the home page was clean.
        self.session
            .ensure_unchallenged(&format!("search for {identifier}"))?;

        // An exact-identifier search redirects straight to the detail view;
        // a missing detail structure here means the search found nothing.
        self.fetch_from_current_page().map_err(absent_as_no_results)
    }
}
