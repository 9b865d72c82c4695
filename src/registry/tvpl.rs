//! Secondary registry client (thuvienphapluat.vn tax-code directory).
//!
//! Search is a plain GET with the identifier in the query string; results
//! come back as a table of candidate rows, each linking to a detail view
//! with a single keyed table. Among multiple candidates the row whose
//! identifier cell matches digit-for-digit wins; with no exact match the
//! first row is used - a documented pragmatic default, not a relevance
//! ranking.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::browser::BrowserSession;
use crate::config::SecondaryRegistryConfig;
use crate::error::LookupError;
use crate::normalize::digits_only;
use crate::record::KvRecord;
use crate::registry::{absent_as_no_results, cell_text, parse_detail_tables, RegistryClient};

/// Pure HTML-in/URL-out result-row selection, split out from the client so
/// the tie-break rules are testable without a browser.
struct ResultPicker {
    base: Url,
    result_table: Selector,
    result_rows: Vec<Selector>,
    identifier_cell: Selector,
    detail_links: Vec<Selector>,
}

impl ResultPicker {
    fn from_config(config: &SecondaryRegistryConfig) -> Result<Self> {
        let parse = |s: &str| Selector::parse(s).map_err(|_| anyhow!("invalid selector: {s}"));
        Ok(Self {
            base: Url::parse(&config.base_url)?,
            result_table: parse(&config.result_table_selector)?,
            result_rows: config
                .result_row_selectors
                .iter()
                .map(|s| parse(s))
                .collect::<Result<_>>()?,
            identifier_cell: parse(&config.identifier_cell_selector)?,
            detail_links: config
                .detail_link_selectors
                .iter()
                .map(|s| parse(s))
                .collect::<Result<_>>()?,
        })
    }

    /// Pick the detail href out of a results page: exact identifier match
    /// first, else the first candidate row.
    fn pick_detail_url(&self, html: &str, identifier: &str) -> Result<String, LookupError> {
        let document = Html::parse_document(html);
        let table = document
            .select(&self.result_table)
            .next()
            .ok_or(LookupError::NoResults)?;

        let mut rows: Vec<ElementRef<'_>> = Vec::new();
        for selector in &self.result_rows {
            rows = table.select(selector).collect();
            if !rows.is_empty() {
                break;
            }
        }
        if rows.is_empty() {
            return Err(LookupError::NoResults);
        }

        let wanted = digits_only(identifier);
        let best = rows
            .iter()
            .find(|row| {
                !wanted.is_empty()
                    && row
                        .select(&self.identifier_cell)
                        .next()
                        .map(|cell| digits_only(&cell_text(cell)) == wanted)
                        .unwrap_or(false)
            })
            .copied()
            .unwrap_or(rows[0]);

        let href = self
            .detail_links
            .iter()
            .find_map(|selector| {
                best.select(selector)
                    .next()
                    .and_then(|a| a.value().attr("href"))
            })
            .ok_or_else(|| LookupError::NotFound("result row carries no detail link".into()))?;

        let absolute = self
            .base
            .join(href)
            .map_err(|e| LookupError::NotFound(format!("unresolvable detail link {href}: {e}")))?;
        Ok(absolute.into())
    }
}

pub struct TvplClient<'a> {
    session: &'a BrowserSession,
    config: SecondaryRegistryConfig,
    picker: ResultPicker,
    detail_table: Selector,
    table_wait: Duration,
}

impl<'a> TvplClient<'a> {
    pub fn new(
        session: &'a BrowserSession,
        config: &SecondaryRegistryConfig,
        table_wait: Duration,
    ) -> Result<Self> {
        Ok(Self {
            session,
            picker: ResultPicker::from_config(config)?,
            detail_table: Selector::parse(&config.detail_table_selector)
                .map_err(|_| anyhow!("invalid selector: {}", config.detail_table_selector))?,
            config: config.clone(),
            table_wait,
        })
    }

    fn fetch_detail_from_current_page(&self) -> Result<KvRecord, LookupError> {
        self.session
            .wait_for(&self.config.detail_table_selector, self.table_wait)?;

        let html = self.session.content()?;
        let parsed = parse_detail_tables(&html, &self.detail_table, 1, &self.config.key_prefix);
        if parsed.is_empty() {
            return Err(LookupError::NotFound("detail table empty".into()));
        }

        let mut record = KvRecord::new();
        record.insert(self.config.url_key.as_str(), self.session.current_url());
        for (key, value) in parsed.iter() {
            record.insert(key, value);
        }
        Ok(record)
    }
}

impl RegistryClient for TvplClient<'_> {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn fetch_by_link(&self, url: &str) -> Result<KvRecord, LookupError> {
        debug!("{}: fetch by link {url}", self.config.id);
        self.session.goto(url)?;
        self.fetch_detail_from_current_page()
    }

    fn search_by_identifier(&self, identifier: &str) -> Result<KvRecord, LookupError> {
        if identifier.is_empty() {
            return Err(LookupError::NoResults);
        }
        debug!("{}: search for {identifier}", self.config.id);

        let search_url = self.config.search_url_template.replace("{mst}", identifier);
        self.session.goto(&search_url)?;
        self.session
            .wait_for(&self.config.result_table_selector, self.table_wait)
            .map_err(absent_as_no_results)?;

        let html = self.session.content()?;
        let detail_url = self.picker.pick_detail_url(&html, identifier)?;

        self.session.goto(&detail_url)?;
        self.fetch_detail_from_current_page()
    }
}
