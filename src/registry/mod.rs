//! Registry client capability.
//!
//! One implementation per external source. Both operations are synchronous
//! and block the calling worker (there is exactly one worker by design);
//! neither retries internally - failed tiers fall through in the engine,
//! and only the programmatic API path owns a retry policy.

pub mod masothue;
pub mod tvpl;

pub use masothue::MasothueClient;
pub use tvpl::TvplClient;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::error::LookupError;
use crate::normalize::{clean_text, normalize_key};
use crate::record::KvRecord;

/// Capability boundary between the resolution engine and an external
/// registry. Tests substitute stub implementations.
pub trait RegistryClient {
    /// Stable source id used in status tags (`ok_<id>_link`).
    fn id(&self) -> &str;

    /// Load the page at `url` and parse the expected detail structure into
    /// a flat record. `NotFound` when the structure is absent, `Blocked`
    /// when a challenge survives the operator pause, `Timeout` on bounded
    /// waits expiring.
    fn fetch_by_link(&self, url: &str) -> Result<KvRecord, LookupError>;

    /// Drive the source's search entry point and extract the first matching
    /// result's detail record. Identifier equality picks among multiple
    /// candidates; `NoResults` when the search yields nothing.
    fn search_by_identifier(&self, identifier: &str) -> Result<KvRecord, LookupError>;
}

static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static selector"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static selector"));

/// Parse one keyed table (`<td>label</td><td>value</td>` rows) into
/// (key, value) pairs. Rows with fewer than two cells are skipped.
pub(crate) fn parse_kv_table(table: ElementRef<'_>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for row in table.select(&TR) {
        let cells: Vec<ElementRef<'_>> = row.select(&TD).collect();
        if cells.len() < 2 {
            continue;
        }
        let key = normalize_key(&cell_text(cells[0]));
        let value = clean_text(&cell_text(cells[1]));
        if !key.is_empty() {
            pairs.push((key, value));
        }
    }
    pairs
}

/// Parse up to `max_tables` detail tables out of a page into one record,
/// prefixing keys `{prefix}_t{n}_` so attributes from the two masothue
/// tables (or any source with several keyed tables) stay distinct.
pub(crate) fn parse_detail_tables(
    html: &str,
    table_selector: &Selector,
    max_tables: usize,
    prefix: &str,
) -> KvRecord {
    let document = Html::parse_document(html);
    let mut record = KvRecord::new();
    for (i, table) in document.select(table_selector).take(max_tables).enumerate() {
        for (key, value) in parse_kv_table(table) {
            record.insert(format!("{}_t{}_{}", prefix, i + 1, key), value);
        }
    }
    record
}

pub(crate) fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Map a structure-absent failure in the search flow to `NoResults`: the
/// search answered, it just led nowhere.
pub(crate) fn absent_as_no_results(err: LookupError) -> LookupError {
    match err {
        LookupError::NotFound(_) => LookupError::NoResults,
        other => other,
    }
}
