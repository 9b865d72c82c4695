//! Tax-code and text normalization.
//!
//! Vietnamese tax codes ("mã số thuế", MST) are 10 digits for a head office
//! and 13 digits for a branch, conventionally written with a dash after the
//! 10th digit. Input spreadsheets carry them in every imaginable shape:
//! stray whitespace, unicode dashes, Excel float artifacts. `normalize_mst`
//! folds all of that into the canonical form.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static NON_MST: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9\-]").expect("static regex"));
static THIRTEEN_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{13}$").expect("static regex"));
static TRAILING_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*$").expect("static regex"));

/// Canonicalize a raw tax-code string: strip whitespace, drop everything
/// outside `[0-9-]`, then insert the branch dash into 13-digit values.
/// Never fails; unusable input normalizes to the empty string, which all
/// downstream stages treat as "no identifier".
pub fn normalize_mst(raw: &str) -> String {
    let s = WHITESPACE.replace_all(raw.trim(), "");
    let s = NON_MST.replace_all(&s, "");
    fix_branch_dash(&s)
}

/// Insert the dash after the 10th digit of a 13-digit all-numeric code.
/// Anything else passes through untouched.
fn fix_branch_dash(mst: &str) -> String {
    if THIRTEEN_DIGITS.is_match(mst) {
        format!("{}-{}", &mst[..10], &mst[10..])
    } else {
        mst.to_string()
    }
}

/// Keep only the digits of an identifier, for equality checks against
/// registry search results that format the dash inconsistently.
pub fn digits_only(mst: &str) -> String {
    mst.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Collapse internal whitespace runs and trim.
pub fn clean_text(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Normalize a detail-table attribute key: collapse whitespace and strip a
/// trailing colon.
pub fn normalize_key(k: &str) -> String {
    let cleaned = clean_text(k);
    TRAILING_COLON.replace(&cleaned, "").to_string()
}

/// Expand well-known Vietnamese business abbreviations (CT -> CÔNG TY,
/// TNHH -> TRÁCH NHIỆM HỮU HẠN, ...) before slug generation. The whole
/// name is uppercased first and tokens are matched whole, so "Cty TNHH"
/// and "CTY tnhh" expand identically.
pub fn expand_abbreviations(name: &str, map: &HashMap<String, String>) -> String {
    let cleaned = clean_text(name);
    if cleaned.is_empty() {
        return String::new();
    }

    let upper = cleaned.to_uppercase();
    let mut out = String::with_capacity(upper.len());
    let mut token = String::new();

    let mut flush = |token: &mut String, out: &mut String| {
        if !token.is_empty() {
            match map.get(token.as_str()) {
                Some(full) => out.push_str(full),
                None => out.push_str(token),
            }
            token.clear();
        }
    };

    for ch in upper.chars() {
        if ch.is_whitespace() || matches!(ch, '-' | '/' | '.') {
            flush(&mut token, &mut out);
            out.push(ch);
        } else {
            token.push(ch);
        }
    }
    flush(&mut token, &mut out);

    out
}
