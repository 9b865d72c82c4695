//! Candidate detail-URL synthesis.
//!
//! The primary registry serves business detail pages at a deterministic
//! path: `{base}/{mst}-{slug}`. Synthesizing that URL from the identifier
//! and the customer name lets the pipeline skip the search flow entirely
//! when the name on file is close enough to the registered name.

use url::Url;

use crate::slug::slugify;

#[derive(Debug, Clone)]
pub struct LinkSynthesizer {
    base: String,
}

impl LinkSynthesizer {
    /// `base` must be an absolute http(s) URL; a trailing slash is tolerated.
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        Url::parse(base)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Build the candidate detail URL, or `None` when either the identifier
    /// or the name slug is empty. Callers treat `None` as "skip the
    /// direct-link tier", never as an error.
    pub fn synthesize(&self, identifier: &str, name: &str) -> Option<String> {
        if identifier.is_empty() {
            return None;
        }
        let slug = slugify(name);
        if slug.is_empty() {
            return None;
        }
        Some(format!("{}/{}-{}", self.base, identifier, slug))
    }
}
