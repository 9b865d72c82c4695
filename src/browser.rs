//! Shared browser session and operator-in-the-loop gate.
//!
//! The registries behind bot-mitigation are driven through one interactive
//! Chrome session with a persistent profile. The session is a single
//! exclusively-owned resource: it is created once at startup (failure to
//! launch is fatal) and passed explicitly into every registry client, so
//! tests can substitute stub capabilities and never touch a browser.
//!
//! When a challenge page is detected the pipeline suspends on the
//! `OperatorGate` until a human clears it in the visible browser window;
//! the same attempt is then re-evaluated exactly once.

use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BrowserConfig;
use crate::error::LookupError;

/// Markers that identify an interactive bot-mitigation challenge page.
/// Matched against the lowercased page HTML.
const CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "cf-chl",
    "challenge-platform",
    "turnstile",
];

/// Challenge heuristic. "just a moment" alone appears in ordinary copy, so
/// it only counts together with a cloudflare mention.
pub fn looks_like_challenge(html: &str) -> bool {
    let t = html.to_lowercase();
    (t.contains("just a moment") && t.contains("cloudflare"))
        || CHALLENGE_MARKERS.iter().any(|m| t.contains(m))
}

/// Suspension point for operator intervention. `wait` blocks the whole
/// pipeline until the operator acknowledges; an error means the operator
/// could not be reached and the caller must treat the attempt as blocked.
pub trait OperatorGate: Send + Sync {
    fn wait(&self, reason: &str) -> io::Result<()>;
}

/// Blocks on stdin until the operator presses Enter. EOF (stdin closed,
/// non-interactive run) is an error: the pipeline must never silently
/// proceed past a challenge.
pub struct StdinGate;

impl OperatorGate for StdinGate {
    fn wait(&self, reason: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "\n{}", "=".repeat(78))?;
        writeln!(out, "[MANUAL ACTION REQUIRED] {reason}")?;
        writeln!(
            out,
            "Solve the challenge in the open browser window, then press Enter here."
        )?;
        writeln!(out, "{}\n", "=".repeat(78))?;
        out.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for operator",
            ));
        }
        Ok(())
    }
}

/// Explicit opt-out of the operator pause for unattended runs
/// (`--auto-continue`). Logs loudly and proceeds; challenges then fail the
/// tier as `Blocked` instead of waiting forever.
pub struct AutoContinueGate;

impl OperatorGate for AutoContinueGate {
    fn wait(&self, reason: &str) -> io::Result<()> {
        warn!("auto-continue: skipping operator pause ({reason})");
        Ok(())
    }
}

/// One interactive Chrome session shared by all browser-driven registries.
pub struct BrowserSession {
    // Kept alive for the lifetime of the session; dropping it kills Chrome.
    _browser: Browser,
    tab: Arc<Tab>,
    gate: Arc<dyn OperatorGate>,
    pause_on_challenge: bool,
}

impl BrowserSession {
    /// Launch Chrome with the configured profile. Inability to acquire the
    /// browser capability is a startup-fatal condition for the pipeline.
    pub fn launch(config: &BrowserConfig, gate: Arc<dyn OperatorGate>) -> Result<Self> {
        let profile_dir = PathBuf::from(&config.profile_dir);
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("Failed to create profile dir {}", profile_dir.display()))?;

        let is_container = std::env::var("MSTFINDER_CONTAINER").is_ok()
            || Path::new("/.dockerenv").exists();

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(!is_container)
            .user_data_dir(Some(profile_dir))
            // Operator pauses are unbounded; Chrome must not idle out under us.
            .idle_browser_timeout(Duration::from_secs(86_400))
            .build()
            .map_err(|e| anyhow!("Failed to build Chrome launch options: {}", e))?;

        let browser = Browser::new(options).context("Failed to launch Chrome")?;
        let tab = browser
            .new_tab()
            .context("Failed to open a browser tab")?;
        tab.set_default_timeout(Duration::from_secs(config.page_load_timeout_secs));

        Ok(Self {
            _browser: browser,
            tab,
            gate,
            pause_on_challenge: config.pause_on_challenge,
        })
    }

    /// Navigate and verify the destination is not a challenge page.
    pub fn goto(&self, url: &str) -> Result<(), LookupError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| LookupError::NetworkFault(format!("navigate {url}: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| LookupError::Timeout(format!("page load {url}: {e}")))?;
        self.ensure_unchallenged(url)
    }

    /// Check the current page for a challenge. On detection: suspend on the
    /// operator gate, then re-check once; a challenge that survives the
    /// pause is `Blocked`.
    pub fn ensure_unchallenged(&self, context: &str) -> Result<(), LookupError> {
        let html = self.content()?;
        if !looks_like_challenge(&html) {
            return Ok(());
        }
        if !self.pause_on_challenge {
            return Err(LookupError::Blocked);
        }

        self.gate
            .wait(&format!("Challenge detected at {context}"))
            .map_err(|_| LookupError::Blocked)?;

        let html = self.content()?;
        if looks_like_challenge(&html) {
            return Err(LookupError::Blocked);
        }
        Ok(())
    }

    pub fn content(&self) -> Result<String, LookupError> {
        self.tab
            .get_content()
            .map_err(|e| LookupError::NetworkFault(format!("read page content: {e}")))
    }

    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    /// Wait for an element to appear, bounded. Absence within the wait is
    /// `NotFound`: the page answered, the expected structure did not.
    pub fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), LookupError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|_| LookupError::NotFound(format!("element '{selector}' not present")))
    }

    /// Type into a search input and submit with Enter.
    pub fn submit_search(&self, selector: &str, text: &str) -> Result<(), LookupError> {
        let element = self
            .tab
            .wait_for_element(selector)
            .map_err(|_| LookupError::NotFound(format!("search input '{selector}' not present")))?;
        element
            .click()
            .map_err(|e| LookupError::NetworkFault(format!("focus search input: {e}")))?;
        self.tab
            .type_str(text)
            .map_err(|e| LookupError::NetworkFault(format!("type into search input: {e}")))?;
        self.tab
            .press_key("Enter")
            .map_err(|e| LookupError::NetworkFault(format!("submit search: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| LookupError::Timeout(format!("search results load: {e}")))?;
        Ok(())
    }

    /// Warm-up visit before the first row: open the registry home and hold
    /// at the gate once so the operator can clear any challenge and seed
    /// cookies in the persistent profile.
    pub fn warmup(&self, url: &str) -> Result<()> {
        info!("warm-up: opening {url}");
        self.goto(url)
            .map_err(|e| anyhow!("warm-up navigation failed: {e}"))?;
        self.gate
            .wait(&format!(
                "Warm-up: {url} is open; solve any challenge, then continue"
            ))
            .context("operator unavailable during warm-up")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_cloudflare_interstitials() {
        assert!(looks_like_challenge(
            "<title>Just a moment...</title><p>Cloudflare</p>"
        ));
        assert!(looks_like_challenge("Checking your browser before accessing"));
        assert!(looks_like_challenge("<div id=\"cf-chl-widget\"></div>"));
        assert!(looks_like_challenge("src=\"https://challenges.cloudflare.com/turnstile/v0\""));
    }

    #[test]
    fn test_ordinary_pages_pass() {
        assert!(!looks_like_challenge("<table><tr><td>Mã số thuế</td></tr></table>"));
        // "just a moment" in copy without a cloudflare mention is not a challenge.
        assert!(!looks_like_challenge("wait just a moment while we load results"));
    }
}
