//! Programmatic name-lookup APIs.
//!
//! When the direct detail link built from the customer's name on file 404s,
//! the registered business name is recovered from public lookup APIs and the
//! link is rebuilt. Each API is described as data in the config (URL
//! template, dot-path to the name, optional success-envelope check) rather
//! than as per-provider code, and the sources are queried strictly in
//! config order until one returns a non-empty name.

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::config::{HttpConfig, NameApiSource};
use crate::error::LookupError;

/// A canonical business name and the API that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredName {
    pub name: String,
    pub source: String,
}

/// Outcome of one recovery pass across all configured sources. The error
/// notes are kept even on success so the output sheet can show what each
/// source said.
#[derive(Debug, Clone, Default)]
pub struct NameRecovery {
    pub name: Option<RecoveredName>,
    pub errors: Vec<String>,
}

/// Capability seam for identifier-to-name recovery; the engine only sees
/// this trait, so tests substitute a stub.
pub trait NameLookup {
    fn recover_name(
        &self,
        identifier: &str,
    ) -> impl std::future::Future<Output = NameRecovery> + Send;
}

/// Real implementation backed by reqwest with bounded-retry semantics.
pub struct NameApiChain {
    client: reqwest::Client,
    sources: Vec<NameApiSource>,
    policy: BackoffPolicy,
}

impl NameApiChain {
    pub fn new(
        http: &HttpConfig,
        sources: Vec<NameApiSource>,
        policy: BackoffPolicy,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(http.request_timeout_secs));

        if let Some(proxy) = &http.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        if !http.verify_ssl {
            // Corporate MITM proxies re-sign upstream certificates.
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            sources,
            policy,
        })
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, LookupError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            return Err(LookupError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(LookupError::ServerFault(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(LookupError::NotFound(format!("HTTP {status}")));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| {
            let snippet: String = body.chars().take(200).collect();
            LookupError::ServerFault(format!(
                "non-JSON response body: {}",
                snippet.replace(['\n', '\r'], " ")
            ))
        })
    }

    /// Query one source. An empty string means the API answered but carried
    /// no usable name.
    async fn lookup_one(&self, source: &NameApiSource, identifier: &str) -> Result<String, LookupError> {
        let url = source.url_template.replace("{mst}", identifier);
        let json = self.policy.run(|| self.fetch_json(&url)).await?;

        if let (Some(path), Some(expected)) =
            (&source.success_code_path, &source.success_code_value)
        {
            let code = json_path(&json, path)
                .map(value_as_string)
                .unwrap_or_default();
            if code != *expected {
                return Err(LookupError::NotFound(format!("api_code={code}")));
            }
        }

        Ok(json_path(&json, &source.name_path)
            .map(value_as_string)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl NameLookup for NameApiChain {
    async fn recover_name(&self, identifier: &str) -> NameRecovery {
        let mut recovery = NameRecovery::default();

        for source in &self.sources {
            match self.lookup_one(source, identifier).await {
                Ok(name) if !name.is_empty() => {
                    debug!("recovered name for {} from {}", identifier, source.name);
                    recovery.name = Some(RecoveredName {
                        name,
                        source: source.name.clone(),
                    });
                    return recovery;
                }
                Ok(_) => {
                    recovery.errors.push(format!("{}: empty_name", source.name));
                }
                Err(err) => {
                    warn!("name lookup via {} failed: {}", source.name, err);
                    recovery.errors.push(format!("{}: {}", source.name, err));
                }
            }
        }

        recovery
    }
}

/// Navigate a dot-notation path through nested JSON objects.
fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Render a JSON leaf as the string the config comparison expects. Numbers
/// appear because some APIs send `"code": 0` rather than `"code": "00"`.
fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
