//! Best-effort enumeration of the models a provider can serve.
//!
//! Providers disagree on the listing format, so each known endpoint is
//! tried in turn and every failure simply means "nothing found here".

use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

use super::LlmError;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// `GET {base}/models`: OpenAI `{data: [...]}`, Ollama-style
    /// `{models: [...]}` or a bare list.
    OpenAiModels,
    /// `GET {root}/api/tags`: Ollama's native `{models: [{name}]}`.
    OllamaTags,
}

impl DiscoveryStrategy {
    pub const ORDER: [DiscoveryStrategy; 2] = [DiscoveryStrategy::OpenAiModels, DiscoveryStrategy::OllamaTags];

    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            DiscoveryStrategy::OpenAiModels => format!("{}/models", base),
            DiscoveryStrategy::OllamaTags => {
                let root = base.strip_suffix("/v1").unwrap_or(base);
                format!("{}/api/tags", root)
            }
        }
    }

    /// Names found in `body`. Shapes this strategy does not recognise
    /// produce an empty list.
    pub fn extract(&self, body: &Value) -> Vec<String> {
        let mut names = Vec::new();
        match self {
            DiscoveryStrategy::OpenAiModels => {
                match body {
                    Value::Object(map) => {
                        if let Some(Value::Array(entries)) = map.get("data") {
                            names.extend(entries.iter().filter_map(|e| entry_name(e, &["id", "name", "model"])));
                        }
                        if let Some(Value::Array(entries)) = map.get("models") {
                            names.extend(entries.iter().filter_map(|e| entry_name(e, &["name", "model"])));
                        }
                    }
                    Value::Array(entries) => {
                        names.extend(entries.iter().filter_map(|e| entry_name(e, &["name", "model"])));
                    }
                    _ => {}
                }
            }
            DiscoveryStrategy::OllamaTags => {
                if let Some(Value::Array(entries)) = body.get("models") {
                    names.extend(entries.iter().filter_map(|e| entry_name(e, &["name"])));
                }
            }
        }
        names
    }
}

/// First non-empty string among `keys`; a bare string entry is its own name.
fn entry_name(entry: &Value, keys: &[&str]) -> Option<String> {
    if let Value::String(name) = entry {
        return Some(name.clone()).filter(|n| !n.is_empty());
    }
    keys.iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

async fn fetch(http: &HttpClient, url: &str, timeout: Duration) -> Result<Value, LlmError> {
    let resp = http.get(url).timeout(timeout).send().await?.error_for_status()?;
    let body = resp.json::<Value>().await?;
    Ok(body)
}

/// Sorted, de-duplicated model names. Never fails: an unreachable or
/// confused provider yields an empty list.
pub async fn discover_models(http: &HttpClient, base_url: &str, timeout: Duration) -> Vec<String> {
    for strategy in DiscoveryStrategy::ORDER {
        let url = strategy.url(base_url);
        let names = match fetch(http, &url, timeout).await {
            Ok(body) => strategy.extract(&body),
            Err(e) => {
                debug!("Model discovery via {} failed: {}", url, e);
                continue;
            }
        };

        let unique: BTreeSet<String> = names.into_iter().collect();
        if !unique.is_empty() {
            info!("Discovered {} model(s) via {}", unique.len(), url);
            return unique.into_iter().collect();
        }
        debug!("Model discovery via {} found no models", url);
    }
    Vec::new()
}
