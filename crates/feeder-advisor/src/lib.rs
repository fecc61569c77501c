//! Duplicate-feeder advisory client
//!
//! Asks the external network-trace service which feeder each candidate
//! pole hangs off. When two top candidates share a feeder the caller
//! annotates the corresponding designs; nothing is ever removed on the
//! advisory's account. The response schema varies across deployments,
//! so any JSON object is accepted and every failure degrades to "no
//! advisory".

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Trace service returned a non-JSON body")]
    Protocol,
}

pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Feeder assignment for one pole.
#[derive(Debug, Clone, Serialize)]
pub struct FeederInfo {
    pub pole_id: String,
    pub feeder_id: String,
    pub transformer_id: Option<String>,
}

/// Poles among the checked set that share a feeder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    /// Pole id -> feeder id, for every pole that resolved.
    pub feeders: HashMap<String, String>,
    /// Pole ids that share a feeder with another checked pole.
    pub duplicates: Vec<String>,
}

impl DuplicateReport {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub base_url: String,
    pub trace_path: String,
    pub http_timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8881/trace".to_string(),
            trace_path: "networkTrace.do".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

pub struct FeederAdvisor {
    config: AdvisorConfig,
    client: reqwest::Client,
}

impl FeederAdvisor {
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Feeder id for one pole. `Ok(None)` when the service answers but
    /// does not know the pole.
    pub async fn lookup(&self, pole_id: &str) -> Result<Option<FeederInfo>> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.trace_path
        );
        let response = self
            .client
            .get(&url)
            .query(&[("poleId", pole_id)])
            .send()
            .await?
            .error_for_status()?;

        let value: serde_json::Value = response.json().await.map_err(|_| AdvisorError::Protocol)?;
        Ok(parse_trace_response(pole_id, &value))
    }

    /// Resolve feeders for the top candidates and report shared ones.
    /// Lookup failures are logged and treated as unknown; this path
    /// never fails the design.
    pub async fn check_duplicates(&self, pole_ids: &[String]) -> DuplicateReport {
        let mut feeders: HashMap<String, String> = HashMap::new();
        for pole_id in pole_ids {
            match self.lookup(pole_id).await {
                Ok(Some(info)) => {
                    feeders.insert(info.pole_id, info.feeder_id);
                }
                Ok(None) => debug!("No feeder known for pole {pole_id}"),
                Err(e) => warn!("Feeder lookup failed for {pole_id} (advisory only): {e}"),
            }
        }
        build_report(feeders)
    }
}

/// The schema is deployment-specific; read the feeder id from any of
/// the spellings seen in the field.
pub fn parse_trace_response(pole_id: &str, value: &serde_json::Value) -> Option<FeederInfo> {
    let feeder_id = ["feederId", "feeder_id", "FEEDER_ID"]
        .iter()
        .find_map(|key| value.get(key))
        .and_then(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })?;
    let transformer_id = ["transformerId", "transformer_id"]
        .iter()
        .find_map(|key| value.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(FeederInfo {
        pole_id: pole_id.to_string(),
        feeder_id,
        transformer_id,
    })
}

fn build_report(feeders: HashMap<String, String>) -> DuplicateReport {
    let mut by_feeder: HashMap<&str, Vec<&str>> = HashMap::new();
    for (pole, feeder) in &feeders {
        by_feeder.entry(feeder).or_default().push(pole);
    }
    let mut duplicates: Vec<String> = by_feeder
        .values()
        .filter(|poles| poles.len() > 1)
        .flatten()
        .map(|s| s.to_string())
        .collect();
    duplicates.sort();

    DuplicateReport {
        feeders,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_spellings() {
        let camel = parse_trace_response("P1", &json!({"feederId": "F-7"})).unwrap();
        assert_eq!(camel.feeder_id, "F-7");

        let snake =
            parse_trace_response("P1", &json!({"feeder_id": "F-8", "transformerId": "T-1"}))
                .unwrap();
        assert_eq!(snake.feeder_id, "F-8");
        assert_eq!(snake.transformer_id.as_deref(), Some("T-1"));

        let numeric = parse_trace_response("P1", &json!({"FEEDER_ID": 42})).unwrap();
        assert_eq!(numeric.feeder_id, "42");
    }

    #[test]
    fn test_parse_unknown_schema_is_informational() {
        assert!(parse_trace_response("P1", &json!({"status": "ok"})).is_none());
        assert!(parse_trace_response("P1", &json!({"feederId": ""})).is_none());
    }

    #[test]
    fn test_duplicate_detection() {
        let mut feeders = HashMap::new();
        feeders.insert("P1".to_string(), "F-1".to_string());
        feeders.insert("P2".to_string(), "F-1".to_string());
        feeders.insert("P3".to_string(), "F-2".to_string());
        let report = build_report(feeders);

        assert!(report.has_duplicates());
        assert_eq!(report.duplicates, vec!["P1".to_string(), "P2".to_string()]);
    }

    #[test]
    fn test_no_duplicates() {
        let mut feeders = HashMap::new();
        feeders.insert("P1".to_string(), "F-1".to_string());
        feeders.insert("P2".to_string(), "F-2".to_string());
        assert!(!build_report(feeders).has_duplicates());
    }
}
