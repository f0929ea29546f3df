//! Task request envelope.
//!
//! A task request is the JSON body of a broker message. The worker only
//! touches `task_config` and adds the `<analysis>_result` key; every other
//! field sent by the brain is preserved verbatim through `extra` so the reply
//! body is the request plus the worker's additions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Analyses a worker can be asked to run, keyed by queue name without `_treq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    LandscapeAnalysis,
    LoginTraceAnalysis,
    WildcardReceiverAnalysis,
    PrivacyAnalysis,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::LandscapeAnalysis => "landscape_analysis",
            AnalysisKind::LoginTraceAnalysis => "login_trace_analysis",
            AnalysisKind::WildcardReceiverAnalysis => "wildcard_receiver_analysis",
            AnalysisKind::PrivacyAnalysis => "privacy_analysis",
        }
    }

    /// Key under which the brain sends this analysis' configuration.
    pub fn config_key(&self) -> String {
        format!("{}_config", self.as_str())
    }

    /// Key under which the worker returns this analysis' result.
    pub fn result_key(&self) -> String {
        format!("{}_result", self.as_str())
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "landscape_analysis" => Ok(AnalysisKind::LandscapeAnalysis),
            "login_trace_analysis" => Ok(AnalysisKind::LoginTraceAnalysis),
            "wildcard_receiver_analysis" => Ok(AnalysisKind::WildcardReceiverAnalysis),
            "privacy_analysis" => Ok(AnalysisKind::PrivacyAnalysis),
            other => Err(format!("Unknown analysis: {}", other)),
        }
    }
}

/// Lifecycle states stamped into `task_config.task_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    RequestSent,
    RequestReceived,
    ResponseSent,
    ResponseReceived,
    #[serde(untagged)]
    Other(String),
}

/// Task bookkeeping shared between brain and worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timestamp_request_received: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timestamp_response_sent: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A task request as received from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub domain: String,
    #[serde(default)]
    pub task_config: TaskConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl TaskRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Returns the configuration document for `kind`, or an empty object.
    pub fn analysis_config(&self, kind: AnalysisKind) -> Value {
        self.extra
            .get(&kind.config_key())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn mark_request_received(&mut self) {
        self.task_config.task_state = Some(TaskState::RequestReceived);
        self.task_config.task_timestamp_request_received = Some(epoch_seconds());
    }

    pub fn mark_response_sent(&mut self) {
        self.task_config.task_state = Some(TaskState::ResponseSent);
        self.task_config.task_timestamp_response_sent = Some(epoch_seconds());
    }

    /// Stores the analysis outcome under `<analysis>_result`.
    pub fn set_result(&mut self, kind: AnalysisKind, outcome: Value) {
        self.extra.insert(kind.result_key(), outcome);
    }

    /// Task id rendered for logging.
    pub fn task_label(&self) -> String {
        match &self.task_config.task_id {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let body = json!({
            "domain": "example.com",
            "task_config": {"task_state": "REQUEST_SENT", "task_id": "abc", "task_timestamp_request_sent": 1.5},
            "landscape_analysis_config": {"browser_config": {"width": 800}},
            "brain_field": [1, 2, 3]
        });
        let mut task: TaskRequest = serde_json::from_value(body).unwrap();
        assert_eq!(task.task_config.task_state, Some(TaskState::RequestSent));
        assert_eq!(task.task_label(), "abc");

        task.mark_request_received();
        task.set_result(AnalysisKind::LandscapeAnalysis, json!({"exception": "x"}));
        task.mark_response_sent();

        let out = serde_json::to_value(&task).unwrap();
        assert_eq!(out["brain_field"], json!([1, 2, 3]));
        assert_eq!(out["task_config"]["task_timestamp_request_sent"], json!(1.5));
        assert_eq!(out["task_config"]["task_state"], json!("RESPONSE_SENT"));
        assert!(out["task_config"]["task_timestamp_request_received"].is_f64());
        assert!(out["task_config"]["task_timestamp_response_sent"].is_f64());
        assert_eq!(out["landscape_analysis_result"], json!({"exception": "x"}));
        assert_eq!(
            out["landscape_analysis_config"]["browser_config"]["width"],
            json!(800)
        );
    }

    #[test]
    fn test_unrecognized_task_state_is_preserved() {
        let task: TaskRequest =
            serde_json::from_str(r#"{"domain":"a.b","task_config":{"task_state":"QUEUED"}}"#)
                .unwrap();
        assert_eq!(
            task.task_config.task_state,
            Some(TaskState::Other("QUEUED".to_string()))
        );
        let out = serde_json::to_value(&task).unwrap();
        assert_eq!(out["task_config"]["task_state"], "QUEUED");
    }

    #[test]
    fn test_analysis_config_defaults_to_empty_object() {
        let task: TaskRequest = serde_json::from_str(r#"{"domain":"a.b"}"#).unwrap();
        assert_eq!(
            task.analysis_config(AnalysisKind::LandscapeAnalysis),
            json!({})
        );
    }

    #[test]
    fn test_analysis_kind_from_str() {
        assert_eq!(
            "landscape_analysis".parse::<AnalysisKind>(),
            Ok(AnalysisKind::LandscapeAnalysis)
        );
        assert!("dns_analysis".parse::<AnalysisKind>().is_err());
        assert_eq!(
            AnalysisKind::PrivacyAnalysis.result_key(),
            "privacy_analysis_result"
        );
    }
}
