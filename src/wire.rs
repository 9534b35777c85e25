//! Newline-delimited JSON spoken by the external diagnostic engine.
use serde::Deserialize;

use crate::types::{RecordResult, ScanOutcome};

/// One line of the engine's scan stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    Progress { completed: u64, total: u64 },
    Outcome(OutcomePayload),
}

/// Final payload: `{error}` or `{results, checked_selectors}`.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutcomePayload {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<RecordResult>,
    #[serde(default)]
    pub checked_selectors: Vec<String>,
}

impl From<OutcomePayload> for ScanOutcome {
    fn from(p: OutcomePayload) -> Self {
        match p.error {
            Some(message) => ScanOutcome::Failure { message },
            None => ScanOutcome::Success {
                results: p.results,
                checked_selectors: p.checked_selectors,
            },
        }
    }
}

/// Decode a single stream line. Blank lines yield `Ok(None)`.
pub fn decode_line(line: &str) -> Result<Option<WireEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Reply of a one-shot check when the engine answers with JSON.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CheckPayload {
    Failure { error: String },
    Records(Vec<RecordResult>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;

    #[test]
    fn decodes_progress() {
        let ev = decode_line(r#"{"event":"progress","completed":2,"total":5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            WireEvent::Progress {
                completed: 2,
                total: 5
            }
        );
    }

    #[test]
    fn outcome_with_error_is_failure() {
        let ev = decode_line(r#"{"event":"outcome","error":"DNS resolution timed out"}"#)
            .unwrap()
            .unwrap();
        let WireEvent::Outcome(payload) = ev else {
            panic!("expected outcome");
        };
        assert_eq!(
            ScanOutcome::from(payload),
            ScanOutcome::Failure {
                message: "DNS resolution timed out".into()
            }
        );
    }

    #[test]
    fn outcome_with_results_is_success() {
        let line = r#"{"event":"outcome","results":[{"type":"DKIM","query":"default._domainkey.example.com","status":"not found"}],"checked_selectors":["default"]}"#;
        let Some(WireEvent::Outcome(payload)) = decode_line(line).unwrap() else {
            panic!("expected outcome");
        };
        match ScanOutcome::from(payload) {
            ScanOutcome::Success {
                results,
                checked_selectors,
            } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].kind, RecordKind::Dkim);
                assert!(results[0].records.is_empty());
                assert_eq!(results[0].status_message.as_deref(), Some("not found"));
                assert_eq!(checked_selectors, vec!["default".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blank_line_is_skipped_and_garbage_errors() {
        assert!(decode_line("   ").unwrap().is_none());
        assert!(decode_line("PING example.com").is_err());
    }

    #[test]
    fn check_payload_variants() {
        let f: CheckPayload = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert_eq!(f, CheckPayload::Failure { error: "nope".into() });
        let r: CheckPayload = serde_json::from_str(r#"[{"type":"A","records":["93.184.216.34"]}]"#).unwrap();
        assert!(matches!(r, CheckPayload::Records(v) if v.len() == 1));
    }
}
