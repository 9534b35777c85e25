use std::fmt;

use serde::{Deserialize, Serialize};

/// Token identifying one scan for the lifetime of an orchestrator.
///
/// Tokens are handed out in strictly increasing order, so a larger id is
/// always a newer scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ScanId(pub u64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user-initiated email-authentication scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub domain: String,
    #[serde(default, rename = "selector")]
    pub selector_hint: Option<String>,
}

impl ScanRequest {
    /// Build a request, treating a blank selector as "no hint".
    pub fn new(domain: impl Into<String>, selector_hint: Option<String>) -> Self {
        let selector_hint = selector_hint
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            domain: domain.into().trim().to_string(),
            selector_hint,
        }
    }
}

/// Incremental progress of a running scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: u64,
    pub total: u64,
}

impl ProgressUpdate {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// `round(100 * completed / total)`, rounding halves up; 0 when `total` is 0.
    ///
    /// Out-of-range input (`completed > total`) saturates at 100.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let completed = u128::from(self.completed);
        let total = u128::from(self.total);
        let pct = (200 * completed + total) / (2 * total);
        pct.min(100) as u8
    }
}

/// Kind of DNS record reported by a scan or lookup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    Spf,
    Dkim,
    Dmarc,
    Other(String),
}

impl RecordKind {
    /// DKIM results carry the name of the selector that was queried.
    pub fn is_dkim_like(&self) -> bool {
        matches!(self, RecordKind::Dkim)
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::Spf => "SPF",
            RecordKind::Dkim => "DKIM",
            RecordKind::Dmarc => "DMARC",
            RecordKind::Other(s) => s,
        }
    }
}

impl From<String> for RecordKind {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "SPF" => RecordKind::Spf,
            "DKIM" => RecordKind::Dkim,
            "DMARC" => RecordKind::Dmarc,
            _ => RecordKind::Other(s),
        }
    }
}

impl From<&str> for RecordKind {
    fn from(s: &str) -> Self {
        RecordKind::from(s.to_string())
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record family's findings, e.g. the SPF TXT records of a domain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordResult {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, rename = "query", skip_serializing_if = "Option::is_none")]
    pub query_label: Option<String>,
    #[serde(default)]
    pub records: Vec<String>,
    #[serde(default, rename = "status", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl RecordResult {
    pub fn new(kind: impl Into<RecordKind>, records: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            query_label: None,
            records,
            status_message: None,
        }
    }

    pub fn with_query(mut self, label: impl Into<String>) -> Self {
        self.query_label = Some(label.into());
        self
    }

    pub fn with_status(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }
}

/// Terminal result of a scan; produced exactly once per request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Failure {
        message: String,
    },
    Success {
        results: Vec<RecordResult>,
        checked_selectors: Vec<String>,
    },
}
