//! Per-item results and the uniform response shape handed to callers.

use serde::Serialize;

use crate::errors::{CoreError, ErrorKind};

/// Outcome of processing one item in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub subject: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OperationResult {
    pub fn ok(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            success: true,
            message: message.into(),
            detail: None,
        }
    }

    pub fn failed(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            success: false,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Itemized results of a bulk operation. Partial failure is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub results: Vec<OperationResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub message: String,
}

impl BatchReport {
    /// Build a report whose summary starts with `action`, e.g. "Rename".
    pub fn from_results(action: &str, results: Vec<OperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let message = format!("{action}: {succeeded} succeeded, {failed} failed");
        Self {
            results,
            succeeded,
            failed,
            message,
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}

/// The `(success, message, payload?)` triple every entry point reduces to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            payload: None,
        }
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => self.payload = Some(value),
            Err(e) => {
                self.success = false;
                self.kind = Some(ErrorKind::Other);
                self.message = format!("Failed to serialize result: {e}");
            }
        }
        self
    }

    pub fn from_error(err: &CoreError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            kind: Some(err.kind()),
            payload: None,
        }
    }

    /// Collapse a core result into a response, using `describe` for the
    /// success message.
    pub fn from_result<T: Serialize>(
        result: Result<T, CoreError>,
        describe: impl FnOnce(&T) -> String,
    ) -> Self {
        match result {
            Ok(value) => Self::ok(describe(&value)).with_payload(&value),
            Err(e) => Self::from_error(&e),
        }
    }
}

impl From<BatchReport> for OperationResponse {
    fn from(report: BatchReport) -> Self {
        let response = Self::ok(report.message.clone()).with_payload(&report);
        Self {
            success: response.success && report.is_complete_success(),
            ..response
        }
    }
}
