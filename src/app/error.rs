use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_DEPENDENCY: &str = "ERR_DEPENDENCY";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";
pub const ERR_NO_DEVICE: &str = "ERR_NO_DEVICE";
pub const ERR_TOPOLOGY_UNAVAILABLE: &str = "ERR_TOPOLOGY_UNAVAILABLE";
pub const ERR_CAPTURE_FAILED: &str = "ERR_CAPTURE_FAILED";
pub const ERR_INVALID_IMAGE: &str = "ERR_INVALID_IMAGE";

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DEPENDENCY, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    /// No device has been selected for this session yet.
    pub fn no_device(trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_NO_DEVICE,
            "Device not connected; connect a device first",
            trace_id,
        )
    }

    pub fn topology_unavailable(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_TOPOLOGY_UNAVAILABLE, message, trace_id)
    }

    pub fn capture_failed(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_CAPTURE_FAILED, message, trace_id)
    }

    pub fn invalid_image(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_INVALID_IMAGE, message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = AppError::capture_failed("all candidates exhausted", "trace-1");
        assert_eq!(err.to_string(), "all candidates exhausted (ERR_CAPTURE_FAILED)");
        assert_eq!(err.trace_id, "trace-1");
    }

    #[test]
    fn serializes_for_transport() {
        let err = AppError::no_device("trace-2");
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["code"], "ERR_NO_DEVICE");
        assert_eq!(value["trace_id"], "trace-2");
    }
}
