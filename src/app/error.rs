use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_IO: &str = "ERR_IO";
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";
pub const ERR_INTERRUPTED: &str = "ERR_INTERRUPTED";
pub const ERR_SECURITY: &str = "ERR_SECURITY";
pub const ERR_DOMAIN_PARAMETER: &str = "ERR_DOMAIN_PARAMETER";
pub const ERR_PARSE: &str = "ERR_PARSE";
pub const ERR_COMMAND_FAILED: &str = "ERR_COMMAND_FAILED";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
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

    /// Out-of-range typed parameters, rejected before a command string is built.
    pub fn domain_parameter(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DOMAIN_PARAMETER, message, trace_id)
    }

    pub fn io(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_IO, message, trace_id)
    }

    pub fn parse(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PARSE, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
