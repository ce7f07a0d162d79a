//! API Models Module
//!
//! Server configuration and error payloads for the API system.

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Typed failure body for 4xx/5xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: u16,
    pub error_type: String,
    pub error_param: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(
        code: u16,
        error_type: impl Into<String>,
        error_param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            error_type: error_type.into(),
            error_param: error_param.into(),
            message: message.into(),
        }
    }
}
