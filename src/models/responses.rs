//! Response-side types
//!
//! The typed result every request returns, and the backend payloads of the
//! domain endpoints.

use serde::{Deserialize, Serialize};

/// Outcome of a coordinated request. Failures are values, never panics or
/// propagated errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when served from the cache without a network call
    pub cached: bool,
    /// Completion time (Unix milliseconds) for responses fetched from the network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Retries the network operation needed before it settled
    pub retries: u32,
}

impl<T> ApiResponse<T> {
    pub fn cached(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached: true,
            timestamp: None,
            retries: 0,
        }
    }

    pub fn fetched(data: T, timestamp: u64, retries: u32) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached: false,
            timestamp: Some(timestamp),
            retries,
        }
    }

    pub fn failure(error: impl Into<String>, retries: u32) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            cached: false,
            timestamp: None,
            retries,
        }
    }

    /// Converts the payload, keeping the metadata. A conversion error turns
    /// the response into a failure.
    pub fn try_map<U, E, F>(self, f: F) -> ApiResponse<U>
    where
        F: FnOnce(T) -> Result<U, E>,
        E: std::fmt::Display,
    {
        let data = match self.data {
            Some(data) => match f(data) {
                Ok(mapped) => Some(mapped),
                Err(e) => return ApiResponse::failure(e.to_string(), self.retries),
            },
            None => None,
        };
        ApiResponse {
            success: self.success,
            data,
            error: self.error,
            cached: self.cached,
            timestamp: self.timestamp,
            retries: self.retries,
        }
    }
}

/// Body returned by `POST /translate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// One entry of `GET /voices/{language}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

/// One entry of `GET /languages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub speakers: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
