//! API Module
//!
//! Outbound request coordination in front of the cache.
//!
//! # Endpoints
//! - `POST /translate` - Translate a text
//! - `GET /voices/{language}` - Voices available for a language
//! - `GET /languages` - Supported languages

pub mod key;
pub mod retry;
pub mod service;
pub mod transport;

pub use key::request_key;
pub use retry::{Outcome, RetryPolicy};
pub use service::{ApiService, ApiStats, REFERENCE_DATA_TTL};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
