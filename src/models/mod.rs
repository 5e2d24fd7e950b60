//! Request and Response models for the cache and request layers
//!
//! Options passed by callers, and the DTOs exchanged with the backend.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{CacheOptions, Priority, RequestOptions, TranslationRequest};
pub use responses::{ApiResponse, Language, TranslationResponse, Voice};
