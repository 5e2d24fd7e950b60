//! Request Coordinator
//!
//! `ApiService` answers from the cache when it can, otherwise runs the
//! network operation under the retry policy and caches the result. Identical
//! concurrent requests share one in-flight operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::key::request_key;
use crate::api::retry::{execute, Outcome, RetryPolicy};
use crate::api::transport::{HttpRequest, Transport};
use crate::cache::CacheService;
use crate::config::Config;
use crate::models::{
    ApiResponse, CacheOptions, Language, RequestOptions, TranslationRequest, TranslationResponse,
    Voice,
};

/// TTL for reference data that rarely changes (voices, languages).
pub const REFERENCE_DATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

type InFlight = Shared<BoxFuture<'static, Outcome>>;

// == Api Stats ==
/// Counters of the request coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStats {
    /// Calls to `request`
    pub requests: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Network operations started (retries not included)
    pub network_calls: u64,
    /// Requests that joined an operation already in flight
    pub deduplicated: u64,
    /// Retries performed across all operations
    pub retries: u64,
    /// Operations that exhausted their attempts
    pub failures: u64,
}

struct ApiInner {
    base_url: String,
    cache: CacheService,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    pending: Mutex<HashMap<String, InFlight>>,
    stats: Arc<Mutex<ApiStats>>,
}

/// Removes the in-flight record when the owning caller settles or is
/// cancelled. Waiters keep their own clone of the shared operation.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, InFlight>>,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

// == Api Service ==
/// Handle to the request coordinator. Clones share the in-flight table.
#[derive(Clone)]
pub struct ApiService {
    inner: Arc<ApiInner>,
}

impl ApiService {
    pub fn new(config: &Config, cache: CacheService, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                cache,
                transport,
                policy: RetryPolicy::from_config(config),
                pending: Mutex::new(HashMap::new()),
                stats: Arc::new(Mutex::new(ApiStats::default())),
            }),
        }
    }

    // == Request ==
    /// Fetches `endpoint`, consulting the cache first unless `force` is set.
    ///
    /// Never fails: network errors come back as `success: false` with the
    /// error message.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
        cache_options: CacheOptions,
    ) -> ApiResponse<Value> {
        let url = format!("{}{}", self.inner.base_url, endpoint);
        let key = request_key(&options.method, &url, options.body.as_ref());
        self.inner.stats.lock().requests += 1;

        if !cache_options.force {
            if let Some(data) = self.inner.cache.get(&key).await {
                self.inner.stats.lock().cache_hits += 1;
                debug!(url = url.as_str(), "Served from cache");
                return ApiResponse::cached(data);
            }
        }

        let request = HttpRequest {
            method: options.method,
            url,
            headers: options.headers,
            body: options.body,
        };

        let outcome = match self.join_in_flight(&key) {
            Some(flight) => flight.await,
            None => {
                let flight = self.start(key.clone(), request, cache_options);
                let _guard = PendingGuard {
                    pending: &self.inner.pending,
                    key,
                };
                flight.await
            }
        };

        match outcome.result {
            Ok(data) => ApiResponse::fetched(data, self.inner.cache.now_ms(), outcome.retries),
            Err(e) => ApiResponse::failure(e.to_string(), outcome.retries),
        }
    }

    fn join_in_flight(&self, key: &str) -> Option<InFlight> {
        let flight = self.inner.pending.lock().get(key).cloned()?;
        self.inner.stats.lock().deduplicated += 1;
        debug!(key, "Joined in-flight request");
        Some(flight)
    }

    /// Registers and returns a new shared operation. Caching happens inside
    /// it, so the entry is readable before any waiter resumes.
    fn start(&self, key: String, request: HttpRequest, cache_options: CacheOptions) -> InFlight {
        let transport = Arc::clone(&self.inner.transport);
        let cache = self.inner.cache.clone();
        let stats = Arc::clone(&self.inner.stats);
        let policy = self.inner.policy;
        let cache_key = key.clone();

        let flight = async move {
            stats.lock().network_calls += 1;
            let outcome = execute(transport.as_ref(), &request, &policy).await;
            {
                let mut stats = stats.lock();
                stats.retries += u64::from(outcome.retries);
                if outcome.result.is_err() {
                    stats.failures += 1;
                }
            }
            if let Ok(data) = &outcome.result {
                if let Err(e) = cache.set(&cache_key, data, cache_options).await {
                    warn!(url = request.url.as_str(), "Response not cached: {}", e);
                }
            }
            outcome
        }
        .boxed()
        .shared();

        self.inner.pending.lock().insert(key, flight.clone());
        flight
    }

    // == Domain Operations ==
    /// `POST /translate`, cached for the default TTL.
    pub async fn translate_text(
        &self,
        request: &TranslationRequest,
    ) -> ApiResponse<TranslationResponse> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => return ApiResponse::failure(e.to_string(), 0),
        };
        self.request("/translate", RequestOptions::post(body), CacheOptions::default())
            .await
            .try_map(serde_json::from_value)
    }

    /// `GET /voices/{language}`, cached for a day.
    pub async fn get_available_voices(&self, language_code: &str) -> ApiResponse<Vec<Voice>> {
        self.request(
            &format!("/voices/{language_code}"),
            RequestOptions::get(),
            CacheOptions::with_ttl(REFERENCE_DATA_TTL),
        )
        .await
        .try_map(serde_json::from_value)
    }

    /// `GET /languages`, cached for a day.
    pub async fn get_supported_languages(&self) -> ApiResponse<Vec<Language>> {
        self.request(
            "/languages",
            RequestOptions::get(),
            CacheOptions::with_ttl(REFERENCE_DATA_TTL),
        )
        .await
        .try_map(serde_json::from_value)
    }

    // == Housekeeping ==
    /// Drops every cached response (and everything else in the cache).
    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
    }

    pub fn stats(&self) -> ApiStats {
        self.inner.stats.lock().clone()
    }

    /// Number of distinct requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn cache(&self) -> &CacheService {
        &self.inner.cache
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::HttpResponse;
    use crate::cache::{JsonSerializer, ManualClock, MemoryStore};
    use crate::error::RequestError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers with `body` after a short delay; fails the first `failures` calls.
    struct FakeBackend {
        body: Value,
        failures: u32,
        calls: AtomicU32,
        delay: Duration,
    }

    impl FakeBackend {
        fn new(body: Value) -> Self {
            Self {
                body,
                failures: 0,
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(50),
            }
        }

        fn failing(body: Value, failures: u32) -> Self {
            Self {
                failures,
                ..Self::new(body)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeBackend {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, RequestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.failures {
                return Err(RequestError::Transport("connection refused".to_string()));
            }
            Ok(HttpResponse::ok(self.body.clone()))
        }
    }

    fn service(backend: Arc<FakeBackend>) -> ApiService {
        let config = Config {
            api_base_url: "https://api.test/".to_string(),
            retry_delay_ms: 10,
            ..Config::default()
        };
        let cache = CacheService::new(&config, Arc::new(MemoryStore::new()));
        ApiService::new(&config, cache, backend)
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let backend = Arc::new(FakeBackend::new(json!({"ok": true})));
        let api = service(backend.clone());

        let first = api.request("/status", RequestOptions::get(), CacheOptions::default()).await;
        let second = api.request("/status", RequestOptions::get(), CacheOptions::default()).await;

        assert!(first.success && !first.cached);
        assert!(first.timestamp.is_some());
        assert!(second.success && second.cached);
        assert_eq!(second.data, Some(json!({"ok": true})));
        assert_eq!(backend.calls(), 1);
        assert_eq!(api.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_timestamp_comes_from_cache_clock() {
        let config = Config::default();
        let clock = ManualClock::new(1_700_000_000_000);
        let cache = CacheService::with_parts(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            Arc::new(JsonSerializer),
        );
        let api = ApiService::new(&config, cache, Arc::new(FakeBackend::new(json!("ok"))));

        let response = api.request("/status", RequestOptions::get(), CacheOptions::default()).await;

        assert_eq!(response.timestamp, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let backend = Arc::new(FakeBackend::new(json!(1)));
        let api = service(backend.clone());

        api.request("/n", RequestOptions::get(), CacheOptions::default()).await;
        let forced = api
            .request("/n", RequestOptions::get(), CacheOptions::default().forced())
            .await;

        assert!(!forced.cached);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_call() {
        let backend = Arc::new(FakeBackend::new(json!(["yua", "quz"])));
        let api = service(backend.clone());

        let (a, b) = tokio::join!(
            api.request("/languages", RequestOptions::get(), CacheOptions::default()),
            api.request("/languages", RequestOptions::get(), CacheOptions::default()),
        );

        assert_eq!(backend.calls(), 1);
        assert_eq!(a.data, b.data);
        assert!(a.success && b.success);
        assert_eq!(api.stats().deduplicated, 1);
        assert_eq!(api.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_different_bodies_do_not_share() {
        let backend = Arc::new(FakeBackend::new(json!("done")));
        let api = service(backend.clone());

        tokio::join!(
            api.request("/translate", RequestOptions::post(json!({"text": "a"})), CacheOptions::default()),
            api.request("/translate", RequestOptions::post(json!({"text": "b"})), CacheOptions::default()),
        );

        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_then_success_is_recorded() {
        let backend = Arc::new(FakeBackend::failing(json!("ok"), 2));
        let api = service(backend.clone());

        let response = api.request("/flaky", RequestOptions::get(), CacheOptions::default()).await;

        assert!(response.success);
        assert_eq!(response.retries, 2);
        assert_eq!(backend.calls(), 3);
        assert_eq!(api.stats().retries, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_failure() {
        let backend = Arc::new(FakeBackend::failing(json!("never"), 10));
        let api = service(backend.clone());

        let response = api.request("/down", RequestOptions::get(), CacheOptions::default()).await;

        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(
            response.error.as_deref(),
            Some("Transport error: connection refused")
        );
        assert_eq!(backend.calls(), 3);
        assert_eq!(api.stats().failures, 1);
        // Failures are not cached
        assert_eq!(api.cache().stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_owner_releases_in_flight_slot() {
        let backend = Arc::new(FakeBackend::new(json!("slow")));
        let api = service(backend.clone());

        let owner = api.request("/slow", RequestOptions::get(), CacheOptions::default());
        let cancelled = tokio::time::timeout(Duration::from_millis(5), owner).await;

        assert!(cancelled.is_err());
        assert_eq!(api.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_translate_text_decodes_response() {
        let backend = Arc::new(FakeBackend::new(json!({
            "translatedText": "Ba'ax ka wa'alik",
            "confidence": 0.9
        })));
        let api = service(backend);

        let response = api
            .translate_text(&TranslationRequest::new("hola", "es", "yua"))
            .await;

        assert!(response.success);
        assert_eq!(response.data.unwrap().translated_text, "Ba'ax ka wa'alik");
    }

    #[tokio::test]
    async fn test_voices_wrong_shape_is_failure() {
        let backend = Arc::new(FakeBackend::new(json!({"unexpected": true})));
        let api = service(backend);

        let response = api.get_available_voices("yua").await;

        assert!(!response.success);
        assert!(response.error.is_some());
    }
}
