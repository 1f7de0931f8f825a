//! API authentication and per-client rate limiting: a `SecurityScheme`
//! derive reading the shared-secret header, and a token-bucket middleware
//! enforced ahead of route dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use poem::http::StatusCode;
use poem::{Endpoint, Middleware, Request, Response, Result as PoemResult};
use poem_openapi::auth::ApiKey;
use poem_openapi::SecurityScheme;

use crate::clock::Clock;

/// Extracted from the `X-API-Key` header on every OpenAPI-routed request.
#[derive(SecurityScheme)]
#[oai(type = "api_key", key_name = "X-API-Key", in = "header")]
pub struct ApiKeyAuth(ApiKey);

impl ApiKeyAuth {
    pub fn key(&self) -> &str {
        &self.0.key
    }
}

/// A per-IP token bucket: `capacity` tokens, refilled at `refill_per_sec`,
/// one token spent per request.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone, Copy)]
struct Bucket {
    tokens: f64,
    updated_at: f64,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn allow(&self, client_key: &str) -> bool {
        let now = self.clock.unix_time();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(client_key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            updated_at: now,
        });

        let elapsed = (now - bucket.updated_at).max(0.0);
        let tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if tokens < 1.0 {
            bucket.tokens = tokens;
            bucket.updated_at = now;
            false
        } else {
            bucket.tokens = tokens - 1.0;
            bucket.updated_at = now;
            true
        }
    }
}

/// poem middleware applying the rate limiter ahead of route dispatch, keyed
/// by the caller's remote IP.
pub struct RateLimitLayer {
    pub limiter: Arc<RateLimiter>,
}

impl<E: Endpoint> Middleware<E> for RateLimitLayer {
    type Output = RateLimitEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RateLimitEndpoint {
            ep,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

pub struct RateLimitEndpoint<E> {
    ep: E,
    limiter: Arc<RateLimiter>,
}

impl<E: Endpoint> Endpoint for RateLimitEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        let client_key = req
            .remote_addr()
            .as_socket_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if !self.limiter.allow(&client_key) {
            return Err(poem::Error::from_status(StatusCode::TOO_MANY_REQUESTS));
        }

        self.ep.call(req).await.map(poem::IntoResponse::into_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::time::Duration;

    #[test]
    fn allows_bursts_up_to_capacity_then_blocks() {
        let clock = Arc::new(VirtualClock::new());
        let limiter = RateLimiter::new(3, 1.0, clock);
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
    }

    #[test]
    fn refills_over_time() {
        let clock = Arc::new(VirtualClock::new());
        let limiter = RateLimiter::new(1, 2.0, Arc::clone(&clock) as Arc<dyn Clock>);
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        clock.advance(Duration::from_millis(600));
        assert!(limiter.allow("1.2.3.4"));
    }

    #[test]
    fn buckets_are_independent_per_client() {
        let clock = Arc::new(VirtualClock::new());
        let limiter = RateLimiter::new(1, 1.0, clock);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }
}
