use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Request-count limiter over a fixed window.
///
/// Timestamps older than the window are evicted before each request. Once the
/// quota is used up the caller sleeps until the oldest request leaves the
/// window, and then the whole window is reset instead of sliding, so a forced
/// wait is always followed by a full fresh quota.
///
/// The window is private to one instance. Two limiters pointed at the same
/// remote quota do not see each other's requests.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    request_times: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        RateLimiter { limit: limit.max(1), window, request_times: VecDeque::new() }
    }

    pub fn limit(&self) -> usize { self.limit }

    pub fn window(&self) -> Duration { self.window }

    /// Number of requests currently counted against the window.
    pub fn recorded(&self) -> usize { self.request_times.len() }

    /// Wait for quota if needed, then record one request.
    /// Returns how long the caller was suspended.
    pub async fn acquire(&mut self) -> Duration {
        let now = Instant::now();
        while let Some(&oldest) = self.request_times.front() {
            if now.duration_since(oldest) >= self.window {
                self.request_times.pop_front();
            } else {
                break;
            }
        }

        let mut waited = Duration::ZERO;
        if self.request_times.len() >= self.limit {
            if let Some(&oldest) = self.request_times.front() {
                let wait = self.window.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    info!(wait_secs = wait.as_secs_f64(), limit = self.limit, "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                    self.request_times.clear();
                    waited = wait;
                }
            }
        }

        self.request_times.push_back(Instant::now());
        waited
    }
}
