//! In-memory sliding-window limiter for login attempts.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(HashMap::new())),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records an attempt for `key` and reports whether it is within the limit.
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut attempts = self.attempts.lock().await;
        if attempts.len() >= PRUNE_THRESHOLD {
            self.prune(&mut attempts, now);
        }
        let history = attempts.entry(key.to_string()).or_default();

        while let Some(oldest) = history.front() {
            if now.duration_since(*oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() < self.max_attempts {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Forget a key, e.g. after a successful login.
    pub async fn reset(&self, key: &str) {
        self.attempts.lock().await.remove(key);
    }

    /// Drops keys whose attempts are all outside the window.
    fn prune(&self, attempts: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
        attempts.retain(|_, history| {
            history.retain(|t| now.duration_since(*t) < self.window);
            !history.is_empty()
        });
        tracing::debug!("Login limiter pruned to {} active keys", attempts.len());
    }
}
