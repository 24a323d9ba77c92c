use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use crate::storage::FileStore;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub session_key: Vec<u8>,
    pub secure_cookies: bool,
    pub media: Arc<dyn FileStore>,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig, media: Arc<dyn FileStore>) -> Self {
        Self {
            pool,
            session_key: config.session_key.clone(),
            secure_cookies: config.secure_cookies,
            media,
            // 5 login attempts per 60 seconds per IP
            login_limiter: RateLimiter::new(5, 60),
        }
    }
}

pub type SharedState = Arc<AppState>;
