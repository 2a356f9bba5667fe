use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::ProviderRegistry;
use sa_ratelimit::RateLimiter;
use sa_store::Store;

use crate::auth::JwtCodec;
use crate::connections::ConnectionRegistry;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub providers: Arc<ProviderRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub jwt: Arc<JwtCodec>,
    pub connections: Arc<ConnectionRegistry>,
}
