use crate::auth::Authenticator;
use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::realtime::registry::Broadcaster;
use crate::store::Store;

/// Server context shared by every handler and connection.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub authenticator: Authenticator,
    pub broadcaster: Broadcaster,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let metrics = Metrics::new();
        let authenticator = Authenticator::new(&config.jwt_secret, config.token_ttl_hours);

        Self {
            store: Store::new(),
            authenticator,
            broadcaster: Broadcaster::new(metrics.clone()),
            metrics,
            config,
        }
    }
}
