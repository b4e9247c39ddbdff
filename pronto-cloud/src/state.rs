//! Application state for pronto-cloud

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use crate::auth::rate_limit::RateLimiter;
use crate::config::Config;
use crate::live::{LiveOrderHub, spawn_change_pump};
use crate::push::{NoopTransport, PushDispatcher, PushQueue, PushTransport, VapidKeys, WebPushTransport};
use crate::store::{MemoryStore, PgStore, Store};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Order store (Postgres, or in-memory in development)
    pub store: Arc<dyn Store>,
    /// Live order fan-out to open dashboards
    pub live: LiveOrderHub,
    /// New-order notification queue
    pub push: PushQueue,
    /// JWT secret for owner authentication
    pub jwt_secret: String,
    /// Rate limiter for login/signup/public order routes
    pub rate_limiter: RateLimiter,
    /// Per-business dashboard WebSocket connection count
    pub dashboard_connections: Arc<DashMap<i64, AtomicUsize>>,
    /// VAPID public key handed to browsers; `None` when push is disabled
    pub vapid_public_key: Option<String>,
}

impl AppState {
    /// Connect the store, choose the push transport and start background workers
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url).await?;
                tracing::info!("Connected to PostgreSQL");
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
                Arc::new(MemoryStore::new())
            }
        };

        let (transport, vapid_public_key): (Arc<dyn PushTransport>, Option<String>) =
            match &config.vapid {
                Some(vapid) => {
                    let keys = VapidKeys::from_config(vapid)?;
                    let public_key = keys.public_key().to_string();
                    let transport = WebPushTransport::new(keys, config.push_ttl_secs)?;
                    tracing::info!("Web Push enabled");
                    (Arc::new(transport), Some(public_key))
                }
                None => {
                    tracing::warn!(
                        "VAPID key not configured, push notifications disabled. \
                         Set VAPID_PRIVATE_KEY_PEM to enable."
                    );
                    (Arc::new(NoopTransport), None)
                }
            };

        let mut state = Self::with_parts(config, store, transport);
        state.vapid_public_key = vapid_public_key;
        Ok(state)
    }

    /// Assemble state around an existing store and transport.
    ///
    /// Spawns the push dispatcher and the change pump, so it must run
    /// inside a tokio runtime.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn Store>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let live = LiveOrderHub::new();
        spawn_change_pump(store.as_ref(), live.clone());

        let (push, _dispatcher) =
            PushDispatcher::new(store.clone(), transport).spawn(config.push_queue_capacity);

        Self {
            store,
            live,
            push,
            jwt_secret: config.jwt_secret.clone(),
            rate_limiter: RateLimiter::new(),
            dashboard_connections: Arc::new(DashMap::new()),
            vapid_public_key: None,
        }
    }
}
