#![forbid(unsafe_code)]

//! HTTP surface for the referral reward ledger. The store handle and the
//! identity collaborator are constructed once by the process entry point and
//! injected here; nothing in this crate reaches for ambient globals.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use fleet_rewards_store::RewardStore;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::Mutex;

mod config;
mod http;
mod identity;
mod metrics;

pub use config::{validate_startup_config, ApiConfig, RewardPolicyConfig};
pub use identity::{FakeDirectory, IdentityDirectory, IdentityError, StaticDirectory};

pub const CRATE_NAME: &str = "fleet-rewards-server";

use metrics::RequestMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<RewardStore>>,
    pub identity: Arc<dyn IdentityDirectory>,
    pub api: ApiConfig,
    pub policy: RewardPolicyConfig,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: RewardStore, identity: Arc<dyn IdentityDirectory>) -> Self {
        Self::with_config(
            store,
            identity,
            ApiConfig::default(),
            RewardPolicyConfig::default(),
        )
    }

    #[must_use]
    pub fn with_config(
        store: RewardStore,
        identity: Arc<dyn IdentityDirectory>,
        api: ApiConfig,
        policy: RewardPolicyConfig,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            identity,
            api,
            policy,
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::endpoints::healthz_handler))
        .route("/readyz", get(http::endpoints::readyz_handler))
        .route("/metrics", get(http::endpoints::metrics_handler))
        .route(
            "/v1/referrals",
            post(http::endpoints::create_referral_handler)
                .get(http::endpoints::list_referrals_handler),
        )
        .route(
            "/v1/signup-credit",
            post(http::endpoints::signup_credit_handler),
        )
        .route(
            "/v1/reward-account",
            get(http::endpoints::reward_account_handler),
        )
        .route(
            "/v1/reward-account/ledger",
            get(http::endpoints::reward_ledger_handler),
        )
        .route(
            "/v1/withdrawals",
            post(http::endpoints::create_withdrawal_handler)
                .get(http::endpoints::list_withdrawals_handler),
        )
        .route(
            "/v1/withdrawals/:id/process",
            post(http::endpoints::process_withdrawal_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            http::handlers::request_timeout_mw,
        ))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
