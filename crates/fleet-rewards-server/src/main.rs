#![forbid(unsafe_code)]

use fleet_rewards_server::{
    build_router, validate_startup_config, ApiConfig, AppState, RewardPolicyConfig,
    StaticDirectory,
};
use fleet_rewards_store::RewardStore;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    let ms = env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_user_set(name: &str) -> HashSet<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(std::string::ToString::to_string)
        .collect()
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("FLEET_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("FLEET_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let db_path = PathBuf::from(
        env::var("FLEET_DB_PATH").unwrap_or_else(|_| "artifacts/rewards.sqlite".to_string()),
    );

    let api_cfg = ApiConfig {
        max_body_bytes: env_usize("FLEET_MAX_BODY_BYTES", 16 * 1024),
        request_timeout: env_duration_ms("FLEET_REQUEST_TIMEOUT_MS", 5000),
        public_origin: env::var("FLEET_PUBLIC_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:8080".to_string()),
    };
    let policy = RewardPolicyConfig {
        signup_credit_cents: env_i64("FLEET_SIGNUP_CREDIT_CENTS", 100),
        minimum_withdrawal_cents: env_i64("FLEET_MIN_WITHDRAWAL_CENTS", 2000),
        currency: env::var("FLEET_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
    };
    validate_startup_config(&api_cfg, &policy)?;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
    }
    let store = RewardStore::open(&db_path, &policy.currency)
        .map_err(|e| format!("open store at {}: {e}", db_path.display()))?;

    // Accounts are written in the same transaction as their ledger entries,
    // so drift here means the database was edited out of band.
    match store.verify_balances() {
        Ok(drifts) => {
            for drift in &drifts {
                warn!(
                    user_id = %drift.user_id,
                    stored_cents = drift.stored_cents,
                    ledger_cents = drift.ledger_cents,
                    "account balance disagrees with its ledger"
                );
            }
            if drifts.is_empty() {
                info!("balance reconciliation clean");
            }
        }
        Err(e) => return Err(format!("balance reconciliation failed: {e}")),
    }

    let known_users = env::var("FLEET_KNOWN_USERS")
        .ok()
        .map(|_| env_user_set("FLEET_KNOWN_USERS"));
    let identity = Arc::new(StaticDirectory {
        known_users,
        admins: env_user_set("FLEET_ADMIN_USERS"),
    });

    let state = AppState::with_config(store, identity, api_cfg, policy);
    let app = build_router(state);

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("{} listening on {bind_addr}", fleet_rewards_server::CRATE_NAME);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            let drain_ms = env::var("FLEET_SHUTDOWN_DRAIN_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
