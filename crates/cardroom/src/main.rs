//! `cardroom-server`: runs a card room server configured from the
//! environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `CARDROOM_BIND` | `127.0.0.1:2567` |
//! | `CARDROOM_MAX_CLIENTS` | `20` |
//! | `CARDROOM_PATCH_RATE` | `20` (Hz) |
//! | `CARDROOM_RECONNECT_GRACE_SECS` | `10` |
//! | `CARDROOM_DEV_TOKENS` | none (`token=user,token=user`) |
//!
//! Log filtering follows `RUST_LOG`, defaulting to `info`.

use std::str::FromStr;
use std::time::Duration;

use cardroom::prelude::*;
use cardroom::DEFAULT_BIND_ADDR;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Reads and parses `key`, keeping `default` when it is unset or invalid.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<(), CardroomError> {
    init_tracing();

    let defaults = RoomConfig::default();
    let room_config = RoomConfig {
        max_clients: env_or("CARDROOM_MAX_CLIENTS", defaults.max_clients),
        patch_rate_hz: env_or("CARDROOM_PATCH_RATE", defaults.patch_rate_hz),
        reconnect_grace: Duration::from_secs(env_or(
            "CARDROOM_RECONNECT_GRACE_SECS",
            defaults.reconnect_grace.as_secs(),
        )),
        ..defaults
    };
    let bind: String = env_or("CARDROOM_BIND", DEFAULT_BIND_ADDR.to_string());

    let tokens = TokenTable::parse(&std::env::var("CARDROOM_DEV_TOKENS").unwrap_or_default());
    if tokens.is_empty() {
        tracing::warn!("CARDROOM_DEV_TOKENS is empty, every join will be refused");
    } else {
        tracing::info!(tokens = tokens.len(), "loaded dev tokens");
    }

    let server = CardroomServer::builder()
        .bind(&bind)
        .room_config(room_config)
        .build(tokens)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");
    server.run().await
}
