use std::env;
use std::time::Duration;

use digitduel::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Reads a whole number of seconds from `var`, if set.
fn seconds_from_env(var: &str) -> Result<Option<Duration>, String> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| format!("{var}={raw:?}: {e}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{var}: {e}")),
    }
}

fn room_config_from_env() -> Result<RoomConfig, String> {
    let mut config = RoomConfig::default();
    if let Some(grace) = seconds_from_env("DIGITDUEL_GRACE_SECS")? {
        config.reconnect_grace = grace;
    }
    if let Some(idle) = seconds_from_env("DIGITDUEL_IDLE_SECS")? {
        config.idle_timeout = idle;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = env::var("DIGITDUEL_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let room_config = room_config_from_env()?;
    let session_config = SessionConfig {
        reconnect_grace: room_config.reconnect_grace,
        ..SessionConfig::default()
    };
    tracing::info!(
        %bind,
        grace_secs = room_config.reconnect_grace.as_secs(),
        idle_secs = room_config.idle_timeout.as_secs(),
        "starting digit duel server"
    );

    let server = DigitDuelServerBuilder::new()
        .bind(&bind)
        .room_config(room_config)
        .session_config(session_config)
        .build(TrustedTokenAuthenticator)
        .await?;
    let registry = server.registry().clone();

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(rooms = registry.room_count().await, "shutting down");
            registry.shutdown().await;
        }
    }
    Ok(())
}
