//! `MentorLink` Bridge Server -- role-aware teaching-session relay.
//!
//! An axum WebSocket server that admits coding agents, teaching agents,
//! and students into a shared session, stamps every message with its
//! sender's identity, and routes it by role. Message content is opaque to
//! the bridge.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9400
//! cargo run --bin mentorlink-bridge
//!
//! # Run on custom address
//! cargo run --bin mentorlink-bridge -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! MENTORLINK_ADDR=127.0.0.1:8080 cargo run --bin mentorlink-bridge
//! ```

use std::sync::Arc;

use clap::Parser;
use mentorlink_bridge::bridge::{self, BridgeState};
use mentorlink_bridge::config::{BridgeCliArgs, BridgeConfig};

#[tokio::main]
async fn main() {
    let cli = BridgeCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match BridgeConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting mentorlink bridge server");

    let state = Arc::new(BridgeState::with_config(&config));

    match bridge::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "bridge server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "bridge server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start bridge server");
            std::process::exit(1);
        }
    }
}
