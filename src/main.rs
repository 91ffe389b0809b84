//! OtcBot - headless session runner
//!
//! Loads the settings snapshot, wires the configured execution adapter and
//! the CSV journal into a controller, then drives the session: a synthetic
//! random-walk price feed in manual/simulated mode, or the autonomous
//! worker alone in broker mode.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use otcbot::config::BotSettings;
use otcbot::controller::BotController;
use otcbot::execution::build_adapter;
use otcbot::persistence::CsvJournal;
use otcbot::types::{ExecutionMode, LifecycleState, StopReason};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = BotSettings::load()?;
    info!(settings = %settings.digest(), "configuration loaded");

    let adapter = build_adapter(&settings);
    let journal = Arc::new(CsvJournal::new("data")?);
    let controller = BotController::new(settings.clone(), adapter, journal)?;

    info!("{}", controller.start().await);

    match settings.execution_mode {
        ExecutionMode::Broker => run_until_shutdown(&controller).await,
        _ => run_price_feed(&controller, &settings).await,
    }

    if controller.stats().await.state != LifecycleState::Stopped {
        info!("{}", controller.stop(StopReason::UserStop).await);
    }
    let snapshot = serde_json::to_string(&controller.stats().await)?;
    info!(session = %snapshot, "final session snapshot");
    println!("{}", controller.status_text().await);
    Ok(())
}

/// Synthetic random-walk feed for manual and simulated sessions
async fn run_price_feed(controller: &BotController, settings: &BotSettings) {
    let pair = settings
        .enabled_pairs
        .first()
        .cloned()
        .unwrap_or_else(|| "EURUSD_otc".to_string());
    let mut rng = StdRng::seed_from_u64(7);
    let mut price = 1.0850;
    let mut ticks = interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = ticks.tick() => {
                price += rng.gen_range(-0.0004..0.0004);
                if let Some(signal) = controller.feed_price(&pair, price, None).await {
                    info!(
                        pair = %signal.pair,
                        direction = %signal.direction,
                        confidence = signal.confidence,
                        reason = %signal.reason,
                        "signal"
                    );
                }
                if controller.stats().await.state == LifecycleState::Stopped {
                    info!("session stopped itself");
                    break;
                }
            }
        }
    }
}

/// Broker mode: the background worker trades on its own; we just report.
async fn run_until_shutdown(controller: &BotController) {
    let mut status = interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = status.tick() => {
                if controller.stats().await.state == LifecycleState::Stopped {
                    info!("session stopped itself");
                    break;
                }
                info!("\n{}", controller.status_text().await);
            }
        }
    }
}
