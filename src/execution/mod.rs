//! Execution adapters - how a trade signal becomes an actual trade
//!
//! The session core only depends on the `ExecutionAdapter` capability trait;
//! concrete variants (manual confirmation, probability-weighted simulator,
//! broker automation) are swappable without touching the session engine.
//! Expected failures are reported through `accepted = false`, never as
//! errors, so a broker hiccup can never poison the session ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

use crate::config::BotSettings;
use crate::types::{Direction, ExecutionMode, Expiry, TradeOutcome, TradeSignal};

/// Result contract echoed back from an adapter
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the adapter enacted (or queued) the trade
    pub accepted: bool,
    /// Human-readable status
    pub message: String,
    /// Settled outcome, when the adapter can observe it synchronously
    pub outcome: Option<TradeOutcome>,
    /// Echoed from the signal
    pub pair: String,
    pub direction: Direction,
    pub expiry: Expiry,
    /// When the adapter acted
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn accepted(
        signal: &TradeSignal,
        message: impl Into<String>,
        outcome: Option<TradeOutcome>,
    ) -> Self {
        Self {
            accepted: true,
            message: message.into(),
            outcome,
            pair: signal.pair.clone(),
            direction: signal.direction,
            expiry: signal.expiry,
            executed_at: Utc::now(),
        }
    }

    pub fn rejected(signal: &TradeSignal, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            outcome: None,
            pair: signal.pair.clone(),
            direction: signal.direction,
            expiry: signal.expiry,
            executed_at: Utc::now(),
        }
    }
}

/// Capability interface implemented by every execution backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Identifier shown in status output
    fn name(&self) -> &'static str;

    /// Enact one trade. Must not error for expected failure modes; those are
    /// signalled via `accepted = false` plus a message.
    async fn execute_signal(&self, signal: &TradeSignal, stake: f64) -> ExecutionResult;

    /// Current account balance at the broker, when the backend can read one.
    /// `None` means unknown, never zero.
    async fn account_balance(&self) -> Option<f64> {
        None
    }
}

/// No-op adapter: surfaces the instruction and leaves clicking and outcome
/// recording to the human.
pub struct ManualConfirmAdapter;

#[async_trait]
impl ExecutionAdapter for ManualConfirmAdapter {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn execute_signal(&self, signal: &TradeSignal, stake: f64) -> ExecutionResult {
        let message = format!(
            "Manual mode: execute {} on {} for {} with stake {}, then record Win/Loss.",
            signal.direction, signal.pair, signal.expiry, stake
        );
        ExecutionResult::accepted(signal, message, None)
    }
}

/// Deterministic simulator: fills every trade and settles it with a win
/// probability equal to the signal's confidence (clamped to [0.05, 0.95]).
pub struct SimulatedAdapter {
    rng: Mutex<StdRng>,
}

impl SimulatedAdapter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new(42)
    }
}

#[async_trait]
impl ExecutionAdapter for SimulatedAdapter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute_signal(&self, signal: &TradeSignal, stake: f64) -> ExecutionResult {
        let win_probability = signal.confidence.clamp(0.05, 0.95);
        let roll: f64 = {
            let mut rng = match self.rng.lock() {
                Ok(rng) => rng,
                Err(poisoned) => poisoned.into_inner(),
            };
            rng.gen()
        };
        let outcome = if roll <= win_probability {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        };
        let message = format!(
            "Simulated trade on {}: {} {}, stake={}, outcome={}",
            signal.pair, signal.direction, signal.expiry, stake, outcome
        );
        ExecutionResult::accepted(signal, message, Some(outcome))
    }
}

/// Placeholder used while no concrete broker automation is plugged in.
pub struct BrokerStubAdapter;

#[async_trait]
impl ExecutionAdapter for BrokerStubAdapter {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn execute_signal(&self, signal: &TradeSignal, _stake: f64) -> ExecutionResult {
        ExecutionResult::rejected(
            signal,
            "Broker mode selected but no concrete broker automation is configured yet.",
        )
    }
}

/// Build the adapter matching the configured execution mode
pub fn build_adapter(settings: &BotSettings) -> Arc<dyn ExecutionAdapter> {
    match settings.execution_mode {
        ExecutionMode::Manual => Arc::new(ManualConfirmAdapter),
        ExecutionMode::Simulated => Arc::new(SimulatedAdapter::default()),
        ExecutionMode::Broker => Arc::new(BrokerStubAdapter),
    }
}
