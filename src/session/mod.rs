//! Session Engine - lifecycle state machine and session statistics
//!
//! Owns the per-session ledger (profit, counters, current stake), applies
//! settled trade outcomes, and enforces the stop rules in a fixed precedence:
//! target profit first, then martingale depth, then the capital guardrail.
//! Statistics are created fresh on every `start()` and frozen once the
//! session stops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::BotSettings;
use crate::risk::{round2, RiskEngine};
use crate::types::{
    BotMode, Direction, LifecycleState, StopReason, TradeOutcome, TradeRecord,
};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Outcomes can only be applied to a running session
    #[error("session is not running")]
    NotRunning,
}

/// Mutable only through the session engine; a snapshot is cheap to clone out.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: LifecycleState,
    pub start_balance: f64,
    pub session_profit: f64,
    pub trades_taken: u32,
    pub wins: u32,
    pub losses: u32,
    pub current_stake: f64,
    pub current_mode: BotMode,
    pub current_direction: Direction,
    pub loss_streak: u32,
    pub martingale_step: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            state: LifecycleState::Stopped,
            start_balance: 0.0,
            session_profit: 0.0,
            trades_taken: 0,
            wins: 0,
            losses: 0,
            current_stake: 0.0,
            current_mode: BotMode::default(),
            current_direction: Direction::default(),
            loss_streak: 0,
            martingale_step: 0,
            started_at: None,
            stopped_at: None,
            stop_reason: None,
        }
    }
}

pub struct SessionEngine {
    settings: BotSettings,
    risk: RiskEngine,
    stats: SessionStats,
}

impl SessionEngine {
    pub fn new(settings: BotSettings) -> Self {
        let risk = RiskEngine::new(&settings);
        Self {
            settings,
            risk,
            stats: SessionStats::default(),
        }
    }

    /// Read-only view of the current statistics
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Begin a fresh session. No-op when one is already running.
    pub fn start(&mut self) {
        if self.stats.state == LifecycleState::Running {
            return;
        }
        self.stats = SessionStats {
            state: LifecycleState::Running,
            start_balance: self.settings.trade_capital,
            current_stake: self.settings.trade_amount,
            current_mode: self.settings.mode,
            current_direction: self.settings.slide_direction,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        info!(capital = self.settings.trade_capital, "session started");
    }

    /// `running -> paused`; no-op otherwise. Statistics are preserved.
    pub fn pause(&mut self) {
        if self.stats.state == LifecycleState::Running {
            self.stats.state = LifecycleState::Paused;
        }
    }

    /// `paused -> running`; no-op otherwise.
    pub fn resume(&mut self) {
        if self.stats.state == LifecycleState::Paused {
            self.stats.state = LifecycleState::Running;
        }
    }

    /// Any state -> `stopped`, recording the reason and the stop timestamp.
    pub fn stop(&mut self, reason: StopReason) {
        self.stats.state = LifecycleState::Stopped;
        self.stats.stop_reason = Some(reason);
        self.stats.stopped_at = Some(Utc::now());
        info!(%reason, profit = self.stats.session_profit, "session stopped");
    }

    /// Overwrite the tracked profit with an adapter-observed value. Used by
    /// the orchestrator when the broker balance is the source of truth.
    pub fn set_session_profit(&mut self, profit: f64) {
        self.stats.session_profit = profit;
    }

    /// Settle one trade against the session ledger, then enforce the stop
    /// rules. Fails unless the session is running.
    pub fn apply_trade_outcome(
        &mut self,
        outcome: TradeOutcome,
        pair: &str,
    ) -> Result<TradeRecord, SessionError> {
        if self.stats.state != LifecycleState::Running {
            return Err(SessionError::NotRunning);
        }

        let stake = self.stats.current_stake;
        let pnl = match outcome {
            TradeOutcome::Win => round2(stake * self.settings.payout_rate),
            TradeOutcome::Loss => -stake,
        };

        self.stats.trades_taken += 1;
        self.stats.session_profit = round2(self.stats.session_profit + pnl);

        match outcome {
            TradeOutcome::Win => {
                self.stats.wins += 1;
                self.stats.loss_streak = 0;
                self.stats.martingale_step = 0;
            }
            TradeOutcome::Loss => {
                self.stats.losses += 1;
                self.stats.loss_streak += 1;
                self.stats.martingale_step += 1;
            }
        }

        let record = TradeRecord {
            pair: pair.to_string(),
            direction: self.stats.current_direction,
            stake,
            expiry: self.settings.expiry,
            outcome,
            pnl,
            timestamp: Utc::now(),
        };

        self.enforce_stop_rules(outcome);
        Ok(record)
    }

    /// Precedence is load-bearing: target profit beats every other rule even
    /// after a loss, and the martingale-depth check runs before the capital
    /// guardrail.
    fn enforce_stop_rules(&mut self, outcome: TradeOutcome) {
        if self.stats.session_profit >= self.settings.target_profit {
            self.stop(StopReason::TargetProfitReached);
            return;
        }

        if outcome == TradeOutcome::Loss
            && self.risk.martingale_stop_triggered(self.stats.martingale_step)
        {
            self.stop(StopReason::MartingaleLimitReached);
            return;
        }

        let remaining = self.settings.trade_capital + self.stats.session_profit;
        let next_stake = self.risk.next_stake(
            self.settings.trade_amount,
            self.stats.current_stake,
            outcome == TradeOutcome::Loss,
        );

        if self.risk.exceeds_capital_guardrail(next_stake, remaining) {
            self.stop(RiskEngine::guardrail_reason());
            return;
        }

        self.stats.current_stake = next_stake;
    }
}
