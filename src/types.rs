//! Core types used throughout OtcBot
//!
//! Defines the closed enumerations and immutable value structs shared by the
//! session, strategy, risk and execution layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Autonomous trading policy: alternate directions or stick to one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    Oscillate,
    Slide,
}

impl Default for BotMode {
    fn default() -> Self {
        BotMode::Oscillate
    }
}

impl BotMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "oscillate" => Some(BotMode::Oscillate),
            "slide" => Some(BotMode::Slide),
            _ => None,
        }
    }
}

impl fmt::Display for BotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotMode::Oscillate => write!(f, "oscillate"),
            BotMode::Slide => write!(f, "slide"),
        }
    }
}

/// Trading direction for a binary option position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Buy
    }
}

impl Direction {
    /// The other side, used by the oscillating auto-trade loop
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Some(Direction::Buy),
            "sell" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Running,
    Paused,
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Stopped
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Paused => write!(f, "paused"),
        }
    }
}

/// Why a session left the running state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetProfitReached,
    MartingaleLimitReached,
    CapitalGuardrail,
    UserStop,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetProfitReached => write!(f, "target_profit_reached"),
            StopReason::MartingaleLimitReached => write!(f, "martingale_limit_reached"),
            StopReason::CapitalGuardrail => write!(f, "capital_guardrail"),
            StopReason::UserStop => write!(f, "user_stop"),
        }
    }
}

/// Settled trade outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
        }
    }
}

/// How trades are enacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Signals are surfaced, a human clicks and records the outcome
    Manual,
    /// Probability-weighted fills from a seeded RNG
    Simulated,
    /// UI-automation adapter drives a broker page; the orchestrator loop is active
    Broker,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Manual
    }
}

impl ExecutionMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(ExecutionMode::Manual),
            "simulated" => Some(ExecutionMode::Simulated),
            "broker" => Some(ExecutionMode::Broker),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Manual => write!(f, "manual"),
            ExecutionMode::Simulated => write!(f, "simulated"),
            ExecutionMode::Broker => write!(f, "broker"),
        }
    }
}

/// Supported binary option expiries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiry {
    S5,
    S10,
    S15,
    S30,
    M1,
    M2,
    M5,
}

impl Default for Expiry {
    fn default() -> Self {
        Expiry::S5
    }
}

impl Expiry {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Expiry::S5 => 5,
            Expiry::S10 => 10,
            Expiry::S15 => 15,
            Expiry::S30 => 30,
            Expiry::M1 => 60,
            Expiry::M2 => 120,
            Expiry::M5 => 300,
        }
    }

    /// Parse from a broker label, case-insensitive
    pub fn from_label(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "S5" => Some(Expiry::S5),
            "S10" => Some(Expiry::S10),
            "S15" => Some(Expiry::S15),
            "S30" => Some(Expiry::S30),
            "M1" => Some(Expiry::M1),
            "M2" => Some(Expiry::M2),
            "M5" => Some(Expiry::M5),
            _ => None,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::S5 => write!(f, "S5"),
            Expiry::S10 => write!(f, "S10"),
            Expiry::S15 => write!(f, "S15"),
            Expiry::S30 => write!(f, "S30"),
            Expiry::M1 => write!(f, "M1"),
            Expiry::M2 => write!(f, "M2"),
            Expiry::M5 => write!(f, "M5"),
        }
    }
}

/// Trading signal produced by the strategy engine or the autonomous loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Unique signal ID
    pub id: String,
    /// OTC pair, e.g. "EURUSD_otc"
    pub pair: String,
    /// Predicted direction
    pub direction: Direction,
    /// Expiry the trade should be placed with
    pub expiry: Expiry,
    /// Confidence level (0.0 - 0.99)
    pub confidence: f64,
    /// When the signal was formed
    pub timestamp: DateTime<Utc>,
    /// Human-readable reason
    pub reason: String,
}

impl TradeSignal {
    pub fn new(
        pair: impl Into<String>,
        direction: Direction,
        expiry: Expiry,
        confidence: f64,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.into(),
            direction,
            expiry,
            confidence,
            timestamp,
            reason: reason.into(),
        }
    }
}

/// Settled trade produced by the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// OTC pair
    pub pair: String,
    /// Direction the stake was placed on
    pub direction: Direction,
    /// Stake in account currency
    pub stake: f64,
    /// Expiry the trade ran with
    pub expiry: Expiry,
    /// Settled outcome
    pub outcome: TradeOutcome,
    /// Realized profit (negative on a loss)
    pub pnl: f64,
    /// Settlement timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_label_roundtrip() {
        assert_eq!(Expiry::from_label("m1"), Some(Expiry::M1));
        assert_eq!(Expiry::from_label("S30"), Some(Expiry::S30));
        assert_eq!(Expiry::from_label("H4"), None);
        assert_eq!(Expiry::M5.duration_secs(), 300);
        assert_eq!(Expiry::M1.to_string(), "M1");
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(BotMode::from_str("SLIDE"), Some(BotMode::Slide));
        assert_eq!(ExecutionMode::from_str("broker"), Some(ExecutionMode::Broker));
        assert_eq!(ExecutionMode::from_str("selenium"), None);
    }
}
