//! Configuration management for OtcBot
//!
//! Loads from YAML files + environment variables via .env. The loaded
//! `BotSettings` snapshot is validated once and treated as read-only by the
//! session core for the lifetime of a session.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{BotMode, Direction, ExecutionMode, Expiry};

/// Validated settings snapshot consumed by the session core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Capital available to the session, in account currency
    pub trade_capital: f64,
    /// Session profit at which the session stops itself
    pub target_profit: f64,
    /// Base stake for the first trade and after every win
    pub trade_amount: f64,
    /// Expiry every trade is placed with
    pub expiry: Expiry,
    /// Stake increase after a loss, in percent (e.g. 80 = ×1.8)
    pub martingale_percent: f64,
    /// Consecutive-loss depth at which the session stops (0 = unlimited)
    pub martingale_limit: u32,
    /// Force flat staking regardless of loss streaks
    pub disable_martingale: bool,
    /// Autonomous direction policy
    pub mode: BotMode,
    /// Fixed direction used in slide mode
    pub slide_direction: Direction,
    /// Broker payout on a winning stake (0.82 = 82%)
    pub payout_rate: f64,
    /// Pairs the strategy may signal on
    #[serde(default = "default_enabled_pairs")]
    pub enabled_pairs: Vec<String>,
    /// Allowed expiries per pair
    #[serde(default = "default_pair_expiry_rules")]
    pub pair_expiry_rules: HashMap<String, Vec<Expiry>>,
    /// Restrict signal generation to a daily hour window
    pub schedule_enabled: bool,
    /// First hour (inclusive) of the trading window
    pub schedule_start_hour: u32,
    /// Last hour (inclusive); smaller than start = window wraps past midnight
    pub schedule_end_hour: u32,
    /// How trades are enacted
    pub execution_mode: ExecutionMode,
    /// Execute a strategy signal as soon as it is emitted
    pub auto_execute_signals: bool,
    /// Minimum seconds between autonomous trades in broker mode
    pub trade_cooldown_secs: u64,
}

fn default_enabled_pairs() -> Vec<String> {
    vec!["EURUSD_otc".to_string(), "GBPUSD_otc".to_string()]
}

fn default_pair_expiry_rules() -> HashMap<String, Vec<Expiry>> {
    use Expiry::*;
    HashMap::from([
        (
            "EURUSD_otc".to_string(),
            vec![S5, S10, S15, S30, M1, M2, M5],
        ),
        ("GBPUSD_otc".to_string(), vec![S5, S10, S15, S30, M1, M2]),
        ("USDJPY_otc".to_string(), vec![S5, S10, S15, S30, M1]),
        ("AUDUSD_otc".to_string(), vec![S5, S10, S15, M1]),
    ])
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            trade_capital: 100.0,
            target_profit: 20.0,
            trade_amount: 1.0,
            expiry: Expiry::S5,
            martingale_percent: 80.0,
            martingale_limit: 5,
            disable_martingale: false,
            mode: BotMode::Oscillate,
            slide_direction: Direction::Buy,
            payout_rate: 0.82,
            enabled_pairs: default_enabled_pairs(),
            pair_expiry_rules: default_pair_expiry_rules(),
            schedule_enabled: false,
            schedule_start_hour: 0,
            schedule_end_hour: 23,
            execution_mode: ExecutionMode::Manual,
            auto_execute_signals: true,
            trade_cooldown_secs: 65,
        }
    }
}

impl BotSettings {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("trade_capital", 100.0)?
            .set_default("target_profit", 20.0)?
            .set_default("trade_amount", 1.0)?
            .set_default("expiry", "S5")?
            .set_default("martingale_percent", 80.0)?
            .set_default("martingale_limit", 5)?
            .set_default("disable_martingale", false)?
            .set_default("mode", "oscillate")?
            .set_default("slide_direction", "buy")?
            .set_default("payout_rate", 0.82)?
            .set_default("schedule_enabled", false)?
            .set_default("schedule_start_hour", 0)?
            .set_default("schedule_end_hour", 23)?
            .set_default("execution_mode", "manual")?
            .set_default("auto_execute_signals", true)?
            .set_default("trade_cooldown_secs", 65)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (OTCBOT_*)
            .add_source(Environment::with_prefix("OTCBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let settings: BotSettings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the snapshot. Called once before a session ever sees it;
    /// the core itself never re-checks these invariants.
    pub fn validate(&self) -> Result<()> {
        if self.trade_capital <= 0.0 {
            bail!("trade_capital must be > 0");
        }
        if self.target_profit <= 0.0 {
            bail!("target_profit must be > 0");
        }
        if self.trade_amount <= 0.0 {
            bail!("trade_amount must be > 0");
        }
        if self.trade_amount > self.trade_capital {
            bail!("trade_amount cannot exceed trade_capital");
        }
        if !(0.0..=500.0).contains(&self.martingale_percent) {
            bail!("martingale_percent must be between 0 and 500");
        }
        if self.martingale_limit > 20 {
            bail!("martingale_limit must be between 0 and 20");
        }
        if self.payout_rate <= 0.0 || self.payout_rate > 1.0 {
            bail!("payout_rate must be between 0 and 1");
        }
        if self.enabled_pairs.is_empty() {
            bail!("At least one OTC pair must be enabled");
        }
        for pair in &self.enabled_pairs {
            if !self.pair_expiry_rules.contains_key(pair) {
                bail!("Enabled pair '{}' is not in pair expiry rules", pair);
            }
        }
        for (pair, expiries) in &self.pair_expiry_rules {
            if expiries.is_empty() {
                bail!("Pair '{}' must define at least one allowed expiry", pair);
            }
        }
        if self.schedule_start_hour > 23 {
            bail!("schedule_start_hour must be between 0 and 23");
        }
        if self.schedule_end_hour > 23 {
            bail!("schedule_end_hour must be between 0 and 23");
        }
        Ok(())
    }

    /// Generate a digest of the settings for logging
    pub fn digest(&self) -> String {
        format!(
            "capital={} target={} stake={} expiry={} mode={} exec={} pairs={:?}",
            self.trade_capital,
            self.target_profit,
            self.trade_amount,
            self.expiry,
            self.mode,
            self.execution_mode,
            self.enabled_pairs
        )
    }
}

impl std::fmt::Display for BotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(BotSettings::default().validate().is_ok());
    }

    #[test]
    fn test_stake_cannot_exceed_capital() {
        let settings = BotSettings {
            trade_amount: 150.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_enabled_pair_must_have_rules() {
        let settings = BotSettings {
            enabled_pairs: vec!["XAUUSD_otc".to_string()],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_martingale_bounds() {
        let settings = BotSettings {
            martingale_percent: 600.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = BotSettings {
            martingale_limit: 21,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_schedule_hours_bounds() {
        let settings = BotSettings {
            schedule_end_hour: 24,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
