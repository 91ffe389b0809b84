//! Risk Engine - martingale staking and stop guardrails
//!
//! Pure function layer: computes the next stake from the martingale rules and
//! evaluates the two stop-triggering guardrails (martingale depth, capital
//! exhaustion). All trade history is passed in by the caller; the engine holds
//! only the configured parameters and makes no ordering decisions — the
//! session engine combines these checks in its fixed precedence.

use crate::config::BotSettings;
use crate::types::StopReason;

/// Round to cents, the resolution every stake and pnl is tracked at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct RiskEngine {
    martingale_percent: f64,
    martingale_limit: u32,
    disable_martingale: bool,
}

impl RiskEngine {
    pub fn new(settings: &BotSettings) -> Self {
        Self {
            martingale_percent: settings.martingale_percent,
            martingale_limit: settings.martingale_limit,
            disable_martingale: settings.disable_martingale,
        }
    }

    /// Next stake from the martingale progression. Resets to the base stake
    /// after any win (and on the first trade); grows by the configured
    /// percentage after a loss.
    pub fn next_stake(&self, base_stake: f64, last_stake: f64, last_was_loss: bool) -> f64 {
        if self.disable_martingale {
            return base_stake;
        }
        if !last_was_loss {
            return base_stake;
        }
        round2(last_stake * (1.0 + self.martingale_percent / 100.0))
    }

    /// True when the configured loss-streak depth is exhausted. Never triggers
    /// while martingale is disabled or the limit is 0 (unlimited).
    pub fn martingale_stop_triggered(&self, current_step: u32) -> bool {
        if self.disable_martingale {
            return false;
        }
        self.martingale_limit > 0 && current_step >= self.martingale_limit
    }

    /// True when the proposed stake cannot be covered by what is left of the
    /// session capital (capital + session profit, which can be negative).
    pub fn exceeds_capital_guardrail(&self, next_stake: f64, remaining_capital: f64) -> bool {
        next_stake > remaining_capital
    }

    pub fn guardrail_reason() -> StopReason {
        StopReason::CapitalGuardrail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(percent: f64, limit: u32, disabled: bool) -> RiskEngine {
        RiskEngine::new(&BotSettings {
            martingale_percent: percent,
            martingale_limit: limit,
            disable_martingale: disabled,
            ..Default::default()
        })
    }

    #[test]
    fn test_stake_resets_after_win() {
        let risk = engine(80.0, 5, false);
        assert_eq!(risk.next_stake(1.0, 3.24, false), 1.0);
        assert_eq!(risk.next_stake(2.5, 100.0, false), 2.5);
    }

    #[test]
    fn test_stake_grows_geometrically_on_losses() {
        let risk = engine(80.0, 5, false);
        let mut stake = 1.0;
        stake = risk.next_stake(1.0, stake, true);
        assert_eq!(stake, 1.80);
        stake = risk.next_stake(1.0, stake, true);
        assert_eq!(stake, 3.24);
        stake = risk.next_stake(1.0, stake, true);
        assert_eq!(stake, 5.83);
    }

    #[test]
    fn test_disabled_martingale_always_base() {
        let risk = engine(80.0, 5, true);
        assert_eq!(risk.next_stake(1.0, 50.0, true), 1.0);
        // The depth stop can never trigger while disabled
        assert!(!risk.martingale_stop_triggered(0));
        assert!(!risk.martingale_stop_triggered(19));
        assert!(!risk.martingale_stop_triggered(u32::MAX));
    }

    #[test]
    fn test_martingale_stop_threshold() {
        let risk = engine(80.0, 3, false);
        assert!(!risk.martingale_stop_triggered(2));
        assert!(risk.martingale_stop_triggered(3));
        assert!(risk.martingale_stop_triggered(4));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let risk = engine(80.0, 0, false);
        assert!(!risk.martingale_stop_triggered(100));
    }

    #[test]
    fn test_capital_guardrail() {
        let risk = engine(80.0, 5, false);
        assert!(!risk.exceeds_capital_guardrail(5.0, 5.0));
        assert!(risk.exceeds_capital_guardrail(5.01, 5.0));
        // Remaining capital can be negative after a losing streak
        assert!(risk.exceeds_capital_guardrail(1.0, -0.5));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2.6568), 2.66);
        assert_eq!(round2(1.0 * 1.8), 1.8);
        assert_eq!(round2(-2.80 + 2.66), -0.14);
    }
}
