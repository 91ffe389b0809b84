//! Strategy Engine - momentum signal generation per OTC pair
//!
//! Maintains a bounded rolling price window per pair, computes a 14-period
//! RSI plus 5/20-period moving averages on every tick, and emits a
//! directional signal when the oscillator reaches an extreme while the
//! moving averages confirm the trend. A signal locks the pair until the
//! implied trade would have settled, so one setup yields one trade.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::info;

use crate::config::BotSettings;
use crate::pairs::PairPolicy;
use crate::risk::round2;
use crate::types::{BotMode, Direction, TradeSignal};

/// Rolling window capacity per pair
const PRICE_WINDOW: usize = 200;

/// Per-pair rolling state, created lazily on the first accepted tick
#[derive(Debug, Default)]
struct PairState {
    prices: VecDeque<f64>,
    /// Signal lock while the implied trade is still open
    active_trade_until: Option<DateTime<Utc>>,
    /// Re-arm delay after the implied trade settles
    cooldown_until: Option<DateTime<Utc>>,
}

pub struct StrategyEngine {
    settings: BotSettings,
    policy: PairPolicy,
    states: HashMap<String, PairState>,
    rsi_period: usize,
    short_ma_period: usize,
    long_ma_period: usize,
}

impl StrategyEngine {
    pub fn new(settings: BotSettings, policy: PairPolicy) -> Self {
        Self {
            settings,
            policy,
            states: HashMap::new(),
            rsi_period: 14,
            short_ma_period: 5,
            long_ma_period: 20,
        }
    }

    /// Process one price tick. Returns a signal when the indicator rule fires
    /// and no lock or cooldown is in effect for this pair.
    pub fn on_price(
        &mut self,
        pair: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<TradeSignal> {
        if !self
            .policy
            .can_trade(pair, self.settings.expiry, timestamp)
        {
            return None;
        }

        let state = self.states.entry(pair.to_string()).or_default();
        state.prices.push_back(price);
        while state.prices.len() > PRICE_WINDOW {
            state.prices.pop_front();
        }

        if let Some(until) = state.active_trade_until {
            if timestamp < until {
                return None;
            }
        }
        if let Some(until) = state.cooldown_until {
            if timestamp < until {
                return None;
            }
        }

        if state.prices.len() < self.long_ma_period + 1 {
            return None;
        }

        let prices: Vec<f64> = state.prices.iter().copied().collect();
        let rsi = compute_rsi(&prices, self.rsi_period)?;

        let short_ma: f64 =
            prices[prices.len() - self.short_ma_period..].iter().sum::<f64>()
                / self.short_ma_period as f64;
        let long_ma: f64 = prices[prices.len() - self.long_ma_period..].iter().sum::<f64>()
            / self.long_ma_period as f64;
        let separation = (short_ma - long_ma).abs() / long_ma.max(1e-7);

        let (direction, reason) = if rsi <= 30.0 && short_ma > long_ma {
            (Direction::Buy, format!("RSI oversold ({rsi:.1}) + uptrend"))
        } else if rsi >= 70.0 && short_ma < long_ma {
            (Direction::Sell, format!("RSI overbought ({rsi:.1}) + downtrend"))
        } else {
            return None;
        };

        // Slide mode only trades its configured side
        if self.settings.mode == BotMode::Slide && direction != self.settings.slide_direction {
            return None;
        }

        let confidence = confidence(rsi, separation);
        let signal = TradeSignal::new(
            pair,
            direction,
            self.settings.expiry,
            confidence,
            timestamp,
            reason,
        );

        let lock_secs = self.settings.expiry.duration_secs() as i64;
        let state = self.states.get_mut(pair)?;
        state.active_trade_until = Some(timestamp + Duration::seconds(lock_secs));
        state.cooldown_until = Some(timestamp + Duration::seconds(lock_secs.max(5)));

        info!(
            pair = %signal.pair,
            direction = %signal.direction,
            confidence = signal.confidence,
            "strategy signal emitted"
        );
        Some(signal)
    }
}

/// 14-period RSI over the most recent `period` deltas. Saturates at 100 when
/// the window holds no negative movement.
fn compute_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }

    let start = prices.len() - period;
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in start..prices.len() {
        let delta = prices[i] - prices[i - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else if delta < 0.0 {
            loss_sum += -delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Blend of oscillator extremity (60%) and trend strength (40%), capped at
/// 0.99 and rounded to 2 decimals.
fn confidence(rsi: f64, separation: f64) -> f64 {
    let rsi_extreme = (rsi - 50.0).abs() / 50.0;
    let trend_strength = (separation * 100.0).min(1.0);
    round2((0.6 * rsi_extreme + 0.4 * trend_strength).min(0.99))
}
