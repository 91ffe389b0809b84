//! Pair/Schedule Policy - pure predicates gating signal generation
//!
//! Answers three questions: is a pair enabled, is an expiry allowed for that
//! pair, and is the clock inside the configured trading window. Absent or
//! unknown input degrades to `false`; nothing here can fail.

use chrono::{DateTime, Timelike, Utc};

use crate::config::BotSettings;
use crate::types::Expiry;

/// Predicate layer over the enabled-pairs set, the per-pair expiry rules and
/// the daily trading window.
pub struct PairPolicy {
    settings: BotSettings,
}

impl PairPolicy {
    pub fn new(settings: BotSettings) -> Self {
        Self { settings }
    }

    /// All pairs that have expiry rules, sorted
    pub fn available_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.settings.pair_expiry_rules.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    /// Pairs the strategy may signal on
    pub fn enabled_pairs(&self) -> Vec<String> {
        self.settings.enabled_pairs.clone()
    }

    pub fn is_pair_enabled(&self, pair: &str) -> bool {
        self.settings.enabled_pairs.iter().any(|p| p == pair)
    }

    /// Unknown pair has no allowed expiries
    pub fn is_expiry_allowed(&self, pair: &str, expiry: Expiry) -> bool {
        self.settings
            .pair_expiry_rules
            .get(pair)
            .map(|allowed| allowed.contains(&expiry))
            .unwrap_or(false)
    }

    /// Inclusive [start, end] hour window; start > end wraps past midnight
    pub fn is_within_schedule(&self, when: DateTime<Utc>) -> bool {
        if !self.settings.schedule_enabled {
            return true;
        }

        let hour = when.hour();
        let start = self.settings.schedule_start_hour;
        let end = self.settings.schedule_end_hour;

        if start <= end {
            start <= hour && hour <= end
        } else {
            hour >= start || hour <= end
        }
    }

    pub fn can_trade(&self, pair: &str, expiry: Expiry, when: DateTime<Utc>) -> bool {
        if !self.is_pair_enabled(pair) {
            return false;
        }
        if !self.is_expiry_allowed(pair, expiry) {
            return false;
        }
        self.is_within_schedule(when)
    }
}
