//! End-to-end tests for the session flow: price feed -> strategy -> execution
//! -> session ledger -> journal.

#[cfg(test)]
mod tests {
    use otcbot::config::BotSettings;
    use otcbot::controller::BotController;
    use otcbot::execution::{ExecutionAdapter, ManualConfirmAdapter, SimulatedAdapter};
    use otcbot::pairs::PairPolicy;
    use otcbot::persistence::{CsvJournal, NullJournal};
    use otcbot::strategy::StrategyEngine;
    use otcbot::types::{Direction, LifecycleState, StopReason, TradeOutcome};

    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, 0, 0).unwrap()
    }

    /// 21 prices: flat base, a jump, then a steady dip. RSI collapses while
    /// the short average stays above the long one -> one buy signal.
    fn dip_after_rally() -> Vec<f64> {
        let mut prices = vec![100.0; 6];
        prices.push(130.0);
        for i in 0..14 {
            prices.push(129.0 - i as f64);
        }
        prices
    }

    #[tokio::test]
    async fn test_simulated_session_executes_signal_and_journals_it() {
        let dir = std::env::temp_dir().join(format!("otcbot-flow-{}", uuid::Uuid::new_v4()));
        let journal = Arc::new(CsvJournal::new(&dir).unwrap());
        let settings = BotSettings {
            execution_mode: otcbot::types::ExecutionMode::Simulated,
            ..Default::default()
        };
        let controller = BotController::new(
            settings,
            Arc::new(SimulatedAdapter::new(42)),
            journal,
        )
        .unwrap();

        controller.start().await;
        let mut signal = None;
        for price in dip_after_rally() {
            signal = controller
                .feed_price("EURUSD_otc", price, Some(at_hour(12)))
                .await;
        }
        controller.stop(StopReason::UserStop).await;

        let signal = signal.expect("one buy signal from the dip scenario");
        assert_eq!(signal.direction, Direction::Buy);

        // The simulated adapter settles synchronously, so exactly one trade
        // reached the ledger.
        let stats = controller.stats().await;
        assert_eq!(stats.trades_taken, 1);
        assert_eq!(stats.wins + stats.losses, 1);

        let signals = std::fs::read_to_string(dir.join("signals.csv")).unwrap();
        assert!(signals.contains("EURUSD_otc"));
        let trades = std::fs::read_to_string(dir.join("trades.csv")).unwrap();
        assert_eq!(trades.lines().count(), 2); // header + one settled trade
        let sessions = std::fs::read_to_string(dir.join("sessions.csv")).unwrap();
        assert!(sessions.contains("user_stop"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_manual_session_guardrail_stops_before_uncoverable_stake() {
        let settings = BotSettings {
            trade_capital: 10.0,
            trade_amount: 4.0,
            martingale_percent: 100.0,
            martingale_limit: 5,
            ..Default::default()
        };
        let controller =
            BotController::new(settings, Arc::new(ManualConfirmAdapter), Arc::new(NullJournal))
                .unwrap();

        controller.start().await;
        let msg = assert_ok!(controller.record_loss("EURUSD_otc").await);
        assert!(msg.contains("capital_guardrail"), "got: {msg}");

        let stats = controller.stats().await;
        assert_eq!(stats.state, LifecycleState::Stopped);
        assert_eq!(stats.stop_reason, Some(StopReason::CapitalGuardrail));
        // A further outcome is rejected, not silently applied
        assert!(controller.record_win("EURUSD_otc").await.is_err());
    }

    #[tokio::test]
    async fn test_schedule_window_gates_the_strategy() {
        let settings = BotSettings {
            schedule_enabled: true,
            schedule_start_hour: 22,
            schedule_end_hour: 2,
            ..Default::default()
        };
        let policy = PairPolicy::new(settings.clone());
        let mut engine = StrategyEngine::new(settings, policy);

        // Midday is outside the 22-02 window: nothing, not even a signal on
        // the full dip pattern.
        for price in dip_after_rally() {
            assert!(engine.on_price("EURUSD_otc", price, at_hour(12)).is_none());
        }

        // The same pattern inside the window fires.
        let mut signal = None;
        for price in dip_after_rally() {
            signal = engine.on_price("EURUSD_otc", price, at_hour(23));
        }
        assert!(signal.is_some());
    }

    #[tokio::test]
    async fn test_signal_winrate_converges_to_confidence() {
        // Produce a real strategy signal, then replay it through a seeded
        // simulated adapter: the win-rate converges toward its confidence.
        let settings = BotSettings::default();
        let policy = PairPolicy::new(settings.clone());
        let mut engine = StrategyEngine::new(settings, policy);

        let mut signal = None;
        for price in dip_after_rally() {
            signal = engine.on_price("EURUSD_otc", price, at_hour(12));
        }
        let signal = signal.expect("buy signal");
        assert_eq!(signal.confidence, 0.86);

        let adapter = SimulatedAdapter::new(1234);
        let trials = 3000;
        let mut wins = 0;
        for _ in 0..trials {
            let result = adapter.execute_signal(&signal, 1.0).await;
            assert!(result.accepted);
            if result.outcome == Some(TradeOutcome::Win) {
                wins += 1;
            }
        }
        let win_rate = wins as f64 / trials as f64;
        assert!(
            (win_rate - signal.confidence).abs() < 0.04,
            "win rate {win_rate} should converge toward confidence {}",
            signal.confidence
        );
    }
}
