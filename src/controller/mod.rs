//! Bot Controller - exposed surface and the session orchestrator
//!
//! Ties the strategy, session and execution layers together. All shared
//! mutable state (session ledger, per-pair strategy windows, orchestrator
//! bookkeeping) lives behind one coarse `tokio::sync::Mutex`, so a manually
//! recorded outcome and an autonomously executed one can never interleave
//! into a corrupted stake or counter update.
//!
//! The orchestrator is a single background task started with the session and
//! flagged down on stop/pause. Cancellation is cooperative: the task observes
//! the flag within its own polling interval, and a failed iteration becomes a
//! status message rather than a dead worker.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

use crate::config::BotSettings;
use crate::execution::ExecutionAdapter;
use crate::pairs::PairPolicy;
use crate::persistence::Journal;
use crate::risk::round2;
use crate::session::{SessionEngine, SessionError, SessionStats};
use crate::strategy::StrategyEngine;
use crate::types::{
    BotMode, Direction, ExecutionMode, LifecycleState, StopReason, TradeOutcome, TradeRecord,
    TradeSignal,
};

/// Pause between worker iterations
const LOOP_TICK_MS: u64 = 200;
/// Idle delay while the session is not running
const IDLE_NOT_RUNNING_MS: u64 = 350;
/// Idle delay in externally-driven (manual/simulated) modes
const IDLE_PASSIVE_MODE_MS: u64 = 500;
/// Idle delay while the inter-trade cooldown is pending
const IDLE_COOLDOWN_MS: u64 = 250;

/// Shared mutable state guarded by the controller's single coarse lock
struct CoreState {
    session: SessionEngine,
    strategy: StrategyEngine,
    last_signal: Option<TradeSignal>,
    last_execution_message: String,
    oscillate_next_direction: Direction,
    next_trade_at: Option<Instant>,
    broker_start_balance: Option<f64>,
    broker_last_balance: Option<f64>,
}

pub struct BotController {
    settings: BotSettings,
    state: Arc<Mutex<CoreState>>,
    adapter: Arc<dyn ExecutionAdapter>,
    journal: Arc<dyn Journal>,
    worker_running: Arc<AtomicBool>,
    worker_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BotController {
    /// Build a controller over a validated settings snapshot. The snapshot is
    /// read-only for the controller's lifetime.
    pub fn new(
        settings: BotSettings,
        adapter: Arc<dyn ExecutionAdapter>,
        journal: Arc<dyn Journal>,
    ) -> Result<Self> {
        settings.validate()?;
        let policy = PairPolicy::new(settings.clone());
        let state = CoreState {
            session: SessionEngine::new(settings.clone()),
            strategy: StrategyEngine::new(settings.clone(), policy),
            last_signal: None,
            last_execution_message: "none".to_string(),
            oscillate_next_direction: Direction::Buy,
            next_trade_at: None,
            broker_start_balance: None,
            broker_last_balance: None,
        };
        Ok(Self {
            settings,
            state: Arc::new(Mutex::new(state)),
            adapter,
            journal,
            worker_running: Arc::new(AtomicBool::new(false)),
            worker_handle: std::sync::Mutex::new(None),
        })
    }

    /// Start a session and the background worker. No-op when already running.
    pub async fn start(&self) -> String {
        // Capture the broker balance at session start when it is readable;
        // otherwise the worker picks it up on its first successful poll.
        let initial_balance = if self.settings.execution_mode == ExecutionMode::Broker {
            self.adapter.account_balance().await
        } else {
            None
        };

        {
            let mut state = self.state.lock().await;
            state.session.start();
            state.next_trade_at = None;
            state.broker_start_balance = initial_balance;
            state.broker_last_balance = initial_balance;
        }

        self.spawn_worker();
        "Session started".to_string()
    }

    /// Halt the worker and pause the session, preserving all statistics.
    pub async fn pause(&self) -> String {
        self.halt_worker();
        self.state.lock().await.session.pause();
        "Session paused".to_string()
    }

    /// Resume a paused session and restart the worker.
    pub async fn resume(&self) -> String {
        let running = {
            let mut state = self.state.lock().await;
            state.session.resume();
            state.session.stats().state == LifecycleState::Running
        };
        if running {
            self.spawn_worker();
            "Session resumed".to_string()
        } else {
            "Session is not paused".to_string()
        }
    }

    /// Stop the session and journal the final snapshot.
    pub async fn stop(&self, reason: StopReason) -> String {
        self.halt_worker();
        let mut state = self.state.lock().await;
        state.session.stop(reason);
        self.journal.log_session(state.session.stats());
        format!("Session stopped: {reason}")
    }

    /// Push one price tick into the strategy engine. Returns the emitted
    /// signal, if any; with `auto_execute_signals` set, the signal is also
    /// executed before this call returns.
    pub async fn feed_price(
        &self,
        pair: &str,
        price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Option<TradeSignal> {
        let now = timestamp.unwrap_or_else(Utc::now);
        let mut state = self.state.lock().await;
        let signal = state.strategy.on_price(pair, price, now)?;
        state.last_signal = Some(signal.clone());
        self.journal.log_signal(&signal);
        if self.settings.auto_execute_signals {
            let message =
                execute_last_signal_locked(&self.adapter, &self.journal, &mut state).await;
            state.last_execution_message = message;
        }
        Some(signal)
    }

    /// Execute the most recent signal with the session's current stake.
    pub async fn execute_last_signal(&self) -> String {
        let mut state = self.state.lock().await;
        let message = execute_last_signal_locked(&self.adapter, &self.journal, &mut state).await;
        state.last_execution_message = message.clone();
        message
    }

    /// Settle one trade against the session. Fails unless running.
    pub async fn apply_trade_outcome(
        &self,
        outcome: TradeOutcome,
        pair: &str,
    ) -> Result<TradeRecord, SessionError> {
        let mut state = self.state.lock().await;
        apply_outcome_locked(&self.journal, &mut state, outcome, pair)
    }

    /// Record a manually observed win.
    pub async fn record_win(&self, pair: &str) -> Result<String, SessionError> {
        let mut state = self.state.lock().await;
        let record = apply_outcome_locked(&self.journal, &mut state, TradeOutcome::Win, pair)?;
        Ok(outcome_message(&state, &record))
    }

    /// Record a manually observed loss.
    pub async fn record_loss(&self, pair: &str) -> Result<String, SessionError> {
        let mut state = self.state.lock().await;
        let record = apply_outcome_locked(&self.journal, &mut state, TradeOutcome::Loss, pair)?;
        Ok(outcome_message(&state, &record))
    }

    /// Read-only snapshot of the session statistics.
    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.session.stats().clone()
    }

    /// Human-readable status summary.
    pub async fn status_text(&self) -> String {
        let state = self.state.lock().await;
        let stats = state.session.stats();
        let direction = if stats.current_mode == BotMode::Slide {
            stats.current_direction.to_string()
        } else {
            "both".to_string()
        };
        let target_remaining = round2(self.settings.target_profit - stats.session_profit);
        let last_signal_text = state
            .last_signal
            .as_ref()
            .map(|s| format!("{} {} {} @ {}", s.pair, s.direction, s.expiry, s.confidence))
            .unwrap_or_else(|| "none".to_string());
        let schedule_text = if self.settings.schedule_enabled {
            format!(
                "{:02}:00-{:02}:00",
                self.settings.schedule_start_hour, self.settings.schedule_end_hour
            )
        } else {
            "disabled".to_string()
        };
        let broker_balance_text = state
            .broker_last_balance
            .map(|b| b.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "State: {}\n\
             Profit: {}\n\
             Target remaining: {}\n\
             Trades: {} | Wins: {} | Losses: {}\n\
             Current stake: {}\n\
             Execution mode: {} ({})\n\
             Broker balance: {}\n\
             Mode: {} ({})\n\
             Enabled pairs: {}\n\
             Schedule: {}\n\
             Last signal: {}\n\
             Last execution: {}",
            stats.state,
            stats.session_profit,
            target_remaining,
            stats.trades_taken,
            stats.wins,
            stats.losses,
            stats.current_stake,
            self.settings.execution_mode,
            self.adapter.name(),
            broker_balance_text,
            stats.current_mode,
            direction,
            self.settings.enabled_pairs.join(", "),
            schedule_text,
            last_signal_text,
            state.last_execution_message,
        )
    }

    fn spawn_worker(&self) {
        if self.worker_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let ctx = WorkerContext {
            settings: self.settings.clone(),
            state: Arc::clone(&self.state),
            adapter: Arc::clone(&self.adapter),
            journal: Arc::clone(&self.journal),
            running: Arc::clone(&self.worker_running),
        };
        let handle = tokio::spawn(auto_trade_worker(ctx));
        if let Ok(mut slot) = self.worker_handle.lock() {
            *slot = Some(handle);
        }
    }

    fn halt_worker(&self) {
        // Cooperative: the task observes the cleared flag within one tick.
        self.worker_running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.worker_handle.lock() {
            slot.take();
        }
    }
}

impl Drop for BotController {
    fn drop(&mut self) {
        self.worker_running.store(false, Ordering::SeqCst);
    }
}

/// Everything the background worker needs, detached from the controller
struct WorkerContext {
    settings: BotSettings,
    state: Arc<Mutex<CoreState>>,
    adapter: Arc<dyn ExecutionAdapter>,
    journal: Arc<dyn Journal>,
    running: Arc<AtomicBool>,
}

async fn auto_trade_worker(ctx: WorkerContext) {
    info!("auto-trade worker started");
    while ctx.running.load(Ordering::SeqCst) {
        if let Err(e) = worker_iteration(&ctx).await {
            // One failed iteration must never take the worker down
            warn!(error = %e, "auto-trade iteration failed");
            ctx.state.lock().await.last_execution_message = format!("Auto loop error: {e}");
        }
        sleep(Duration::from_millis(LOOP_TICK_MS)).await;
    }
    info!("auto-trade worker stopped");
}

async fn worker_iteration(ctx: &WorkerContext) -> Result<()> {
    {
        let state = ctx.state.lock().await;
        if state.session.stats().state != LifecycleState::Running {
            drop(state);
            sleep(Duration::from_millis(IDLE_NOT_RUNNING_MS)).await;
            return Ok(());
        }
    }

    // Manual and simulated modes are driven by external price feeds; the
    // worker only acts on its own in broker mode.
    if ctx.settings.execution_mode != ExecutionMode::Broker {
        sleep(Duration::from_millis(IDLE_PASSIVE_MODE_MS)).await;
        return Ok(());
    }

    if check_broker_take_profit(ctx).await {
        return Ok(());
    }

    {
        let state = ctx.state.lock().await;
        if let Some(due) = state.next_trade_at {
            if Instant::now() < due {
                drop(state);
                sleep(Duration::from_millis(IDLE_COOLDOWN_MS)).await;
                return Ok(());
            }
        }
    }

    let mut state = ctx.state.lock().await;
    // The session may have stopped between locks
    if state.session.stats().state != LifecycleState::Running {
        return Ok(());
    }

    let pair = ctx
        .settings
        .enabled_pairs
        .first()
        .cloned()
        .unwrap_or_else(|| "OTC".to_string());
    let direction = next_click_direction(&ctx.settings, &mut state);
    let signal = TradeSignal::new(
        pair,
        direction,
        ctx.settings.expiry,
        1.0,
        Utc::now(),
        "auto-trade loop",
    );
    state.last_signal = Some(signal.clone());
    ctx.journal.log_signal(&signal);

    let message = execute_last_signal_locked(&ctx.adapter, &ctx.journal, &mut state).await;
    state.last_execution_message = message;
    // Re-arm regardless of how the execution went
    state.next_trade_at =
        Some(Instant::now() + Duration::from_secs(ctx.settings.trade_cooldown_secs));
    Ok(())
}

/// Adapter-truth target-profit override: the broker balance, not the local
/// ledger, decides when the target is reached. Returns true when the session
/// was force-stopped.
async fn check_broker_take_profit(ctx: &WorkerContext) -> bool {
    let Some(balance) = ctx.adapter.account_balance().await else {
        return false;
    };

    let mut state = ctx.state.lock().await;
    state.broker_last_balance = Some(balance);
    let Some(start) = state.broker_start_balance else {
        state.broker_start_balance = Some(balance);
        return false;
    };

    let broker_profit = round2(balance - start);
    state.session.set_session_profit(broker_profit);

    if broker_profit >= ctx.settings.target_profit {
        state.session.stop(StopReason::TargetProfitReached);
        state.last_execution_message = format!(
            "Take profit reached: {} >= {}.",
            broker_profit, ctx.settings.target_profit
        );
        ctx.journal.log_session(state.session.stats());
        ctx.running.store(false, Ordering::SeqCst);
        return true;
    }

    false
}

fn next_click_direction(settings: &BotSettings, state: &mut CoreState) -> Direction {
    if settings.mode == BotMode::Slide {
        return settings.slide_direction;
    }
    let direction = state.oscillate_next_direction;
    state.oscillate_next_direction = direction.opposite();
    direction
}

fn apply_outcome_locked(
    journal: &Arc<dyn Journal>,
    state: &mut CoreState,
    outcome: TradeOutcome,
    pair: &str,
) -> Result<TradeRecord, SessionError> {
    let record = state.session.apply_trade_outcome(outcome, pair)?;
    journal.log_trade(&record);
    if state.session.stats().state == LifecycleState::Stopped {
        journal.log_session(state.session.stats());
    }
    Ok(record)
}

fn outcome_message(state: &CoreState, record: &TradeRecord) -> String {
    let stats = state.session.stats();
    if stats.state == LifecycleState::Stopped {
        let reason = stats
            .stop_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{} logged ({:+}). Session stopped: {}",
            record.outcome, record.pnl, reason
        )
    } else {
        format!("{} logged ({:+})", record.outcome, record.pnl)
    }
}

async fn execute_last_signal_locked(
    adapter: &Arc<dyn ExecutionAdapter>,
    journal: &Arc<dyn Journal>,
    state: &mut CoreState,
) -> String {
    if state.session.stats().state != LifecycleState::Running {
        return "Cannot execute signal: session is not running".to_string();
    }
    let Some(signal) = state.last_signal.clone() else {
        return "No signal to execute".to_string();
    };

    let stake = state.session.stats().current_stake;
    let attempt = format!(
        "Applying stake={} expiry={} direction={}",
        stake, signal.expiry, signal.direction
    );
    state.last_execution_message = attempt.clone();
    journal.log_signal(&TradeSignal::new(
        signal.pair.clone(),
        signal.direction,
        signal.expiry,
        signal.confidence,
        Utc::now(),
        format!("execution-attempt | {attempt}"),
    ));

    let result = adapter.execute_signal(&signal, stake).await;
    state.last_execution_message = result.message.clone();
    if !result.accepted {
        return result.message;
    }
    let Some(outcome) = result.outcome else {
        return result.message;
    };

    match apply_outcome_locked(journal, state, outcome, &result.pair) {
        Ok(record) => format!("{} | {}", result.message, outcome_message(state, &record)),
        Err(e) => format!("{} | {}", result.message, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionResult, MockExecutionAdapter, SimulatedAdapter};
    use crate::persistence::NullJournal;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    /// 21 prices producing exactly one buy signal (dip inside an uptrend)
    fn dip_after_rally() -> Vec<f64> {
        let mut prices = vec![100.0; 6];
        prices.push(130.0);
        for i in 0..14 {
            prices.push(129.0 - i as f64);
        }
        prices
    }

    fn controller_with(
        settings: BotSettings,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> BotController {
        BotController::new(settings, adapter, Arc::new(NullJournal)).unwrap()
    }

    #[tokio::test]
    async fn test_feed_price_emits_and_auto_executes() {
        let mut mock = MockExecutionAdapter::new();
        mock.expect_execute_signal()
            .times(1)
            .returning(|signal, _stake| {
                ExecutionResult::accepted(signal, "mock fill", Some(TradeOutcome::Win))
            });
        let controller = controller_with(BotSettings::default(), Arc::new(mock));

        controller.start().await;
        let mut signal = None;
        for price in dip_after_rally() {
            signal = controller.feed_price("EURUSD_otc", price, Some(ts())).await;
        }

        let signal = signal.expect("strategy signal");
        assert_eq!(signal.direction, Direction::Buy);

        let stats = controller.stats().await;
        assert_eq!(stats.trades_taken, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.session_profit, 0.82);
        controller.stop(StopReason::UserStop).await;
    }

    #[tokio::test]
    async fn test_outcome_rejected_before_start() {
        let controller = controller_with(
            BotSettings::default(),
            Arc::new(SimulatedAdapter::default()),
        );
        assert!(matches!(
            controller.record_win("EURUSD_otc").await,
            Err(SessionError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_manual_outcome_sequence_and_messages() {
        let controller = controller_with(
            BotSettings::default(),
            Arc::new(SimulatedAdapter::default()),
        );
        controller.start().await;

        let msg = controller.record_loss("EURUSD_otc").await.unwrap();
        assert!(msg.starts_with("LOSS logged (-1)"));
        assert_eq!(controller.stats().await.current_stake, 1.80);

        controller.record_loss("EURUSD_otc").await.unwrap();
        assert_eq!(controller.stats().await.current_stake, 3.24);

        let msg = controller.record_win("EURUSD_otc").await.unwrap();
        assert!(msg.starts_with("WIN logged (+2.66)"), "got: {msg}");
        let stats = controller.stats().await;
        assert_eq!(stats.current_stake, 1.0);
        assert_eq!(stats.session_profit, -0.14);
        controller.stop(StopReason::UserStop).await;
    }

    #[tokio::test]
    async fn test_pause_blocks_outcomes_and_resume_restores() {
        let controller = controller_with(
            BotSettings::default(),
            Arc::new(SimulatedAdapter::default()),
        );
        controller.start().await;
        controller.record_win("EURUSD_otc").await.unwrap();

        controller.pause().await;
        assert!(controller.record_win("EURUSD_otc").await.is_err());
        let paused = controller.stats().await;
        assert_eq!(paused.state, LifecycleState::Paused);
        assert_eq!(paused.wins, 1);

        controller.resume().await;
        assert!(controller.record_win("EURUSD_otc").await.is_ok());
        controller.stop(StopReason::UserStop).await;
        assert_eq!(controller.stats().await.state, LifecycleState::Stopped);
        assert_eq!(
            controller.stats().await.stop_reason,
            Some(StopReason::UserStop)
        );
    }

    #[tokio::test]
    async fn test_execute_without_signal() {
        let controller = controller_with(
            BotSettings::default(),
            Arc::new(SimulatedAdapter::default()),
        );
        controller.start().await;
        let msg = controller.execute_last_signal().await;
        assert_eq!(msg, "No signal to execute");
        controller.stop(StopReason::UserStop).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_autonomous_loop_oscillates_and_settles_trades() {
        let mut mock = MockExecutionAdapter::new();
        mock.expect_account_balance().returning(|| None);
        let seen: Arc<std::sync::Mutex<Vec<Direction>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        mock.expect_execute_signal().returning(move |signal, _stake| {
            seen_clone.lock().unwrap().push(signal.direction);
            ExecutionResult::accepted(signal, "mock fill", Some(TradeOutcome::Win))
        });

        let settings = BotSettings {
            execution_mode: ExecutionMode::Broker,
            target_profit: 2.0,
            trade_cooldown_secs: 1,
            ..Default::default()
        };
        let controller = controller_with(settings, Arc::new(mock));
        controller.start().await;

        // Virtual time: the worker trades once per cooldown until the target
        // profit (3 wins at +0.82) stops the session.
        tokio::time::sleep(Duration::from_secs(60)).await;

        let stats = controller.stats().await;
        assert_eq!(stats.state, LifecycleState::Stopped);
        assert_eq!(stats.stop_reason, Some(StopReason::TargetProfitReached));
        assert_eq!(stats.wins, 3);
        assert_eq!(stats.session_profit, 2.46);

        // Oscillate mode alternates direction on every autonomous trade
        let directions = seen.lock().unwrap().clone();
        assert_eq!(
            directions,
            vec![Direction::Buy, Direction::Sell, Direction::Buy]
        );
        controller.stop(StopReason::UserStop).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_balance_override_stops_session() {
        let mut mock = MockExecutionAdapter::new();
        let polls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let polls_clone = Arc::clone(&polls);
        mock.expect_account_balance().returning(move || {
            let n = polls_clone.fetch_add(1, Ordering::SeqCst);
            // First read (session start) 100, later polls show the account up 25
            if n == 0 {
                Some(100.0)
            } else {
                Some(125.0)
            }
        });
        // No execute_signal expectation: the override must fire before any
        // autonomous trade is attempted.

        let settings = BotSettings {
            execution_mode: ExecutionMode::Broker,
            target_profit: 20.0,
            ..Default::default()
        };
        let controller = controller_with(settings, Arc::new(mock));
        controller.start().await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let stats = controller.stats().await;
        assert_eq!(stats.state, LifecycleState::Stopped);
        assert_eq!(stats.stop_reason, Some(StopReason::TargetProfitReached));
        // Broker-observed profit, not the local ledger
        assert_eq!(stats.session_profit, 25.0);
        assert_eq!(stats.trades_taken, 0);
    }

    #[tokio::test]
    async fn test_status_text_mentions_key_fields() {
        let controller = controller_with(
            BotSettings::default(),
            Arc::new(SimulatedAdapter::default()),
        );
        controller.start().await;
        let status = controller.status_text().await;
        assert!(status.contains("State: running"));
        assert!(status.contains("Execution mode: manual (simulated)"));
        assert!(status.contains("EURUSD_otc"));
        assert!(status.contains("Schedule: disabled"));
        controller.stop(StopReason::UserStop).await;
    }
}
