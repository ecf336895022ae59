//! Daily call quota and per-execution time budget
//!
//! Both limits are enforced before any network call is made. The daily
//! counter resets when the local calendar date changes; the execution timer
//! starts on the first check and is only restarted explicitly.

use chrono::{DateTime, Local, NaiveDate};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ApiConfig;

/// Mutable quota bookkeeping for one execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaState {
    /// Network calls made on `last_reset_date`
    pub daily_usage: u32,
    /// Local date the counter was last zeroed
    pub last_reset_date: NaiveDate,
    /// When the first check of this execution happened
    pub execution_start: Option<DateTime<Local>>,
}

/// Why the quota gate refused a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRejection {
    /// `daily_usage` reached the daily limit
    DailyLimit,
    /// The execution has been running for longer than its budget
    ExecutionTime,
}

/// Snapshot of quota usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub daily_usage: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub last_reset: NaiveDate,
    /// Zero until the execution timer has started
    pub execution_time_elapsed: Duration,
}

/// Tracks calls per calendar day and elapsed execution time
pub struct QuotaTracker {
    state: Mutex<QuotaState>,
    daily_limit: u32,
    execution_time_limit: Duration,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(daily_limit: u32, execution_time_limit: Duration, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date_naive();
        Self {
            state: Mutex::new(QuotaState {
                daily_usage: 0,
                last_reset_date: today,
                execution_start: None,
            }),
            daily_limit,
            execution_time_limit,
            clock,
        }
    }

    pub fn from_config(config: &ApiConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.daily_quota_limit,
            config.execution_time_limit(),
            clock,
        )
    }

    /// Quota state is plain data, so a poisoned lock still holds a usable value.
    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn roll_over(&self, state: &mut QuotaState, now: DateTime<Local>) {
        let today = now.date_naive();
        if state.last_reset_date != today {
            info!(
                previous_date = %state.last_reset_date,
                previous_usage = state.daily_usage,
                "new calendar day, resetting daily quota"
            );
            state.daily_usage = 0;
            state.last_reset_date = today;
        }
    }

    fn elapsed(state: &QuotaState, now: DateTime<Local>) -> Duration {
        state
            .execution_start
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Runs both gates, starting the execution timer on first use
    pub fn check(&self) -> Result<(), QuotaRejection> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.roll_over(&mut state, now);

        if state.daily_usage >= self.daily_limit {
            warn!(
                usage = state.daily_usage,
                limit = self.daily_limit,
                "daily API quota exhausted"
            );
            return Err(QuotaRejection::DailyLimit);
        }

        self.check_time_locked(&mut state, now)
    }

    /// Runs only the execution-time gate
    pub fn check_time(&self) -> Result<(), QuotaRejection> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.check_time_locked(&mut state, now)
    }

    fn check_time_locked(
        &self,
        state: &mut QuotaState,
        now: DateTime<Local>,
    ) -> Result<(), QuotaRejection> {
        if state.execution_start.is_none() {
            state.execution_start = Some(now);
        }
        let elapsed = Self::elapsed(state, now);
        if elapsed >= self.execution_time_limit {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                limit_ms = self.execution_time_limit.as_millis() as u64,
                "execution time budget exhausted"
            );
            return Err(QuotaRejection::ExecutionTime);
        }
        Ok(())
    }

    /// `true` when another network call is allowed right now
    pub fn check_quota(&self) -> bool {
        self.check().is_ok()
    }

    /// Records one network attempt
    pub fn increment(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        self.roll_over(&mut state, now);
        state.daily_usage = state.daily_usage.saturating_add(1);
    }

    /// Starts a fresh execution budget from now
    pub fn restart_execution_timer(&self) {
        let now = self.clock.now();
        self.lock().execution_start = Some(now);
    }

    /// Current usage, after applying any pending day rollover
    pub fn status(&self) -> QuotaStatus {
        let now = self.clock.now();
        let mut state = self.lock();
        self.roll_over(&mut state, now);
        QuotaStatus {
            daily_usage: state.daily_usage,
            daily_limit: self.daily_limit,
            remaining: self.daily_limit.saturating_sub(state.daily_usage),
            last_reset: state.last_reset_date,
            execution_time_elapsed: Self::elapsed(&state, now),
        }
    }

    /// Copy of the raw state
    pub fn snapshot(&self) -> QuotaState {
        self.lock().clone()
    }

    /// Replaces the raw state, e.g. to carry usage over from a previous run
    pub fn restore(&self, state: QuotaState) {
        *self.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn tracker_at(
        start: DateTime<Local>,
        daily_limit: u32,
        time_limit: Duration,
    ) -> (QuotaTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let tracker = QuotaTracker::new(daily_limit, time_limit, clock.clone());
        (tracker, clock)
    }

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 9, 3, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_after_daily_limit_reached() {
        let (tracker, _clock) = tracker_at(morning(), 1000, Duration::from_secs(300));

        for _ in 0..1000 {
            tracker.increment();
        }

        assert!(!tracker.check_quota());
        assert_eq!(tracker.check(), Err(QuotaRejection::DailyLimit));
        assert_eq!(tracker.status().remaining, 0);
    }

    #[test]
    fn test_allows_up_to_limit_minus_one() {
        let (tracker, _clock) = tracker_at(morning(), 3, Duration::from_secs(300));

        tracker.increment();
        tracker.increment();

        assert!(tracker.check_quota());
    }

    #[test]
    fn test_date_change_resets_usage() {
        let (tracker, clock) = tracker_at(morning(), 1000, Duration::from_secs(300));
        for _ in 0..1000 {
            tracker.increment();
        }
        assert!(!tracker.check_quota());

        clock.set(Local.with_ymd_and_hms(2024, 9, 4, 0, 0, 5).unwrap());
        tracker.restart_execution_timer();

        assert!(tracker.check_quota());
        let status = tracker.status();
        assert_eq!(status.daily_usage, 0);
        assert_eq!(status.last_reset, NaiveDate::from_ymd_opt(2024, 9, 4).unwrap());
    }

    #[test]
    fn test_execution_time_limit_trips_at_limit() {
        let (tracker, clock) = tracker_at(morning(), 1000, Duration::from_secs(300));

        assert!(tracker.check_quota());
        clock.advance(chrono::Duration::seconds(299));
        assert!(tracker.check_quota());
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(tracker.check(), Err(QuotaRejection::ExecutionTime));
    }

    #[test]
    fn test_timer_starts_on_first_check_not_construction() {
        let (tracker, clock) = tracker_at(morning(), 1000, Duration::from_secs(300));

        clock.advance(chrono::Duration::minutes(10));

        assert!(tracker.check_quota());
        assert_eq!(tracker.status().execution_time_elapsed, Duration::ZERO);
    }

    #[test]
    fn test_restart_execution_timer_grants_fresh_budget() {
        let (tracker, clock) = tracker_at(morning(), 1000, Duration::from_secs(300));
        tracker.check().expect("first check should pass");
        clock.advance(chrono::Duration::minutes(6));
        assert!(!tracker.check_quota());

        tracker.restart_execution_timer();

        assert!(tracker.check_quota());
    }

    #[test]
    fn test_daily_rejection_does_not_start_timer() {
        let (tracker, _clock) = tracker_at(morning(), 0, Duration::from_secs(300));

        assert_eq!(tracker.check(), Err(QuotaRejection::DailyLimit));
        assert!(tracker.snapshot().execution_start.is_none());
    }

    #[test]
    fn test_status_reports_elapsed_and_remaining() {
        let (tracker, clock) = tracker_at(morning(), 10, Duration::from_secs(300));
        tracker.check().expect("check should pass");
        tracker.increment();
        tracker.increment();
        clock.advance(chrono::Duration::seconds(42));

        let status = tracker.status();

        assert_eq!(status.daily_usage, 2);
        assert_eq!(status.daily_limit, 10);
        assert_eq!(status.remaining, 8);
        assert_eq!(status.execution_time_elapsed, Duration::from_secs(42));
    }

    #[test]
    fn test_restore_carries_previous_usage() {
        let (tracker, _clock) = tracker_at(morning(), 5, Duration::from_secs(300));

        tracker.restore(QuotaState {
            daily_usage: 5,
            last_reset_date: morning().date_naive(),
            execution_start: None,
        });

        assert!(!tracker.check_quota());
    }
}
