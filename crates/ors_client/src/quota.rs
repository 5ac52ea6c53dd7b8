//! Local quota bookkeeping for the Openrouteservice API.
//!
//! Two independent windows: a trailing 60-second window held in memory, and a
//! calendar-day (UTC) counter persisted across sessions. Both are advisory —
//! the remote service's own limits stay authoritative — and neither is ever
//! charged for a failed request.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::Store;
use serde::{Deserialize, Serialize};
use tracing::warn;

const QUOTA_KEY: &str = "quota";
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Current UTC calendar date as `YYYY-MM-DD`.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Persisted daily counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyQuotaState {
    pub count: u32,
    /// `YYYY-MM-DD` of the last reset.
    pub last_reset: String,
}

impl Default for DailyQuotaState {
    fn default() -> Self {
        Self {
            count: 0,
            last_reset: today_utc(),
        }
    }
}

/// Tracks local request usage against the minute and daily limits.
///
/// Pure bookkeeping: no retries, no waiting. Callers ask `can_issue_*` before
/// a request and `record_request` only after a confirmed 2xx response.
pub struct QuotaTracker {
    minute_limit: u32,
    daily_limit: u32,
    minute_window: VecDeque<Instant>,
    daily: DailyQuotaState,
    store: Store,
}

impl QuotaTracker {
    /// Load persisted daily state from the store; the minute window always
    /// starts empty (it does not survive the process).
    pub fn load(store: Store, minute_limit: u32, daily_limit: u32) -> Self {
        let daily = store.read::<DailyQuotaState>(QUOTA_KEY);
        Self {
            minute_limit,
            daily_limit,
            minute_window: VecDeque::new(),
            daily,
            store,
        }
    }

    pub fn minute_limit(&self) -> u32 {
        self.minute_limit
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Date of the last daily reset, `YYYY-MM-DD`.
    pub fn last_reset(&self) -> &str {
        &self.daily.last_reset
    }

    /// May one more request be issued within the trailing minute?
    /// Prunes expired timestamps as a side effect.
    pub fn can_issue_minute_request(&mut self) -> bool {
        self.can_issue_minute_request_at(Instant::now())
    }

    fn can_issue_minute_request_at(&mut self, now: Instant) -> bool {
        self.prune_minute_window(now);
        (self.minute_window.len() as u32) < self.minute_limit
    }

    /// May one more request be issued today? Rolls the counter over first if
    /// the calendar date (UTC) has changed since the last reset.
    pub fn can_issue_daily_request(&mut self) -> bool {
        self.can_issue_daily_request_on(&today_utc())
    }

    fn can_issue_daily_request_on(&mut self, today: &str) -> bool {
        self.rollover_if_needed(today);
        self.daily.count < self.daily_limit
    }

    /// Charge one successful request against both windows and persist the
    /// daily counter. Must only be called after a confirmed 2xx response.
    pub fn record_request(&mut self) {
        self.record_request_at(Instant::now(), &today_utc());
    }

    fn record_request_at(&mut self, now: Instant, today: &str) {
        self.prune_minute_window(now);
        self.minute_window.push_back(now);
        self.rollover_if_needed(today);
        self.daily.count = self.daily.count.saturating_add(1);
        self.persist();
    }

    /// Requests in the trailing minute. Read-only: does not prune.
    pub fn minute_count(&self) -> usize {
        self.minute_count_at(Instant::now())
    }

    fn minute_count_at(&self, now: Instant) -> usize {
        self.minute_window
            .iter()
            .filter(|ts| now.duration_since(**ts) < MINUTE_WINDOW)
            .count()
    }

    /// Requests charged today. Read-only: a stale reset date reads as zero
    /// without mutating or persisting anything.
    pub fn daily_count(&self) -> u32 {
        self.daily_count_on(&today_utc())
    }

    fn daily_count_on(&self, today: &str) -> u32 {
        if self.daily.last_reset == today {
            self.daily.count
        } else {
            0
        }
    }

    fn rollover_if_needed(&mut self, today: &str) {
        if self.daily.last_reset != today {
            self.daily = DailyQuotaState {
                count: 0,
                last_reset: today.to_string(),
            };
            self.persist();
        }
    }

    fn prune_minute_window(&mut self, now: Instant) {
        while self
            .minute_window
            .front()
            .is_some_and(|ts| now.duration_since(*ts) >= MINUTE_WINDOW)
        {
            self.minute_window.pop_front();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.write(QUOTA_KEY, &self.daily) {
            warn!("Failed to persist quota state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_store() -> Store {
        let dir = std::env::temp_dir().join(format!(
            "reachmap-quota-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        Store::open(dir).expect("store should open")
    }

    fn tracker(minute_limit: u32, daily_limit: u32) -> QuotaTracker {
        QuotaTracker::load(temp_store(), minute_limit, daily_limit)
    }

    #[test]
    fn test_minute_window_blocks_at_limit_and_recovers() {
        let mut q = tracker(3, 500);
        let base = Instant::now();

        for i in 0..3 {
            assert!(q.can_issue_minute_request_at(base + Duration::from_secs(i)));
            q.record_request_at(base + Duration::from_secs(i), "2026-08-07");
        }
        assert!(!q.can_issue_minute_request_at(base + Duration::from_secs(10)));

        // 61s after the first request, one slot has expired.
        assert!(q.can_issue_minute_request_at(base + Duration::from_secs(61)));
        assert_eq!(q.minute_count_at(base + Duration::from_secs(61)), 2);
    }

    #[test]
    fn test_minute_count_never_exceeds_limit() {
        let mut q = tracker(5, 500);
        let base = Instant::now();

        for i in 0..20u64 {
            let now = base + Duration::from_secs(i * 7);
            if q.can_issue_minute_request_at(now) {
                q.record_request_at(now, "2026-08-07");
            }
            assert!(q.minute_count_at(now) <= 5);
        }
    }

    #[test]
    fn test_daily_counter_is_monotonic_within_a_day() {
        let mut q = tracker(20, 500);
        let base = Instant::now();
        let mut last = 0;
        for i in 0..10u64 {
            q.record_request_at(base + Duration::from_secs(i * 120), "2026-08-07");
            let count = q.daily_count_on("2026-08-07");
            assert!(count >= last);
            last = count;
        }
        assert_eq!(last, 10);
    }

    #[test]
    fn test_daily_rollover_resets_exactly_once() {
        let mut q = tracker(20, 500);
        let base = Instant::now();
        q.record_request_at(base, "2026-08-07");
        q.record_request_at(base + Duration::from_secs(1), "2026-08-07");
        assert_eq!(q.daily_count_on("2026-08-07"), 2);

        assert!(q.can_issue_daily_request_on("2026-08-08"));
        assert_eq!(q.daily_count_on("2026-08-08"), 0);
        assert_eq!(q.last_reset(), "2026-08-08");

        // A second check on the same day does not reset again.
        q.record_request_at(base + Duration::from_secs(2), "2026-08-08");
        assert!(q.can_issue_daily_request_on("2026-08-08"));
        assert_eq!(q.daily_count_on("2026-08-08"), 1);
    }

    #[test]
    fn test_daily_limit_blocks() {
        let mut q = tracker(20, 2);
        let base = Instant::now();
        q.record_request_at(base, "2026-08-07");
        q.record_request_at(base + Duration::from_secs(1), "2026-08-07");
        assert!(!q.can_issue_daily_request_on("2026-08-07"));
    }

    #[test]
    fn test_display_reads_do_not_mutate_reset_state() {
        let mut q = tracker(20, 500);
        q.record_request_at(Instant::now(), "2026-08-07");

        // Reading usage for a later date must not reset the stored counter.
        assert_eq!(q.daily_count_on("2026-08-08"), 0);
        assert_eq!(q.last_reset(), "2026-08-07");
        assert_eq!(q.daily_count_on("2026-08-07"), 1);
    }

    #[test]
    fn test_daily_state_survives_reload() {
        let store = temp_store();
        {
            let mut q = QuotaTracker::load(store.clone(), 20, 500);
            q.record_request_at(Instant::now(), "2026-08-07");
        }
        let q = QuotaTracker::load(store, 20, 500);
        assert_eq!(q.daily_count_on("2026-08-07"), 1);
        // The minute window is process-local and starts empty.
        assert_eq!(q.minute_count(), 0);
    }
}
