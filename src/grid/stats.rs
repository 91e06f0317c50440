//! Round-trip counters and the once-a-day report

use chrono::NaiveDate;

use super::types::Balance;

/// Completed round trips, lifetime and for the current local day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyStats {
    pub total_trades: u64,
    pub daily_trades: u64,
    day: NaiveDate,
}

impl DailyStats {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            total_trades: 0,
            daily_trades: 0,
            day: today,
        }
    }

    /// A take-profit filled: one more completed round trip
    pub fn record_round_trip(&mut self) {
        self.total_trades += 1;
        self.daily_trades += 1;
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// The local calendar date has moved on since the last report
    pub fn rollover_due(&self, today: NaiveDate) -> bool {
        today != self.day
    }

    /// Report line for the day being closed
    pub fn report(&self, uid: &str, symbol: &str, balance: &Balance) -> String {
        format!(
            "{} {} trades {}, balance {:.2} & {:.2}",
            uid, symbol, self.daily_trades, balance.available, balance.total
        )
    }

    /// Start counting a new day
    pub fn roll(&mut self, today: NaiveDate) {
        self.daily_trades = 0;
        self.day = today;
    }
}
