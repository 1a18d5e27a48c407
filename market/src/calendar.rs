//! Trading calendar boundary.
//!
//! Only used at setup to pick default rebase timestamps (e.g. "most recent
//! market close"); never consulted on the tick path.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveTime, Weekday};

pub trait TradingCalendar {
    /// Epoch seconds of the most recent session close at or before `at`.
    fn last_close(&self, instrument: &str, at: f64) -> Option<f64>;
}

/// A daily session closing at a fixed UTC time on the given weekdays.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub close: NaiveTime,
    pub trading_days: Vec<Weekday>,
}

impl Session {
    /// Monday to Friday, closing at `close` UTC.
    pub fn weekdays(close: NaiveTime) -> Self {
        Self {
            close,
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedSessionCalendar {
    sessions: HashMap<String, Session>,
    fallback: Option<Session>,
}

impl FixedSessionCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, instrument: impl Into<String>, session: Session) -> Self {
        self.sessions.insert(instrument.into(), session);
        self
    }

    /// Session used for instruments without an explicit entry.
    pub fn with_fallback(mut self, session: Session) -> Self {
        self.fallback = Some(session);
        self
    }

    pub fn session_for(&self, instrument: &str) -> Option<&Session> {
        self.sessions.get(instrument).or(self.fallback.as_ref())
    }
}

impl TradingCalendar for FixedSessionCalendar {
    fn last_close(&self, instrument: &str, at: f64) -> Option<f64> {
        let session = self.session_for(instrument)?;
        if session.trading_days.is_empty() || !at.is_finite() {
            return None;
        }

        let mut date = DateTime::from_timestamp(at.floor() as i64, 0)?.date_naive();

        // A week back always reaches a trading day.
        for _ in 0..8 {
            if session.trading_days.contains(&date.weekday()) {
                let close = date.and_time(session.close).and_utc().timestamp() as f64;
                if close <= at {
                    return Some(close);
                }
            }
            date = date.pred_opt()?;
        }
        None
    }
}

/// Default rebase timestamp per instrument: its last close before `at`.
pub fn rebase_points<C, S>(calendar: &C, instruments: &[S], at: f64) -> HashMap<String, f64>
where
    C: TradingCalendar + ?Sized,
    S: AsRef<str>,
{
    instruments
        .iter()
        .filter_map(|name| {
            let name = name.as_ref();
            calendar.last_close(name, at).map(|ts| (name.to_string(), ts))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32) -> f64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp() as f64
    }

    fn calendar() -> FixedSessionCalendar {
        let close = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
        FixedSessionCalendar::new().with_session("US500", Session::weekdays(close))
    }

    #[test]
    fn midweek_before_close_uses_previous_day() {
        // 2024-01-10 is a Wednesday.
        let c = calendar();
        assert_eq!(c.last_close("US500", ts(2024, 1, 10, 12)), Some(ts(2024, 1, 9, 21)));
    }

    #[test]
    fn after_close_uses_same_day() {
        let c = calendar();
        assert_eq!(c.last_close("US500", ts(2024, 1, 10, 22)), Some(ts(2024, 1, 10, 21)));
    }

    #[test]
    fn monday_morning_rolls_back_to_friday() {
        let c = calendar();
        assert_eq!(c.last_close("US500", ts(2024, 1, 8, 10)), Some(ts(2024, 1, 5, 21)));
    }

    #[test]
    fn unknown_instrument_without_fallback_has_no_close() {
        let c = calendar();
        assert_eq!(c.last_close("DE40", ts(2024, 1, 10, 12)), None);

        let close = NaiveTime::from_hms_opt(16, 30, 0).unwrap();
        let c = c.with_fallback(Session::weekdays(close));
        assert!(c.last_close("DE40", ts(2024, 1, 10, 12)).is_some());
    }

    #[test]
    fn rebase_points_skip_instruments_without_session() {
        let c = calendar();
        let points = rebase_points(&c, &["US500", "DE40"], ts(2024, 1, 10, 22));
        assert_eq!(points.len(), 1);
        assert_eq!(points["US500"], ts(2024, 1, 10, 21));
    }
}
