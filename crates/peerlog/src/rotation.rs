//! Rotation boundary computation
//!
//! Parses the interval grammar (`"5MINUTE"`, `"HOUR"`, `"3DAYS"`, ...)
//! and computes rotation windows aligned to GMT calendar units. A window
//! is a half-open span `[start, end)`; rotation fires on the strict
//! comparison `now > end`.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc, Weekday};

use crate::error::LoggerError;

/// Calendar unit of the rotation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Parsed rotation interval: a calendar unit and a multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    unit: IntervalUnit,
    multiplier: u32,
}

impl Interval {
    /// Parse an interval spec of the form `<digits>?<UNIT>S?`,
    /// case-insensitive. Digits default to 1; a trailing plural `S` is
    /// tolerated.
    pub fn parse(spec: &str) -> Result<Self, LoggerError> {
        let digits: String = spec.chars().take_while(|c| c.is_ascii_digit()).collect();
        let multiplier = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| LoggerError::InvalidInterval(spec.to_string()))?
        };
        if multiplier == 0 {
            return Err(LoggerError::InvalidInterval(spec.to_string()));
        }

        let mut name = spec[digits.len()..].to_ascii_uppercase();
        if name.ends_with('S') {
            name.pop();
        }
        let unit = match name.as_str() {
            "MINUTE" => IntervalUnit::Minute,
            "HOUR" => IntervalUnit::Hour,
            "DAY" => IntervalUnit::Day,
            "WEEK" => IntervalUnit::Week,
            "MONTH" => IntervalUnit::Month,
            "YEAR" => IntervalUnit::Year,
            _ => return Err(LoggerError::InvalidInterval(spec.to_string())),
        };
        Ok(Self { unit, multiplier })
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Whether rotated filenames carry a minute field
    pub fn has_minute_field(&self) -> bool {
        self.unit == IntervalUnit::Minute
    }

    /// Align an instant to the boundary that contains it.
    ///
    /// Every calendar field strictly finer than the unit is zeroed, then
    /// the unit's own value is rounded down to a multiple of the
    /// multiplier. Returns the window `(start, end)` with
    /// `start <= instant < end` (for multiplier 1).
    pub fn align(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.align_start(instant);
        (start, self.step(start))
    }

    fn align_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let m = self.multiplier;
        let (mut year, mut month0, mut day, mut hour, mut minute) = (
            instant.year(),
            instant.month0(),
            instant.day(),
            instant.hour(),
            instant.minute(),
        );
        // Fields to zero per unit, coarsest to finest; 1-based fields
        // (day, month) floor to 1 when the rounded multiple would be 0.
        match self.unit {
            IntervalUnit::Minute => {
                minute = (minute / m) * m;
            }
            IntervalUnit::Hour => {
                minute = 0;
                hour = (hour / m) * m;
            }
            IntervalUnit::Day => {
                minute = 0;
                hour = 0;
                day = ((day / m) * m).max(1);
            }
            IntervalUnit::Week => {
                minute = 0;
                hour = 0;
                let date = instant.date_naive();
                let week_start = date - Duration::days(i64::from(
                    date.weekday().num_days_from_monday(),
                ));
                let iso = week_start.iso_week();
                let week = ((iso.week() / m) * m).max(1);
                let rounded = NaiveDate::from_isoywd_opt(iso.year(), week, Weekday::Mon)
                    .unwrap_or(week_start);
                year = rounded.year();
                month0 = rounded.month0();
                day = rounded.day();
            }
            IntervalUnit::Month => {
                minute = 0;
                hour = 0;
                day = 1;
                month0 = (month0 / m) * m;
            }
            IntervalUnit::Year => {
                minute = 0;
                hour = 0;
                day = 1;
                month0 = 0;
                year = (year / m as i32) * m as i32;
            }
        }
        Utc.with_ymd_and_hms(year, month0 + 1, day, hour, minute, 0)
            .single()
            .expect("aligned calendar fields form a valid GMT instant")
    }

    /// Advance an aligned instant by `multiplier` units
    pub fn step(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let m = self.multiplier;
        match self.unit {
            IntervalUnit::Minute => t + Duration::minutes(i64::from(m)),
            IntervalUnit::Hour => t + Duration::hours(i64::from(m)),
            IntervalUnit::Day => t + Duration::days(i64::from(m)),
            IntervalUnit::Week => t + Duration::weeks(i64::from(m)),
            IntervalUnit::Month => t
                .checked_add_months(Months::new(m))
                .expect("month arithmetic stays in range"),
            IntervalUnit::Year => t
                .checked_add_months(Months::new(12 * m))
                .expect("year arithmetic stays in range"),
        }
    }
}

/// Tracks the current rotation window for the writer thread
#[derive(Debug, Clone)]
pub struct RotationClock {
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RotationClock {
    /// Align to the window containing `now`
    pub fn new(interval: Interval, now: DateTime<Utc>) -> Self {
        let (start, end) = interval.align(now);
        Self {
            interval,
            start,
            end,
        }
    }

    /// Inclusive start of the current window
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end of the current window
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether the window has been passed (strict: equality does not
    /// trigger rotation)
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }

    /// Move to the next window
    pub fn advance(&mut self) {
        self.start = self.end;
        self.end = self.interval.step(self.end);
    }
}
