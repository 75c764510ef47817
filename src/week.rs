//! ISO-8601 week ids (Monday start, ISO week-year), rendered `YYYY-Www`.
//!
//! Late-December and early-January dates can belong to the neighbouring
//! week-year: 2026-12-31 is `2026-W53`, 2027-01-01 is `2026-W53` too.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekId {
    year: i32,
    week: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid week id '{0}' (expected YYYY-Www, e.g. 2026-W42)")]
pub struct WeekParseError(pub String);

impl WeekId {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    pub fn monday(&self) -> NaiveDate {
        // Constructed values are always valid ISO weeks.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or_default()
    }

    /// Monday through Sunday.
    pub fn days(&self) -> [NaiveDate; 7] {
        let monday = self.monday();
        let mut out = [monday; 7];
        for (i, d) in out.iter_mut().enumerate() {
            *d = monday + chrono::Duration::days(i as i64);
        }
        out
    }

    /// Exclusive end of the week: the following Monday, 00:00 UTC.
    pub fn end(&self) -> DateTime<Utc> {
        (self.monday() + chrono::Duration::days(7))
            .and_time(NaiveTime::MIN)
            .and_utc()
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = WeekParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || WeekParseError(s.to_string());
        let (y, w) = s.trim().split_once(['W', 'w']).ok_or_else(err)?;
        let y = y.strip_suffix('-').unwrap_or(y);
        let year: i32 = y.parse().map_err(|_| err())?;
        let week: u32 = w.parse().map_err(|_| err())?;
        Self::new(year, week).ok_or_else(err)
    }
}

impl Serialize for WeekId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn every_day_of_a_week_maps_to_the_same_id() {
        let w = WeekId::from_date(date(2026, 10, 14));
        assert_eq!(w.to_string(), "2026-W42");
        for d in w.days() {
            assert_eq!(WeekId::from_date(d), w);
        }
        assert_eq!(w.days()[0].weekday(), Weekday::Mon);
        assert_eq!(w.days()[6].weekday(), Weekday::Sun);
    }

    #[test]
    fn year_boundaries_follow_iso_week_year() {
        assert_eq!(WeekId::from_date(date(2027, 1, 1)).to_string(), "2026-W53");
        assert_eq!(WeekId::from_date(date(2024, 12, 30)).to_string(), "2025-W01");
    }

    #[test]
    fn parses_and_rejects() {
        assert_eq!("2026-W07".parse::<WeekId>().unwrap(), WeekId::new(2026, 7).unwrap());
        assert_eq!("2026w7".parse::<WeekId>().unwrap().to_string(), "2026-W07");
        assert!("2025-W53".parse::<WeekId>().is_err());
        assert!("2026-W00".parse::<WeekId>().is_err());
        assert!("last week".parse::<WeekId>().is_err());
    }

    #[test]
    fn serde_uses_the_string_form() {
        let w = WeekId::new(2026, 42).unwrap();
        assert_eq!(serde_json::to_string(&w).unwrap(), "\"2026-W42\"");
        let back: WeekId = serde_json::from_str("\"2026-W42\"").unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn week_end_is_next_monday_midnight() {
        let w: WeekId = "2026-W11".parse().unwrap();
        assert_eq!(w.end().to_rfc3339(), "2026-03-16T00:00:00+00:00");
        assert_eq!(w.end().date_naive(), w.days()[6] + chrono::Duration::days(1));
    }
}
