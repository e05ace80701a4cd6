use anyhow::Result;
use chrono::{Duration, NaiveDate};

use crate::model::ledger::Ledger;
use crate::repository::LedgerRepository;
use crate::service::dto::{DayDetail, DaySummary, HourSummary, RangeSummary};

/// Read-only views over the ledger: per day, per hour, and over a range.
pub struct ReportUseCase<'a, R: LedgerRepository> {
    repo: &'a R,
}

impl<'a, R: LedgerRepository> ReportUseCase<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Every recorded day, newest first, plus the all-time total.
    pub fn all_time(&self) -> Result<RangeSummary> {
        let ledger = self.repo.load()?;
        let mut days: Vec<DaySummary> = ledger
            .days()
            .map(|(date, record)| DaySummary {
                date: date.clone(),
                weekday: weekday_of(date),
                total_distance: record.total_distance,
            })
            .collect();
        days.reverse();

        Ok(summarize(days))
    }

    /// The `count` days with the most distance, largest first. Ties keep
    /// the newer day first.
    pub fn top_days(&self, count: usize) -> Result<RangeSummary> {
        let ledger = self.repo.load()?;
        let mut days: Vec<DaySummary> = ledger
            .days()
            .map(|(date, record)| DaySummary {
                date: date.clone(),
                weekday: weekday_of(date),
                total_distance: record.total_distance,
            })
            .collect();
        days.sort_by(|a, b| {
            b.total_distance
                .total_cmp(&a.total_distance)
                .then_with(|| b.date.cmp(&a.date))
        });
        days.truncate(count);

        Ok(summarize(days))
    }

    /// The `count` days ending at `end`, oldest first. Days with no record
    /// are reported as zero.
    pub fn last_days(&self, end: NaiveDate, count: u32) -> Result<RangeSummary> {
        let ledger = self.repo.load()?;
        let days = (0..count as i64)
            .rev()
            .map(|offset| {
                let date = end - Duration::days(offset);
                let key = date.format("%Y-%m-%d").to_string();
                DaySummary {
                    total_distance: day_total(&ledger, &key),
                    weekday: date.format("%a").to_string(),
                    date: key,
                }
            })
            .collect();

        Ok(summarize(days))
    }

    pub fn day(&self, date: NaiveDate) -> Result<DayDetail> {
        let ledger = self.repo.load()?;
        let key = date.format("%Y-%m-%d").to_string();
        let record = ledger.day(&key);

        let hours: Vec<HourSummary> = (0..24)
            .map(|h| {
                let hour = format!("{:02}", h);
                HourSummary {
                    distance: record.map(|r| r.hour(&hour)).unwrap_or(0.0),
                    hour,
                }
            })
            .collect();

        let busiest_hour = hours
            .iter()
            .filter(|h| h.distance > 0.0)
            .max_by(|a, b| a.distance.total_cmp(&b.distance))
            .map(|h| h.hour.clone());

        Ok(DayDetail {
            date: key,
            total_distance: record.map(|r| r.total_distance).unwrap_or(0.0),
            hours,
            busiest_hour,
        })
    }
}

fn day_total(ledger: &Ledger, date: &str) -> f64 {
    ledger.day(date).map(|d| d.total_distance).unwrap_or(0.0)
}

fn weekday_of(date: &str) -> String {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%a").to_string())
        .unwrap_or_default()
}

fn summarize(days: Vec<DaySummary>) -> RangeSummary {
    let total_distance: f64 = days.iter().map(|d| d.total_distance).sum();
    let daily_average = if days.is_empty() {
        0.0
    } else {
        total_distance / days.len() as f64
    };
    RangeSummary {
        days,
        total_distance,
        daily_average,
    }
}
