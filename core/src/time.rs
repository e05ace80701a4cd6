use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use anyhow::{anyhow, Result};

/// The ledger cell a flush lands in: calendar day and hour of day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub date: String,
    pub hour: String,
}

impl Bucket {
    pub fn from_local(at: DateTime<Local>) -> Self {
        Self::from_datetime(at)
    }

    pub fn from_datetime<Tz: TimeZone>(at: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            hour: at.format("%H").to_string(),
        }
    }
}

/// Wall clock used to bucket flushes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Parses `30s`, `5m`, `1h` or `2d`. A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    if let Ok(secs) = input.parse::<i64>() {
        return Duration::try_seconds(secs)
            .ok_or_else(|| anyhow!("Duration out of range: {}", input));
    }

    let unit_len = input.chars().last().map_or(0, char::len_utf8);
    let (num_str, unit) = input.split_at(input.len() - unit_len);

    let num: i64 = num_str.parse().map_err(|_| anyhow!("Invalid duration number"))?;

    let duration = match unit.to_lowercase().as_str() {
        "s" => Duration::try_seconds(num),
        "m" => Duration::try_minutes(num),
        "h" => Duration::try_hours(num),
        "d" => Duration::try_days(num),
        _ => return Err(anyhow!("Unknown duration unit: {}", unit)),
    };
    duration.ok_or_else(|| anyhow!("Duration out of range: {}", input))
}

/// Parses a day for the report: `today`, `yesterday`, `-Nd` or `YYYY-MM-DD`.
pub fn parse_day(input: &str) -> Result<NaiveDate> {
    parse_day_from(input, Local::now().date_naive())
}

fn parse_day_from(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();

    match input.to_lowercase().as_str() {
        "today" | "tod" => return Ok(today),
        "yesterday" | "yes" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    // Relative format (-Nd, -Nw)
    if let Some(rest) = input.strip_prefix('-') {
        if rest.len() >= 2 && rest.is_ascii() {
            let (num_str, unit) = rest.split_at(rest.len() - 1);
            let count: i64 = num_str.parse().map_err(|_| anyhow!("Invalid relative format"))?;
            let offset = match unit {
                "d" => Duration::try_days(count),
                "w" => Duration::try_weeks(count),
                _ => return Err(anyhow!("Unknown unit in relative day: {}", unit)),
            };
            return offset
                .and_then(|offset| today.checked_sub_signed(offset))
                .ok_or_else(|| anyhow!("Relative day out of range: {}", input));
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| anyhow!("Could not parse date: {}", input))
}
