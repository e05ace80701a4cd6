use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Distance recorded for one calendar day.
///
/// Hour buckets (`"00"`..`"23"`) are stored as siblings of `total_distance`
/// inside the day object, so they are flattened on (de)serialization.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DayRecord {
    pub total_distance: f64,
    #[serde(flatten)]
    pub hours: BTreeMap<String, f64>,
}

impl DayRecord {
    pub fn new(hour: &str, distance: f64) -> Self {
        let mut hours = BTreeMap::new();
        hours.insert(hour.to_string(), distance);
        Self {
            total_distance: distance,
            hours,
        }
    }

    pub fn hour(&self, hour: &str) -> f64 {
        self.hours.get(hour).copied().unwrap_or(0.0)
    }
}

/// The persisted day/hour distance store. Key: "YYYY-MM-DD".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Ledger {
    days: BTreeMap<String, DayRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day(&self, date: &str) -> Option<&DayRecord> {
        self.days.get(date)
    }

    pub fn days(&self) -> impl Iterator<Item = (&String, &DayRecord)> {
        self.days.iter()
    }

    pub fn total(&self) -> f64 {
        self.days.values().map(|d| d.total_distance).sum()
    }

    /// Adds `increment` to the day total and to the hour bucket, creating
    /// either if absent. Existing keys are only ever incremented.
    pub fn merge(&mut self, date: &str, hour: &str, increment: f64) -> Result<()> {
        if !increment.is_finite() || increment < 0.0 {
            return Err(anyhow!("Invalid distance increment: {}", increment));
        }

        match self.days.get_mut(date) {
            Some(day) => {
                day.total_distance += increment;
                *day.hours.entry(hour.to_string()).or_insert(0.0) += increment;
            }
            None => {
                self.days
                    .insert(date.to_string(), DayRecord::new(hour, increment));
            }
        }
        Ok(())
    }
}
