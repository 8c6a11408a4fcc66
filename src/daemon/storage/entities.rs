use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Usage of a domain during one local calendar day.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    /// Seconds spent on the domain this day.
    #[serde(default)]
    pub total_time: u64,
    #[serde(default)]
    pub visits: u32,
}

impl DailyStat {
    pub fn add(&mut self, other: DailyStat) {
        self.total_time += other.total_time;
        self.visits += other.visits;
    }
}

/// Accumulated statistics of a single domain. This is the value stored in the time document,
/// keyed by the domain.
///
/// The sum of `daily_stats[*].total_time` always equals `total_time`; only
/// [DomainRecord::accrue] and [DomainRecord::record_visits] mutate counters.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    /// All-time seconds.
    pub total_time: u64,
    pub last_visit: DateTime<Utc>,
    /// Used for ordering sites when they are displayed.
    pub last_update_at: DateTime<Utc>,
    #[serde(default)]
    pub daily_stats: BTreeMap<NaiveDate, DailyStat>,
}

impl Default for DomainRecord {
    fn default() -> Self {
        Self {
            total_time: 0,
            last_visit: DateTime::<Utc>::UNIX_EPOCH,
            last_update_at: DateTime::<Utc>::UNIX_EPOCH,
            daily_stats: BTreeMap::new(),
        }
    }
}

impl DomainRecord {
    /// Adds time to a day and to the all-time counter.
    pub fn accrue(&mut self, day: NaiveDate, seconds: u64) {
        self.daily_stats.entry(day).or_default().total_time += seconds;
        self.total_time += seconds;
    }

    pub fn record_visits(&mut self, day: NaiveDate, visits: u32) {
        self.daily_stats.entry(day).or_default().visits += visits;
    }

    pub fn touch(&mut self, moment: DateTime<Utc>) {
        self.last_visit = moment;
        self.last_update_at = moment;
    }

    pub fn day(&self, day: NaiveDate) -> DailyStat {
        self.daily_stats.get(&day).copied().unwrap_or_default()
    }

    /// Checks that daily buckets add up to the all-time counter.
    pub fn is_consistent(&self) -> bool {
        self.daily_stats.values().map(|v| v.total_time).sum::<u64>() == self.total_time
    }
}

/// Whole persisted document: domain -> record.
pub type TimeData = BTreeMap<String, DomainRecord>;

/// Size information about the store, shown in the footer of the site list.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageDetails {
    pub sites: usize,
    pub bytes: u64,
}
