use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    daemon::storage::entities::{DailyStat, DomainRecord},
    utils::time::{local_day, split_by_local_day},
};

/// A change to a single [DomainRecord]: seconds and visits per day plus the moment it happened.
///
/// Accruals that could not be persisted are merged together and written later, so applying the
/// merged accrual is the same as applying every part of it.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Accrual {
    pub domain: String,
    pub days: BTreeMap<NaiveDate, DailyStat>,
    pub at: DateTime<Utc>,
}

impl Accrual {
    /// Time spent on `domain` starting at `since`. Days are split on local midnight.
    pub fn elapsed(domain: &str, since: DateTime<Utc>, seconds: u64, at: DateTime<Utc>) -> Self {
        let days = split_by_local_day(since, seconds)
            .into_iter()
            .map(|(day, total_time)| {
                (
                    day,
                    DailyStat {
                        total_time,
                        visits: 0,
                    },
                )
            })
            .collect();
        Self {
            domain: domain.to_owned(),
            days,
            at,
        }
    }

    /// A single visit at `at`.
    pub fn visit(domain: &str, at: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_owned(),
            days: BTreeMap::from([(
                local_day(at),
                DailyStat {
                    total_time: 0,
                    visits: 1,
                },
            )]),
            at,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.days.values().map(|v| v.total_time).sum()
    }

    /// Combines two accruals of the same domain.
    pub fn merge(&mut self, other: Accrual) {
        debug_assert_eq!(self.domain, other.domain);
        for (day, stat) in other.days {
            self.days.entry(day).or_default().add(stat);
        }
        self.at = self.at.max(other.at);
    }

    pub fn apply(&self, mut record: DomainRecord) -> DomainRecord {
        for (day, stat) in &self.days {
            record.accrue(*day, stat.total_time);
            record.record_visits(*day, stat.visits);
        }
        record.touch(self.at);
        record
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone, Utc};

    use crate::{daemon::storage::entities::DomainRecord, utils::time::local_day};

    use super::Accrual;

    #[test]
    fn test_visit_on_fresh_record_starts_at_one() {
        let now = Utc::now();
        let record = Accrual::visit("a.com", now).apply(DomainRecord::default());
        assert_eq!(record.day(local_day(now)).visits, 1);
        assert_eq!(record.total_time, 0);
        assert_eq!(record.last_visit, now);
        assert_eq!(record.last_update_at, now);
    }

    #[test]
    fn test_merged_accruals_apply_like_parts() {
        let start = Local
            .with_ymd_and_hms(2018, 7, 4, 23, 59, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        let first = Accrual::elapsed("a.com", start, 30, start + Duration::seconds(30));
        let second = Accrual::elapsed(
            "a.com",
            start + Duration::seconds(30),
            45,
            start + Duration::seconds(75),
        );

        let sequential = second.apply(first.apply(DomainRecord::default()));

        let mut merged = first.clone();
        merged.merge(second);
        let combined = merged.apply(DomainRecord::default());

        assert_eq!(merged.seconds(), 75);
        assert_eq!(sequential, combined);
        assert_eq!(combined.daily_stats.len(), 2);
        assert!(combined.is_consistent());
    }
}
