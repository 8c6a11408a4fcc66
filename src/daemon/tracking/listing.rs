use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{daemon::storage::entities::DomainRecord, utils::time::local_day};

use super::session::TrackerState;

/// One row of the site list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub domain: String,
    /// The domain is being attended right now.
    pub active: bool,
    pub has_open_tab: bool,
    /// All-time seconds, including the span that hasn't been flushed yet.
    pub total_time: u64,
    /// Seconds today, including the span that hasn't been flushed yet.
    pub today_time: u64,
    pub today_visits: u32,
    pub last_visit: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
}

/// Orders records for display: the attended domain, then domains with open tabs, then the most
/// recently updated ones.
pub fn order_sites(records: Vec<(String, DomainRecord)>, state: &TrackerState) -> Vec<SiteEntry> {
    let today = local_day(state.session.now);
    let live = state.session.unflushed_seconds();
    let active_domain = state.session.active_domain.as_deref();

    let mut entries = records
        .into_iter()
        .map(|(domain, record)| {
            let active = active_domain == Some(domain.as_str());
            let live = if active { live } else { 0 };
            let day = record.day(today);
            SiteEntry {
                has_open_tab: state.active_tab_domains.contains(&domain),
                active,
                total_time: record.total_time + live,
                today_time: day.total_time + live,
                today_visits: day.visits,
                last_visit: record.last_visit,
                last_update_at: record.last_update_at,
                domain,
            }
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| {
        (Reverse(a.active), Reverse(a.has_open_tab), Reverse(a.last_update_at), &a.domain).cmp(&(
            Reverse(b.active),
            Reverse(b.has_open_tab),
            Reverse(b.last_update_at),
            &b.domain,
        ))
    });
    entries
}
