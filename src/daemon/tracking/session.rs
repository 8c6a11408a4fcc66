use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::daemon::storage::{
    entities::{DomainRecord, StorageDetails},
    time_store::TimeStore,
};

use super::{
    accrual::Accrual,
    listing::{order_sites, SiteEntry},
    registry::ActiveTabRegistry,
    TrackerInput,
};

/// The domain currently receiving time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    domain: String,
    /// Start of the span that hasn't been flushed yet.
    since: DateTime<Utc>,
}

/// Read-only view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub active_domain: Option<String>,
    pub attended_since: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl SessionState {
    /// Whole seconds attended but not flushed yet.
    pub fn unflushed_seconds(&self) -> u64 {
        self.attended_since
            .map(|since| (self.now - since).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Session plus the domains with open tabs, as returned to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    #[serde(flatten)]
    pub session: SessionState,
    pub active_tab_domains: Vec<String>,
}

/// The accounting state machine. It is either idle or attending exactly one domain that has an
/// open tab. Every transition away from a domain flushes the time spent on it into the store.
///
/// Writes that fail are never dropped: a failed flush of the attended domain keeps the span
/// start where it was, and accruals of domains that are no longer attended are kept in memory
/// and retried on the next flush.
pub struct SessionTracker<S: TimeStore> {
    store: S,
    session: Option<Session>,
    registry: ActiveTabRegistry,
    pending: BTreeMap<String, Accrual>,
}

impl<S: TimeStore> SessionTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: None,
            registry: ActiveTabRegistry::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_domain(&self) -> Option<&str> {
        self.session.as_ref().map(|v| v.domain.as_str())
    }

    /// Domains with accruals waiting to be written.
    pub fn pending_domains(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    pub async fn apply(&mut self, input: TrackerInput, now: DateTime<Utc>) {
        match input {
            TrackerInput::Attend(domain) => self.attend(&domain, now).await,
            TrackerInput::Release => self.release(now).await,
            TrackerInput::TabsetChanged(urls) => self.tabset_changed(urls, now).await,
        }
    }

    /// Starts attending `domain`. The previous domain, if any, is flushed first. Attending the
    /// domain that is already attended changes nothing. Domains without an open tab can't be
    /// attended, for them this is [SessionTracker::release].
    pub async fn attend(&mut self, domain: &str, now: DateTime<Utc>) {
        if !self.registry.contains(domain) {
            debug!("{domain} has no open tab, releasing instead");
            self.release(now).await;
            return;
        }
        if self.active_domain() == Some(domain) {
            return;
        }

        self.close_session(now).await;

        info!("Attending {domain}");
        self.session = Some(Session {
            domain: domain.to_owned(),
            since: now,
        });
        self.record_visit(domain, now).await;
    }

    /// Stops attending. Does nothing when idle.
    pub async fn release(&mut self, now: DateTime<Utc>) {
        if self.session.is_some() {
            self.close_session(now).await;
        }
    }

    /// Recomputes the tab set. If the attended domain lost its last tab the session ends.
    pub async fn tabset_changed<I, T>(&mut self, live_tab_urls: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let diff = self.registry.refresh(live_tab_urls);
        let lost_tab = self
            .active_domain()
            .is_some_and(|domain| diff.removed.iter().any(|v| v == domain));
        if lost_tab {
            self.close_session(now).await;
        }
    }

    /// Persists the time attended since the last flush. The span start only moves forward once
    /// the store confirmed the write. Returns [None] when idle.
    pub async fn flush(&mut self, now: DateTime<Utc>) -> Result<Option<DomainRecord>> {
        self.retry_pending().await;

        let Some(session) = &self.session else {
            return Ok(None);
        };
        let (accrual, next_since) = accrue(session, now);
        let record = self.store_accrual(accrual).await?;
        if let Some(session) = self.session.as_mut() {
            session.since = next_since;
        }
        Ok(Some(record))
    }

    pub fn report_state(&self, now: DateTime<Utc>) -> SessionState {
        SessionState {
            active_domain: self.session.as_ref().map(|v| v.domain.clone()),
            attended_since: self.session.as_ref().map(|v| v.since),
            now,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> TrackerState {
        TrackerState {
            session: self.report_state(now),
            active_tab_domains: self.registry.domains(),
        }
    }

    /// Attends `domain` even though no tab for it is known yet. Used when the host is asked to
    /// open or focus a tab of that domain.
    pub async fn switch_to(&mut self, domain: &str, now: DateTime<Utc>) {
        self.registry.admit(domain);
        self.attend(domain, now).await;
    }

    /// Removes all statistics of `domain`. Nothing changes if the store refuses the delete.
    ///
    /// If `domain` is attended the unflushed span is discarded and accrual starts over from `now`,
    /// the user is still looking at the page.
    pub async fn delete_domain(
        &mut self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DomainRecord>> {
        let removed = self.store.delete_record(domain).await?;
        self.pending.remove(domain);

        if let Some(session) = self.session.as_mut().filter(|v| v.domain == domain) {
            info!(
                "Deleted attended {domain}, dropping {}s",
                (now - session.since).num_seconds().max(0)
            );
            session.since = now;
        }
        Ok(removed)
    }

    /// Puts back a record captured before [SessionTracker::delete_domain].
    pub async fn restore_domain(&mut self, domain: &str, record: DomainRecord) -> Result<()> {
        info!("Restoring {domain}");
        self.store.put_record(domain, record).await
    }

    /// Empties the store. An attended domain immediately gets a fresh record with one visit and
    /// keeps accruing from the same span start.
    pub async fn clear_all(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.store.clear_all().await?;
        self.pending.clear();
        info!("Cleared all records");

        if let Some(domain) = self.active_domain().map(str::to_owned) {
            self.record_visit(&domain, now).await;
        }
        Ok(())
    }

    pub async fn list_sites(&self, now: DateTime<Utc>) -> Result<Vec<SiteEntry>> {
        let records = self.store.list_records().await?;
        Ok(order_sites(records, &self.state(now)))
    }

    pub async fn storage_details(&self) -> Result<StorageDetails> {
        self.store.storage_details().await
    }

    /// Ends the session, flushing it. A failed write is kept for a retry.
    async fn close_session(&mut self, now: DateTime<Utc>) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!("Releasing {}", session.domain);
        let (accrual, _) = accrue(&session, now);
        if let Err(e) = self.store_accrual(accrual.clone()).await {
            error!("Failed to flush {}, keeping it for a retry: {e:?}", session.domain);
            self.defer(accrual);
        }
    }

    async fn record_visit(&mut self, domain: &str, now: DateTime<Utc>) {
        let visit = Accrual::visit(domain, now);
        if let Err(e) = self.store_accrual(visit.clone()).await {
            error!("Failed to record visit of {domain}, keeping it for a retry: {e:?}");
            self.defer(visit);
        }
    }

    /// Writes `accrual` together with anything still pending for the same domain.
    async fn store_accrual(&mut self, accrual: Accrual) -> Result<DomainRecord> {
        let combined = match self.pending.get(&accrual.domain) {
            Some(pending) => {
                let mut combined = pending.clone();
                combined.merge(accrual);
                combined
            }
            None => accrual,
        };

        let record = self
            .store
            .upsert_record(&combined.domain, |record| combined.apply(record))
            .await?;
        if self.pending.remove(&combined.domain).is_some() {
            info!("Wrote pending time of {}", combined.domain);
        }
        debug!(
            "Stored {}s for {}, total {}s",
            combined.seconds(),
            combined.domain,
            record.total_time
        );
        Ok(record)
    }

    fn defer(&mut self, accrual: Accrual) {
        match self.pending.get_mut(&accrual.domain) {
            Some(pending) => pending.merge(accrual),
            None => {
                self.pending.insert(accrual.domain.clone(), accrual);
            }
        }
    }

    /// Tries to write every accrual that failed before.
    pub async fn retry_pending(&mut self) {
        let domains = self.pending.keys().cloned().collect::<Vec<_>>();
        for domain in domains {
            let Some(accrual) = self.pending.remove(&domain) else {
                continue;
            };
            match self
                .store
                .upsert_record(&domain, |record| accrual.apply(record))
                .await
            {
                Ok(_) => info!("Wrote pending time of {domain}"),
                Err(e) => {
                    warn!("Retry for {domain} failed: {e:?}");
                    self.pending.insert(domain, accrual);
                }
            }
        }
    }
}

/// Computes what the session accrued until `now` and where the next span starts. Only whole
/// seconds are accrued, the remainder stays in the next span.
fn accrue(session: &Session, now: DateTime<Utc>) -> (Accrual, DateTime<Utc>) {
    let elapsed = now - session.since;
    if elapsed < Duration::zero() {
        warn!(
            "Clock went back by {}ms while attending {}",
            -elapsed.num_milliseconds(),
            session.domain
        );
        return (Accrual::elapsed(&session.domain, now, 0, now), now);
    }

    let seconds = elapsed.num_seconds() as u64;
    let next_since = session.since + Duration::seconds(seconds as i64);
    (
        Accrual::elapsed(&session.domain, session.since, seconds, now),
        next_since,
    )
}
