//! Accounting of attended time. [session::SessionTracker] is the state machine, it is driven by
//! the three [TrackerInput]s produced from host signals.

pub mod accrual;
pub mod domain;
pub mod listing;
pub mod registry;
pub mod session;

/// Abstract inputs of the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerInput {
    /// The user looks at a page of this domain.
    Attend(String),
    /// The user doesn't look at any page.
    Release,
    /// Urls of all open tabs.
    TabsetChanged(Vec<String>),
}
