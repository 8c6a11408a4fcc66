use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
    browser_api::HostSignal,
    daemon::{
        storage::entities::{DomainRecord, StorageDetails},
        tracking::{listing::SiteEntry, session::TrackerState},
    },
};

/// Everything the tracker reacts to. All of it goes through one queue, so a message is handled
/// to completion before the next one starts.
#[derive(Debug)]
pub enum TrackerMessage {
    Signal(HostSignal),
    Tick,
    Command {
        command: Command,
        respond_to: oneshot::Sender<Result<CommandReply>>,
    },
}

/// Requests of the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    GetState,
    SwitchTo {
        domain: String,
    },
    /// Replies with the removed record so it can be restored.
    DeleteDomain {
        domain: String,
    },
    ClearAll,
    RestoreDomain {
        domain: String,
        record: DomainRecord,
    },
    ListSites,
    StorageDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    State(TrackerState),
    Sites(Vec<SiteEntry>),
    Record(Option<DomainRecord>),
    Details(StorageDetails),
    Done,
}

/// Everything that leaves the tracker towards the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outbound {
    Response {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<CommandReply>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Sent after every transition and on ticks while a domain is attended.
    TimeUpdated(TrackerState),
    /// Asks the browser to focus or open a tab of the domain.
    FocusDomain { domain: String },
}
