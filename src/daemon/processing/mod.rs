use anyhow::Result;
use chrono::{DateTime, Utc};
use messages::{Command, CommandReply, Outbound, TrackerMessage};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver};
use tracing::{debug, debug_span, error, info, warn, Instrument};

use crate::{
    browser_api::HostControl,
    daemon::{
        collection::adapter::EventAdapter,
        storage::time_store::TimeStore,
        tracking::session::SessionTracker,
    },
    utils::clock::Clock,
};

pub mod messages;

/// Owner of the [SessionTracker]. Receives signals, ticks and commands from a single queue and
/// applies them one at a time, then tells listeners about the new state.
pub struct TrackerModule<S: TimeStore, H: HostControl> {
    receiver: Receiver<TrackerMessage>,
    adapter: EventAdapter,
    tracker: SessionTracker<S>,
    host: H,
    outbound: mpsc::Sender<Outbound>,
    clock: Box<dyn Clock>,
    flush_on_tick: bool,
}

impl<S: TimeStore, H: HostControl> TrackerModule<S, H> {
    pub fn new(
        receiver: Receiver<TrackerMessage>,
        store: S,
        host: H,
        outbound: mpsc::Sender<Outbound>,
        clock: Box<dyn Clock>,
        flush_on_tick: bool,
    ) -> Self {
        Self {
            receiver,
            adapter: EventAdapter::new(),
            tracker: SessionTracker::new(store),
            host,
            outbound,
            clock,
            flush_on_tick,
        }
    }

    /// Runs until every sender of the queue is dropped, then releases the session.
    pub async fn run(mut self) -> Result<()> {
        info!("Tracker started");
        while let Some(message) = self.receiver.recv().await {
            let span = debug_span!("Handling tracker message");
            self.handle(message).instrument(span).await;
        }

        self.finalize().await;
        self.receiver.close();
        Ok(())
    }

    async fn handle(&mut self, message: TrackerMessage) {
        let now = self.clock.time();
        match message {
            TrackerMessage::Signal(signal) => {
                debug!("Processing signal {:?}", signal);
                for input in self.adapter.translate(signal) {
                    self.tracker.apply(input, now).await;
                }
                self.notify(now);
            }
            TrackerMessage::Tick => {
                if self.flush_on_tick {
                    if let Err(e) = self.tracker.flush(now).await {
                        error!("Flush on tick failed, retrying on the next one: {e:?}");
                    }
                } else {
                    self.tracker.retry_pending().await;
                }
                if self.tracker.active_domain().is_some() {
                    self.notify(now);
                }
            }
            TrackerMessage::Command {
                command,
                respond_to,
            } => {
                debug!("Executing command {:?}", command);
                let result = self.execute(command, now).await;
                if let Err(e) = &result {
                    warn!("Command failed {e:?}");
                }
                // The requester may have given up waiting.
                let _ = respond_to.send(result);
            }
        }
    }

    async fn execute(&mut self, command: Command, now: DateTime<Utc>) -> Result<CommandReply> {
        let reply = match command {
            Command::GetState => return Ok(CommandReply::State(self.tracker.state(now))),
            Command::ListSites => return Ok(CommandReply::Sites(self.tracker.list_sites(now).await?)),
            Command::StorageDetails => {
                return Ok(CommandReply::Details(self.tracker.storage_details().await?))
            }
            Command::SwitchTo { domain } => {
                self.host.focus_domain(&domain)?;
                self.tracker.switch_to(&domain, now).await;
                CommandReply::Done
            }
            Command::DeleteDomain { domain } => {
                CommandReply::Record(self.tracker.delete_domain(&domain, now).await?)
            }
            Command::ClearAll => {
                self.tracker.clear_all(now).await?;
                CommandReply::Done
            }
            Command::RestoreDomain { domain, record } => {
                self.tracker.restore_domain(&domain, record).await?;
                CommandReply::Done
            }
        };
        self.notify(now);
        Ok(reply)
    }

    fn notify(&self, now: DateTime<Utc>) {
        match self
            .outbound
            .try_send(Outbound::TimeUpdated(self.tracker.state(now)))
        {
            Ok(()) => {}
            // Nobody is listening or the listener is behind, the next update will catch up.
            Err(TrySendError::Full(_)) => debug!("Skipped state notification"),
            Err(TrySendError::Closed(_)) => debug!("No listener for state notifications"),
        }
    }

    async fn finalize(&mut self) {
        let now = self.clock.time();
        self.tracker.release(now).await;
        self.tracker.retry_pending().await;
        let pending = self.tracker.pending_domains();
        if !pending.is_empty() {
            error!("Time of {:?} could not be saved before shutdown", pending);
        }
        info!("Tracker stopped");
    }
}
