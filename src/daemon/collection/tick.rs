use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::{daemon::processing::messages::TrackerMessage, utils::clock::Clock};

/// Periodically asks the tracker to reflect the running session, so totals never lag behind by
/// more than one tick.
pub struct TickDriver {
    next: mpsc::Sender<TrackerMessage>,
    shutdown: CancellationToken,
    tick_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl TickDriver {
    pub fn new(
        next: mpsc::Sender<TrackerMessage>,
        shutdown: CancellationToken,
        tick_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            shutdown,
            tick_interval,
            time_provider,
        }
    }

    /// Executes the tick loop until shutdown.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        loop {
            tick_point += self.tick_interval;

            tokio::select! {
                // Cancelation drops the sender, which lets the tracker finish once the host
                // reader is gone as well.
                _ = self.shutdown.cancelled() => {
                    info!("Tick driver stopped");
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }

            trace!("Tick");
            self.next
                .send(TrackerMessage::Tick)
                .await
                .map_err(|_| anyhow!("Tracker stopped accepting ticks"))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{daemon::processing::messages::TrackerMessage, utils::clock::TestClock};

    use super::TickDriver;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_shutdown() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let driver = TickDriver::new(
            sender,
            shutdown.clone(),
            Duration::from_secs(1),
            Box::new(TestClock::starting_at(Utc::now())),
        );

        let (result, _) = tokio::join!(driver.run(), async {
            tokio::time::sleep(Duration::from_millis(5500)).await;
            shutdown.cancel();
        });
        result?;

        let mut ticks = 0;
        while let Some(message) = receiver.recv().await {
            assert!(matches!(message, TrackerMessage::Tick));
            ticks += 1;
        }
        assert_eq!(ticks, 5);
        Ok(())
    }
}
