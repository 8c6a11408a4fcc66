use anyhow::Result;
use args::TrackerConfig;
use bridge::{read_inbound, write_outbound, OutboundHostControl};
use collection::tick::TickDriver;
use processing::{messages::Outbound, TrackerModule};
use storage::time_store::{FileTimeStore, TimeStore};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod bridge;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracking;

const TRACKER_QUEUE_SIZE: usize = 64;
const OUTBOUND_QUEUE_SIZE: usize = 64;

/// Represents the starting point for the daemon. The browser host talks to it over stdin and
/// stdout.
pub async fn start_daemon(config: TrackerConfig) -> Result<()> {
    info!("Starting tracker in {:?}", config.dir);
    let store = FileTimeStore::new(config.dir.clone())?;
    let shutdown_token = CancellationToken::new();

    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_tracker(
            &config,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            store,
            shutdown_token.clone(),
            DefaultClock,
        ),
    );
    result
}

/// Runs every part of the tracker until the host input ends or `shutdown_token` is cancelled.
pub async fn run_tracker<S: TimeStore>(
    config: &TrackerConfig,
    reader: impl AsyncBufRead + Unpin,
    writer: impl AsyncWrite + Unpin,
    store: S,
    shutdown_token: CancellationToken,
    clock: impl Clock + Clone,
) -> Result<()> {
    let (sender, receiver) = mpsc::channel(TRACKER_QUEUE_SIZE);
    let (outbound, outbound_receiver) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_SIZE);

    let ticks = TickDriver::new(
        sender.clone(),
        shutdown_token.clone(),
        config.tick_interval,
        Box::new(clock.clone()),
    );
    let tracker = TrackerModule::new(
        receiver,
        store,
        OutboundHostControl::new(outbound.clone()),
        outbound.clone(),
        Box::new(clock),
        config.flush_on_tick,
    );

    let (input_result, tick_result, tracker_result, output_result) = tokio::join!(
        async {
            let result = read_inbound(reader, sender, outbound, shutdown_token.clone()).await;
            // Whatever happened to the input, nothing else should keep running.
            shutdown_token.cancel();
            result
        },
        ticks.run(),
        tracker.run(),
        write_outbound(writer, outbound_receiver),
    );

    if let Err(e) = &input_result {
        error!("Host input got an error {e:?}");
    }
    if let Err(e) = &tick_result {
        error!("Tick driver got an error {e:?}");
    }
    if let Err(e) = &output_result {
        error!("Host output got an error {e:?}");
    }
    tracker_result?;
    input_result?;
    output_result
}

#[cfg(test)]
mod daemon_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            args::TrackerConfig,
            run_tracker,
            storage::time_store::{FileTimeStore, TimeStore},
        },
        utils::{clock::TestClock, logging::TEST_LOGGING, time::local_day},
    };

    const SNAPSHOT: &str = concat!(
        r#"{"kind":"signal","signal":{"type":"snapshot","focusedWindowId":1,"tabs":["#,
        r#"{"id":1,"windowId":1,"url":"https://a.com/x","active":true},"#,
        r#"{"id":2,"windowId":1,"url":"https://b.com/","active":false}]}}"#,
        "\n"
    );
    const ACTIVATE_B: &str =
        "{\"kind\":\"signal\",\"signal\":{\"type\":\"tabActivated\",\"tabId\":2,\"windowId\":1}}\n";
    const GET_STATE: &str = "{\"kind\":\"command\",\"id\":1,\"command\":{\"type\":\"getState\"}}\n";
    const SWITCH: &str =
        "{\"kind\":\"command\",\"id\":2,\"command\":{\"type\":\"switchTo\",\"domain\":\"c.com\"}}\n";

    /// Drives the whole tracker through its host protocol, with time warped by tokio.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = Arc::new(FileTimeStore::new(dir.path().to_owned())?);
        let clock = TestClock::starting_at(Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap());
        let config = TrackerConfig {
            dir: dir.path().to_owned(),
            tick_interval: Duration::from_secs(1),
            flush_on_tick: true,
        };

        let (mut host_in, tracker_in) = duplex(4096);
        let (tracker_out, mut host_out) = duplex(1 << 16);

        let (result, output) = tokio::join!(
            run_tracker(
                &config,
                BufReader::new(tracker_in),
                tracker_out,
                store.clone(),
                CancellationToken::new(),
                clock,
            ),
            async {
                host_in.write_all(SNAPSHOT.as_bytes()).await?;
                tokio::time::sleep(Duration::from_millis(2500)).await;
                host_in.write_all(ACTIVATE_B.as_bytes()).await?;
                tokio::time::sleep(Duration::from_millis(4000)).await;
                host_in.write_all(GET_STATE.as_bytes()).await?;
                host_in.write_all(SWITCH.as_bytes()).await?;
                tokio::time::sleep(Duration::from_millis(1500)).await;
                drop(host_in);

                let mut output = String::new();
                host_out.read_to_string(&mut output).await?;
                anyhow::Ok(output)
            }
        );
        result?;
        let output = output?;

        let messages = output
            .lines()
            .map(serde_json::from_str::<serde_json::Value>)
            .collect::<Result<Vec<_>, _>>()?;
        let responses = messages
            .iter()
            .filter(|v| v["kind"] == "response")
            .collect::<Vec<_>>();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["activeDomain"], "b.com");
        assert_eq!(
            responses[0]["result"]["activeTabDomains"],
            serde_json::json!(["a.com", "b.com"])
        );
        assert_eq!(responses[1]["id"], 2);
        assert!(responses[1].get("error").is_none());
        assert!(messages
            .iter()
            .any(|v| v["kind"] == "focusDomain" && v["domain"] == "c.com"));
        assert!(messages.iter().any(|v| v["kind"] == "timeUpdated"));

        let day = local_day(Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap());
        let a = store.get_record("a.com").await?.unwrap();
        assert_eq!(a.total_time, 2);
        assert_eq!(a.day(day).visits, 1);
        let b = store.get_record("b.com").await?.unwrap();
        assert_eq!(b.total_time, 4);
        let c = store.get_record("c.com").await?.unwrap();
        assert_eq!(c.day(day).visits, 1);
        assert!(c.total_time <= 2);
        for record in [a, b, c] {
            assert!(record.is_consistent());
        }
        Ok(())
    }
}
