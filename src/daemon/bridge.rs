//! JSON lines protocol between the browser host and the tracker. Every inbound line is either a
//! signal or a command with an id, every outbound line is a response, a state update or a request
//! for the browser.

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser_api::{HostControl, HostSignal};

use super::processing::messages::{Command, Outbound, TrackerMessage};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Inbound {
    Signal { signal: HostSignal },
    Command { id: u64, command: Command },
}

/// Forwards host lines to the tracker until the input ends or shutdown is requested. The end of
/// the input means the browser is gone, so it requests shutdown for everyone else.
pub async fn read_inbound(
    reader: impl AsyncBufRead + Unpin,
    tracker: mpsc::Sender<TrackerMessage>,
    outbound: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = LinesStream::new(reader.lines());
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Stopped reading host input");
                return Ok(());
            }
            line = lines.next() => line,
        };

        let Some(line) = line else {
            info!("Host input closed");
            shutdown.cancel();
            return Ok(());
        };
        let line = line.context("Failed to read host input")?;
        if line.trim().is_empty() {
            continue;
        }

        let inbound = match serde_json::from_str::<Inbound>(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping malformed host line {line:?}: {e}");
                continue;
            }
        };

        match inbound {
            Inbound::Signal { signal } => tracker
                .send(TrackerMessage::Signal(signal))
                .await
                .map_err(|_| anyhow!("Tracker stopped accepting signals"))?,
            Inbound::Command { id, command } => {
                let (respond_to, reply) = oneshot::channel();
                tracker
                    .send(TrackerMessage::Command {
                        command,
                        respond_to,
                    })
                    .await
                    .map_err(|_| anyhow!("Tracker stopped accepting commands"))?;

                let response = match reply.await {
                    Ok(Ok(result)) => Outbound::Response {
                        id,
                        result: Some(result),
                        error: None,
                    },
                    Ok(Err(e)) => Outbound::Response {
                        id,
                        result: None,
                        error: Some(format!("{e:#}")),
                    },
                    Err(_) => return Err(anyhow!("Tracker dropped command {id}")),
                };
                outbound
                    .send(response)
                    .await
                    .map_err(|_| anyhow!("Host output is closed"))?;
            }
        }
    }
}

/// Writes every outbound message as a line until all senders are gone.
pub async fn write_outbound(
    mut writer: impl AsyncWrite + Unpin,
    mut receiver: mpsc::Receiver<Outbound>,
) -> Result<()> {
    while let Some(message) = receiver.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    debug!("Host output finished");
    Ok(())
}

/// [HostControl] that forwards requests to the host as outbound lines.
pub struct OutboundHostControl {
    outbound: mpsc::Sender<Outbound>,
}

impl OutboundHostControl {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self { outbound }
    }
}

impl HostControl for OutboundHostControl {
    fn focus_domain(&mut self, domain: &str) -> Result<()> {
        self.outbound
            .try_send(Outbound::FocusDomain {
                domain: domain.to_owned(),
            })
            .map_err(|e| anyhow!("Failed to ask the host to focus {domain}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        browser_api::HostSignal,
        daemon::processing::messages::{Command, CommandReply, Outbound, TrackerMessage},
    };

    use super::{read_inbound, write_outbound};

    #[tokio::test]
    async fn test_reader_forwards_signals_and_answers_commands() -> Result<()> {
        let input = concat!(
            "{\"kind\":\"signal\",\"signal\":{\"type\":\"tabRemoved\",\"tabId\":4}}\n",
            "not json\n",
            "\n",
            "{\"kind\":\"command\",\"id\":7,\"command\":{\"type\":\"clearAll\"}}\n",
        );
        let (sender, mut receiver) = mpsc::channel(4);
        let (outbound, mut responses) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let (result, _) = tokio::join!(
            read_inbound(input.as_bytes(), sender, outbound, shutdown.clone()),
            async {
                let Some(TrackerMessage::Signal(signal)) = receiver.recv().await else {
                    panic!("expected a signal");
                };
                assert_eq!(signal, HostSignal::TabRemoved { tab_id: 4 });

                let Some(TrackerMessage::Command {
                    command,
                    respond_to,
                }) = receiver.recv().await
                else {
                    panic!("expected a command");
                };
                assert_eq!(command, Command::ClearAll);
                respond_to.send(Ok(CommandReply::Done)).unwrap();
            }
        );
        result?;

        assert_eq!(
            responses.recv().await,
            Some(Outbound::Response {
                id: 7,
                result: Some(CommandReply::Done),
                error: None
            })
        );
        // End of input stops everything else.
        assert!(shutdown.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_command_reports_error() -> Result<()> {
        let input = "{\"kind\":\"command\",\"id\":1,\"command\":{\"type\":\"storageDetails\"}}\n";
        let (sender, mut receiver) = mpsc::channel(4);
        let (outbound, mut responses) = mpsc::channel(4);

        let (result, _) = tokio::join!(
            read_inbound(input.as_bytes(), sender, outbound, CancellationToken::new()),
            async {
                if let Some(TrackerMessage::Command { respond_to, .. }) = receiver.recv().await {
                    respond_to
                        .send(Err(anyhow::anyhow!("disk is gone")))
                        .unwrap();
                }
            }
        );
        result?;

        let Some(Outbound::Response { id, result, error }) = responses.recv().await else {
            panic!("expected a response");
        };
        assert_eq!(id, 1);
        assert_eq!(result, None);
        assert_eq!(error.as_deref(), Some("disk is gone"));
        Ok(())
    }

    #[tokio::test]
    async fn test_writer_emits_json_lines() -> Result<()> {
        let (outbound, receiver) = mpsc::channel(4);
        outbound
            .send(Outbound::FocusDomain {
                domain: "a.com".into(),
            })
            .await?;
        outbound
            .send(Outbound::Response {
                id: 2,
                result: Some(CommandReply::Done),
                error: None,
            })
            .await?;
        drop(outbound);

        let mut written = Vec::new();
        write_outbound(&mut written, receiver).await?;

        let text = String::from_utf8(written)?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], r#"{"kind":"focusDomain","domain":"a.com"}"#);
        assert_eq!(lines[1], r#"{"kind":"response","id":2,"result":null}"#);
        Ok(())
    }
}
