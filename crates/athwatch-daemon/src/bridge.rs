//! JSON-lines bridge to an external chat relay.
//!
//! The relay writes one JSON object per line to our stdin and reads our
//! sends from stdout:
//!
//! ```text
//! <- {"type":"message","sender":"@AthProbeBot","text":"..."}
//! <- {"type":"command","command":"pause"}
//! -> {"type":"send","peer":"@AthProbeBot","text":"..."}
//! ```

use async_trait::async_trait;
use athwatch_engine::{ControlSignals, InboundMessage, Transport};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::DaemonError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeInput {
    Message { sender: String, text: String },
    Command { command: AdminCommand },
}

/// Operator commands relayed from the admin chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminCommand {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeOutput<'a> {
    Send { peer: &'a str, text: &'a str },
}

pub fn parse_line(line: &str) -> Result<BridgeInput, DaemonError> {
    Ok(serde_json::from_str(line)?)
}

/// Outbound half: each send becomes one line on the writer. Once a write
/// fails the writer is dropped and every later send reports failure.
pub struct BridgeTransport<W> {
    out: Mutex<Option<W>>,
}

impl<W> BridgeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(Some(out)),
        }
    }
}

#[async_trait]
impl<W> Transport for BridgeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, peer: &str, text: &str) -> bool {
        let mut line = match serde_json::to_string(&BridgeOutput::Send { peer, text }) {
            Ok(line) => line,
            Err(e) => {
                warn!(%peer, error = %e, "Failed to encode outbound message");
                return false;
            }
        };
        line.push('\n');

        let mut guard = self.out.lock().await;
        let Some(out) = guard.as_mut() else {
            return false;
        };
        let written = async {
            out.write_all(line.as_bytes()).await?;
            out.flush().await
        }
        .await;

        match written {
            Ok(()) => true,
            Err(e) => {
                warn!(%peer, error = %e, "Bridge output closed");
                *guard = None;
                false
            }
        }
    }
}

/// Inbound half: read lines until EOF or shutdown, forwarding chat messages
/// to `inbound` and applying admin commands to `signals`.
///
/// EOF means the relay went away; nothing more can arrive, so shutdown is
/// requested. Lines that are not UTF-8 or not valid JSON are skipped.
pub async fn read_bridge<R>(reader: R, inbound: mpsc::Sender<InboundMessage>, signals: ControlSignals)
where
    R: AsyncBufRead + Unpin,
{
    let cancel = signals.shutdown_token();
    let mut lines = reader.split(b'\n');

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bridge reader shutting down");
                break;
            }
            line = lines.next_segment() => line,
        };

        let bytes = match line {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("Bridge input closed");
                signals.shutdown();
                break;
            }
            Err(e) => {
                warn!(error = %e, "Bridge input failed");
                signals.shutdown();
                break;
            }
        };
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Skipping bridge line that is not UTF-8");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(BridgeInput::Message { sender, text }) => {
                if inbound.send(InboundMessage { sender, text }).await.is_err() {
                    debug!("Inbound router gone, bridge reader exiting");
                    break;
                }
            }
            Ok(BridgeInput::Command { command }) => apply_command(command, &signals),
            Err(e) => warn!(error = %e, "Unreadable bridge line skipped"),
        }
    }
}

fn apply_command(command: AdminCommand, signals: &ControlSignals) {
    info!(?command, "Admin command");
    match command {
        AdminCommand::Pause => {
            if !signals.pause("admin command") {
                info!("Already paused");
            }
        }
        AdminCommand::Resume => {
            if !signals.resume() {
                info!("Not paused");
            }
        }
        AdminCommand::Stop => signals.shutdown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athwatch_engine::EventBus;
    use tokio::io::BufReader;

    #[test]
    fn parses_messages_and_commands() {
        assert_eq!(
            parse_line(r#"{"type":"message","sender":"@AthProbeBot","text":"hi"}"#).unwrap(),
            BridgeInput::Message {
                sender: "@AthProbeBot".to_string(),
                text: "hi".to_string()
            }
        );
        assert_eq!(
            parse_line(r#"{"type":"command","command":"resume"}"#).unwrap(),
            BridgeInput::Command {
                command: AdminCommand::Resume
            }
        );
        assert!(parse_line(r#"{"type":"command","command":"reboot"}"#).is_err());
    }

    #[tokio::test]
    async fn sends_are_json_lines() {
        let transport = BridgeTransport::new(Vec::new());
        assert!(transport.send("@FastBuyBot", "abc").await);
        assert!(transport.send("@BulkBuyBot", "line\nbreak").await);

        let out = transport.out.lock().await.take().unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"type":"send","peer":"@FastBuyBot","text":"abc"}"#
        );
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["text"], "line\nbreak");
    }

    #[tokio::test]
    async fn reader_forwards_and_applies_commands() {
        let input = concat!(
            "{\"type\":\"command\",\"command\":\"pause\"}\n",
            "\n",
            "garbage\n",
            "{\"type\":\"message\",\"sender\":\"@x\",\"text\":\"hello\"}\n",
        );
        let signals = ControlSignals::new(EventBus::default());
        let (tx, mut rx) = mpsc::channel(4);

        read_bridge(BufReader::new(input.as_bytes()), tx, signals.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), InboundMessage::new("@x", "hello"));
        // EOF stopped the pipeline, which also lifts the pause.
        assert!(signals.is_shutdown());
        assert!(!signals.is_paused());
    }

    #[tokio::test]
    async fn stop_command_shuts_down() {
        let input = "{\"type\":\"command\",\"command\":\"stop\"}\n";
        let signals = ControlSignals::new(EventBus::default());
        let (tx, _rx) = mpsc::channel(4);
        read_bridge(BufReader::new(input.as_bytes()), tx, signals.clone()).await;
        assert!(signals.is_shutdown());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let mut input: Vec<u8> = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(b"{\"type\":\"message\",\"sender\":\"@x\",\"text\":\"after\"}\n");
        let signals = ControlSignals::new(EventBus::default());
        let (tx, mut rx) = mpsc::channel(4);

        read_bridge(BufReader::new(input.as_slice()), tx, signals.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), InboundMessage::new("@x", "after"));
        assert!(rx.recv().await.is_none());
    }
}
