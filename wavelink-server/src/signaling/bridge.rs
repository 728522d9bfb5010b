use crate::signaling::{BridgeConfig, RoomOutput, decode_line};
use async_trait::async_trait;
use serde_json::Value;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use wavelink_core::{RoomEvent, TransportError};

enum Outbound {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Room connection backed by a child process speaking one JSON document per
/// line on stdin/stdout.
///
/// Inbound lines are decoded into `RoomEvent`s; when the process exits the
/// stream ends with a `ProcessExited` fault.
pub struct BridgeTransport {
    output: BridgeOutput,
    kill_tx: Option<oneshot::Sender<()>>,
    config: BridgeConfig,
}

impl BridgeTransport {
    pub fn spawn(config: &BridgeConfig) -> Result<(Self, mpsc::Receiver<RoomEvent>), TransportError> {
        let mut child = Command::new(&config.program)
            .arg(&config.script)
            .arg(&config.room)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::Spawn(format!(
                    "{} {}: {}",
                    config.program,
                    config.script.display(),
                    e
                ))
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Spawn("bridge stdio was not captured".to_owned()));
        };

        info!(
            "Bridge started for room {} (pid {:?})",
            config.room,
            child.id()
        );

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<Option<i32>>();

        let stdout_closed = Arc::new(Notify::new());
        let exit_grace = config.exit_grace;

        // Supervisor: owns the child until it exits or we kill it.
        let supervisor_closed = Arc::clone(&stdout_closed);
        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => exit_code(status),
                _ = kill_rx => kill(&mut child).await,
                _ = supervisor_closed.notified() => {
                    match tokio::time::timeout(exit_grace, child.wait()).await {
                        Ok(status) => exit_code(status),
                        Err(_) => {
                            warn!("Bridge closed stdout but is still running; killing it");
                            kill(&mut child).await
                        }
                    }
                }
            };
            debug!("Bridge process exited with {:?}", code);
            let _ = exit_tx.send(code);
        });

        // Reader: stdout lines become room events.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        for event in decode_line(&line) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = event_tx.send(RoomEvent::TransportFault(e.into())).await;
                        break;
                    }
                }
            }

            // The supervisor answers within the exit grace, killing if needed.
            stdout_closed.notify_one();
            let code = exit_rx.await.unwrap_or(None);
            let _ = event_tx
                .send(RoomEvent::TransportFault(TransportError::ProcessExited { code }))
                .await;
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "wavelink::bridge", "{}", line);
            }
        });

        tokio::spawn(write_loop(stdin, outbound_rx));

        let transport = Self {
            output: BridgeOutput { outbound_tx },
            kill_tx: Some(kill_tx),
            config: config.clone(),
        };
        Ok((transport, event_rx))
    }

    pub fn output(&self) -> Arc<dyn RoomOutput> {
        Arc::new(self.output.clone())
    }

    /// Drains pending outbound lines, bounded by the flush timeout, then
    /// stops the process.
    pub async fn shutdown(mut self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.output.outbound_tx.send(Outbound::Flush(done_tx)).is_ok()
            && tokio::time::timeout(self.config.flush_timeout, done_rx)
                .await
                .is_err()
        {
            warn!(
                "Bridge did not drain within {:?}; dropping pending output",
                self.config.flush_timeout
            );
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        info!("Bridge for room {} stopped", self.config.room);
    }
}

fn exit_code(status: std::io::Result<ExitStatus>) -> Option<i32> {
    match status {
        Ok(status) => status.code(),
        Err(e) => {
            error!("Failed to wait on bridge process: {}", e);
            None
        }
    }
}

async fn kill(child: &mut Child) -> Option<i32> {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill bridge process: {}", e);
    }
    child.wait().await.ok().and_then(|status| status.code())
}

async fn write_loop(mut stdin: ChildStdin, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Line(mut line) => {
                line.push('\n');
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    error!("Failed to write to bridge: {}", e);
                    break;
                }
            }
            Outbound::Flush(done_tx) => {
                let _ = done_tx.send(());
            }
        }
    }
}

/// Write half of a `BridgeTransport`.
#[derive(Clone)]
pub struct BridgeOutput {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl RoomOutput for BridgeOutput {
    async fn send(&self, document: Value) -> Result<(), TransportError> {
        let line = serde_json::to_string(&document).map_err(|e| TransportError::Io(e.to_string()))?;
        self.outbound_tx
            .send(Outbound::Line(line))
            .map_err(|_| TransportError::Closed)
    }
}
