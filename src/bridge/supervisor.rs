//! Subprocess supervisor — owns the wrapper child process and its pipes.
//!
//! Lifecycle is a strict state machine: Idle → Starting → Running →
//! Stopping → Idle. At most one wrapper session is live at a time. The
//! supervisor owns the write pipe; inbound traffic flows through one line
//! channel consumed by a single dispatch task, so envelopes are processed
//! strictly in receipt order.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::dispatcher::{CommandSink, Dispatcher};
use super::tools::{DrawPixelTool, ToolRegistry};
use crate::canvas::CanvasGrid;
use crate::config::{BridgeConfig, RESTRICTED_PATH};
use crate::error::BridgeError;
use crate::event::{BridgeEvent, EventBroadcaster};
use crate::protocol::{decode_envelope, encode_command, Command};
use crate::transcript::{ChatTranscript, Role};

/// Wait after spawn before the `create_client` handshake, so the wrapper can
/// finish its own startup.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Wait after the graceful `disconnect` before killing the child.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(300);

/// Capacity of the inbound line channel shared by stdout and stderr.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Bridge lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Starting,
    Running,
    Stopping,
}

// ─── Outbound sink ────────────────────────────────────────────────────────────

/// Writes commands to the child's stdin, one JSON line per command. The
/// mutex makes each command a single uninterleaved write.
struct StdinSink {
    stdin: Mutex<ChildStdin>,
}

#[async_trait]
impl CommandSink for StdinSink {
    async fn send(&self, command: &Command) -> Result<(), BridgeError> {
        let line = encode_command(command)?;
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        trace!(line = %line.trim_end(), "sent command");
        Ok(())
    }
}

// ─── Process handle ───────────────────────────────────────────────────────────

/// Everything owned for one live wrapper session. Dropped (and the child
/// killed) on `stop()`.
struct ProcessHandle {
    child: Child,
    sink: Arc<StdinSink>,
    forwarders: Vec<JoinHandle<()>>,
    dispatch_task: JoinHandle<()>,
}

// ─── Supervisor ───────────────────────────────────────────────────────────────

/// Owns the wrapper process lifecycle, the write pipe, and the read loop.
pub struct WrapperSupervisor {
    config: BridgeConfig,
    transcript: Arc<ChatTranscript>,
    canvas: Arc<CanvasGrid>,
    events: Arc<EventBroadcaster>,
    state: Mutex<BridgeState>,
    process: Mutex<Option<ProcessHandle>>,
}

impl WrapperSupervisor {
    pub fn new(
        config: BridgeConfig,
        transcript: Arc<ChatTranscript>,
        canvas: Arc<CanvasGrid>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            config,
            transcript,
            canvas,
            events,
            state: Mutex::new(BridgeState::Idle),
            process: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> BridgeState {
        *self.state.lock().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == BridgeState::Running
    }

    /// Spawn the wrapper and perform the `create_client` handshake.
    ///
    /// Valid only from Idle. On spawn failure the state returns to Idle and
    /// a system chat entry records the failure text.
    pub async fn start(&self) -> Result<(), BridgeError> {
        {
            let mut state = self.state.lock().await;
            if *state != BridgeState::Idle {
                return Err(BridgeError::AlreadyConnected);
            }
            *state = BridgeState::Starting;
        }

        // The registry lives inside the dispatcher for this session; the
        // definitions are declared to the wrapper in the handshake.
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(DrawPixelTool::new(self.canvas.clone())));
        let tool_defs = tools.definitions();

        if let Err(e) = self.spawn_wrapper(tools).await {
            *self.state.lock().await = BridgeState::Idle;
            self.transcript
                .append(Role::System, format!("Failed to start assistant: {e}"))
                .await;
            return Err(e);
        }

        *self.state.lock().await = BridgeState::Running;
        self.events
            .broadcast(BridgeEvent::ConnectionChanged { connected: true });
        info!(command = %self.config.command, "wrapper started");

        // Let the wrapper finish its own initialization before the handshake.
        tokio::time::sleep(STARTUP_GRACE).await;

        if let Err(e) = self.send(&Command::CreateClient { tools: tool_defs }).await {
            warn!(error = %e, "create_client handshake failed — tearing down");
            self.teardown().await;
            self.transcript
                .append(Role::System, format!("Failed to start assistant: {e}"))
                .await;
            self.events
                .broadcast(BridgeEvent::ConnectionChanged { connected: false });
            return Err(e);
        }

        Ok(())
    }

    /// Graceful-then-forced shutdown. Valid only from Running.
    ///
    /// Sends `disconnect`, waits the grace period, then kills the child
    /// whether or not the graceful path was acknowledged. Always ends Idle
    /// with exactly one system "Disconnected" entry.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        {
            let mut state = self.state.lock().await;
            if *state != BridgeState::Running {
                return Err(BridgeError::NotConnected);
            }
            *state = BridgeState::Stopping;
        }

        if let Some(sink) = self.current_sink().await {
            if let Err(e) = sink.send(&Command::Disconnect).await {
                warn!(error = %e, "graceful disconnect failed — killing anyway");
            }
        }
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        self.teardown().await;
        self.transcript
            .append(Role::System, "Disconnected from assistant")
            .await;
        self.events
            .broadcast(BridgeEvent::ConnectionChanged { connected: false });
        info!("wrapper stopped");
        Ok(())
    }

    /// Append a user entry and send the prompt. Valid only while Running —
    /// from any other state this fails without touching the transcript.
    pub async fn send_query(&self, prompt: &str) -> Result<(), BridgeError> {
        self.ensure_running().await?;
        self.transcript.append(Role::User, prompt).await;
        if let Err(e) = self
            .send(&Command::Query {
                prompt: prompt.to_string(),
            })
            .await
        {
            self.transcript
                .append(Role::System, format!("Error: failed to send query: {e}"))
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// Interrupt the in-flight turn. Valid only while Running.
    pub async fn interrupt(&self) -> Result<(), BridgeError> {
        self.ensure_running().await?;
        self.send(&Command::Interrupt).await
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    async fn ensure_running(&self) -> Result<(), BridgeError> {
        if *self.state.lock().await != BridgeState::Running {
            return Err(BridgeError::NotConnected);
        }
        Ok(())
    }

    async fn current_sink(&self) -> Option<Arc<StdinSink>> {
        self.process.lock().await.as_ref().map(|h| h.sink.clone())
    }

    async fn send(&self, command: &Command) -> Result<(), BridgeError> {
        match self.current_sink().await {
            Some(sink) => sink.send(command).await,
            None => Err(BridgeError::NotConnected),
        }
    }

    /// Spawn the child with a restricted environment and wire up the read
    /// loop: stdout and stderr both forward into one line channel, consumed
    /// sequentially by the dispatch task.
    async fn spawn_wrapper(&self, tools: ToolRegistry) -> Result<(), BridgeError> {
        let mut cmd = TokioCommand::new(&self.config.command);
        cmd.args(&self.config.args)
            .current_dir(&self.config.working_dir)
            .env_clear()
            .env("PATH", RESTRICTED_PATH)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Spawn(format!(
                "failed to spawn '{}' — is it installed? ({e})",
                self.config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Spawn("wrapper stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("wrapper stdout not available".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::Spawn("wrapper stderr not available".into()))?;

        let sink = Arc::new(StdinSink {
            stdin: Mutex::new(stdin),
        });
        let dispatcher = Dispatcher::new(self.transcript.clone(), tools, sink.clone());

        let (line_tx, mut line_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let forwarders = vec![
            tokio::spawn(forward_lines(
                BufReader::new(stdout),
                line_tx.clone(),
                "stdout",
            )),
            tokio::spawn(forward_lines(BufReader::new(stderr), line_tx, "stderr")),
        ];

        // Single consumer: envelopes are handled one at a time, in order.
        // A decode failure skips the line and keeps the loop alive.
        let dispatch_task = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_envelope(&line) {
                    Ok(envelope) => dispatcher.handle(envelope).await,
                    Err(e) => {
                        warn!(error = %e, line = %line, "unparseable wrapper line — skipped")
                    }
                }
            }
            debug!("wrapper stream closed — read loop finished");
        });

        *self.process.lock().await = Some(ProcessHandle {
            child,
            sink,
            forwarders,
            dispatch_task,
        });
        Ok(())
    }

    /// Kill the child, cancel the read loop, release the pipes, go Idle.
    async fn teardown(&self) {
        if let Some(mut handle) = self.process.lock().await.take() {
            if let Err(e) = handle.child.kill().await {
                // Already-exited children are fine.
                debug!(error = %e, "kill on wrapper child");
            }
            for task in handle.forwarders {
                task.abort();
            }
            handle.dispatch_task.abort();
        }
        *self.state.lock().await = BridgeState::Idle;
    }
}

/// Forward lines from one child pipe into the shared inbound channel until
/// EOF (the child exited) or the channel closes.
async fn forward_lines<R>(reader: BufReader<R>, tx: mpsc::Sender<String>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(stream, line = %line, "wrapper line");
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(stream, error = %e, "read error on wrapper pipe");
                break;
            }
        }
    }
    debug!(stream, "pipe forwarder finished");
}

// ─── Tests ────────────────────────────────────────────────────────────────────
