//! Managed connection to one tool-server subprocess.
//!
//! Subprocess tool servers are unreliable collaborators: slow to start,
//! prone to hung responses. Failure is therefore isolated at the call
//! level: a timed-out call yields a degraded result and recycles the
//! process, it never aborts the connection's run.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use crate::capability::CapabilitySet;
use crate::error::{DealdeskError, DealdeskResult};
use crate::tools::protocol::{ServerEvent, ToolCall, ToolRequest, ToolResponse, ToolResult};

/// Lifecycle state of a tool connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Starting,
    Ready,
    Busy,
    Closing,
    Closed,
}

/// A channel to one spawned tool-server process.
///
/// Calls are serialized: one outstanding invoke at a time, enforced by the
/// `&mut self` receiver. Connections for different capability sets are
/// independent and may run concurrently.
#[derive(Debug)]
pub struct ToolConnection {
    set: CapabilitySet,
    connect_timeout: Duration,
    shutdown_grace: Duration,
    state: ConnectionState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    next_call_id: u64,
    invocations: u64,
}

impl ToolConnection {
    /// Spawn the backing process for a capability set and wait for its
    /// ready banner.
    pub async fn open(
        set: &CapabilitySet,
        connect_timeout: Duration,
        shutdown_grace: Duration,
    ) -> DealdeskResult<Self> {
        let mut connection = Self {
            set: set.clone(),
            connect_timeout,
            shutdown_grace,
            state: ConnectionState::Closed,
            child: None,
            stdin: None,
            stdout: None,
            next_call_id: 1,
            invocations: 0,
        };
        connection.spawn_and_handshake().await?;
        Ok(connection)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Capability set this connection serves.
    pub fn capability_name(&self) -> &str {
        &self.set.name
    }

    /// Number of invokes issued over this connection's lifetime, across
    /// recycles.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    async fn spawn_and_handshake(&mut self) -> DealdeskResult<()> {
        self.state = ConnectionState::Starting;

        let command_path = self.set.resolved_command();
        log::info!(
            "[ToolConnection {}] Spawning {:?} {:?}",
            self.set.name,
            command_path,
            self.set.args
        );

        let mut command = Command::new(&command_path);
        command
            .args(&self.set.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.set.working_dir {
            if dir.exists() {
                command.current_dir(dir);
            } else {
                log::warn!(
                    "[ToolConnection {}] working dir {} missing, using current",
                    self.set.name,
                    dir.display()
                );
            }
        }

        let mut child = command.spawn().map_err(|e| {
            self.state = ConnectionState::Closed;
            DealdeskError::ConnectionStart {
                capability: self.set.name.clone(),
                reason: format!("spawn failed: {}", e),
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| DealdeskError::ConnectionStart {
            capability: self.set.name.clone(),
            reason: "child stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DealdeskError::ConnectionStart {
            capability: self.set.name.clone(),
            reason: "child stdout unavailable".to_string(),
        })?;

        // Drain stderr in the background so the child never blocks on it.
        if let Some(stderr) = child.stderr.take() {
            let name = self.set.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[ToolServer {}] {}", name, line);
                }
            });
        }

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout).lines());

        match timeout(self.connect_timeout, self.await_ready_banner()).await {
            Ok(Ok(())) => {
                self.state = ConnectionState::Ready;
                log::info!("[ToolConnection {}] Ready", self.set.name);
                Ok(())
            }
            Ok(Err(reason)) => {
                self.teardown_process().await;
                self.state = ConnectionState::Closed;
                Err(DealdeskError::ConnectionStart {
                    capability: self.set.name.clone(),
                    reason,
                })
            }
            Err(_) => {
                self.teardown_process().await;
                self.state = ConnectionState::Closed;
                Err(DealdeskError::ConnectionStart {
                    capability: self.set.name.clone(),
                    reason: format!(
                        "handshake not completed within {:?}",
                        self.connect_timeout
                    ),
                })
            }
        }
    }

    /// Read lines until the ready banner arrives. Non-banner noise (startup
    /// logs, npm output) is skipped.
    async fn await_ready_banner(&mut self) -> Result<(), String> {
        let lines = match self.stdout.as_mut() {
            Some(lines) => lines,
            None => return Err("stdout stream missing".to_string()),
        };
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Ok(event) = serde_json::from_str::<ServerEvent>(&line) {
                        if event.is_ready() {
                            return Ok(());
                        }
                    }
                    log::debug!("[ToolConnection] skipping startup output: {}", line);
                }
                Ok(None) => return Err("process exited before handshake".to_string()),
                Err(e) => return Err(format!("handshake read failed: {}", e)),
            }
        }
    }

    /// Issue one tool call and wait for its result.
    ///
    /// Always returns a `ToolResult` for protocol-level failures: a timeout
    /// yields a `Timeout` result and recycles the backing process; a
    /// malformed response yields an `Error` result and leaves the
    /// connection usable. Only a failed respawn surfaces as an error.
    pub async fn invoke(&mut self, call: ToolCall) -> DealdeskResult<ToolResult> {
        // A previous timeout left the process recycled; respawn lazily.
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Closed) {
            log::info!(
                "[ToolConnection {}] Respawning recycled tool server",
                self.set.name
            );
            self.spawn_and_handshake().await?;
        }

        self.invocations += 1;
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        self.state = ConnectionState::Busy;

        let request = ToolRequest {
            id: call_id,
            tool: &call.tool_name,
            arguments: &call.arguments,
        };
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                self.state = ConnectionState::Ready;
                return Ok(ToolResult::error(
                    call,
                    format!("failed to serialize request: {}", e),
                ));
            }
        };

        if let Some(stdin) = self.stdin.as_mut() {
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                log::warn!(
                    "[ToolConnection {}] write failed, recycling: {}",
                    self.set.name,
                    e
                );
                self.recycle().await;
                return Ok(ToolResult::error(call, format!("request write failed: {}", e)));
            }
            if let Err(e) = stdin.flush().await {
                self.recycle().await;
                return Ok(ToolResult::error(call, format!("request flush failed: {}", e)));
            }
        } else {
            self.recycle().await;
            return Ok(ToolResult::error(call, "stdin unavailable".to_string()));
        }

        let call_timeout = Duration::from_secs(self.set.call_timeout_secs);
        match timeout(call_timeout, self.read_matching_response(call_id)).await {
            Ok(ResponseRead::Response(response)) => {
                self.state = ConnectionState::Ready;
                if response.is_ok() {
                    Ok(ToolResult::ok(call, response.payload))
                } else {
                    Ok(ToolResult::error(call, ResponseRead::diagnostic(&response)))
                }
            }
            Ok(ResponseRead::Malformed(diagnostic)) => {
                // The stream is still line-aligned, so the connection
                // remains usable.
                self.state = ConnectionState::Ready;
                Ok(ToolResult::error(call, diagnostic))
            }
            Ok(ResponseRead::StreamClosed) => {
                log::warn!(
                    "[ToolConnection {}] tool server closed its stream mid-call",
                    self.set.name
                );
                self.recycle().await;
                Ok(ToolResult::error(
                    call,
                    "tool server closed the stream before responding".to_string(),
                ))
            }
            Err(_) => {
                let diagnostic = DealdeskError::CallTimeout {
                    tool: call.tool_name.clone(),
                    timeout_secs: self.set.call_timeout_secs,
                }
                .to_string();
                log::warn!("[ToolConnection {}] {}", self.set.name, diagnostic);
                // The pending call is invalidated, not the run: recycle the
                // process so the next call starts clean.
                self.recycle().await;
                Ok(ToolResult::timeout(call, diagnostic))
            }
        }
    }

    async fn read_matching_response(&mut self, call_id: u64) -> ResponseRead {
        let lines = match self.stdout.as_mut() {
            Some(lines) => lines,
            None => return ResponseRead::StreamClosed,
        };
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<ToolResponse>(&line) {
                    Ok(response) if response.id == call_id => {
                        return ResponseRead::Response(response)
                    }
                    Ok(stale) => {
                        // Response to an already-invalidated call; skip it.
                        log::debug!(
                            "[ToolConnection {}] discarding stale response id={}",
                            self.set.name,
                            stale.id
                        );
                    }
                    Err(e) => {
                        return ResponseRead::Malformed(format!(
                            "malformed response line ({}): {}",
                            e,
                            truncate(&line, 200)
                        ))
                    }
                },
                Ok(None) => return ResponseRead::StreamClosed,
                Err(e) => return ResponseRead::Malformed(format!("response read failed: {}", e)),
            }
        }
    }

    /// Mark the connection closing and tear the process down so the next
    /// invoke respawns it.
    async fn recycle(&mut self) {
        self.state = ConnectionState::Closing;
        self.teardown_process().await;
        self.state = ConnectionState::Closed;
    }

    /// Request graceful shutdown, escalating to a kill after the grace
    /// period. Idempotent: closing a closed connection is a no-op.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closing;
        self.teardown_process().await;
        self.state = ConnectionState::Closed;
        log::info!("[ToolConnection {}] Closed", self.set.name);
    }

    async fn teardown_process(&mut self) {
        // Dropping stdin signals EOF, the conventional shutdown request for
        // line-oriented servers.
        self.stdin = None;
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            match timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!(
                        "[ToolConnection {}] tool server exited: {}",
                        self.set.name,
                        status
                    );
                }
                Ok(Err(e)) => {
                    log::warn!(
                        "[ToolConnection {}] wait failed: {}, killing",
                        self.set.name,
                        e
                    );
                    let _ = child.start_kill();
                }
                Err(_) => {
                    log::warn!(
                        "[ToolConnection {}] no exit within {:?}, killing",
                        self.set.name,
                        self.shutdown_grace
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
    }
}

enum ResponseRead {
    Response(ToolResponse),
    Malformed(String),
    StreamClosed,
}

impl ResponseRead {
    fn diagnostic(response: &ToolResponse) -> String {
        match &response.payload {
            serde_json::Value::Null => "tool reported an error with no payload".to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
