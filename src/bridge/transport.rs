//! Transports carrying envelopes to the remote runtime.

use super::{BridgeError, BridgeRequest};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Moves one request envelope to the remote side and returns the raw response line.
///
/// Transports do not validate the response; the bridge does.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &'static str;

    /// Whether a remote runtime exists at all. When false the bridge serves
    /// fallbacks directly and never touches breakers.
    fn is_connected(&self) -> bool {
        true
    }

    /// Sends a request and returns the raw response line.
    async fn send(&self, request: &BridgeRequest) -> Result<String, BridgeError>;
}

/// Transport used when no remote runtime is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedTransport;

#[async_trait]
impl BridgeTransport for DisconnectedTransport {
    fn name(&self) -> &'static str {
        "disconnected"
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn send(&self, request: &BridgeRequest) -> Result<String, BridgeError> {
        Err(BridgeError::Disconnected {
            component: request.component.clone(),
        })
    }
}

struct ChildIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Set while an exchange is in flight. Still set on the next send means
    /// the previous exchange was dropped mid-read and the pipe is dirty.
    in_flight: bool,
}

impl ChildIo {
    fn kill(mut self, reason: &'static str) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, reason, "bridge subprocess already gone");
        } else {
            tracing::debug!(reason, "bridge subprocess killed");
        }
    }
}

/// Line-delimited JSON over a child process's stdin/stdout.
///
/// The child is spawned on first use. It is killed and respawned after a
/// failed, timed-out or abandoned exchange, so every request starts on a
/// clean pipe. Response lines whose `request_id` belongs to another request
/// are skipped.
pub struct SubprocessTransport {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    io: Mutex<Option<ChildIo>>,
}

impl std::fmt::Debug for SubprocessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessTransport")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SubprocessTransport {
    /// Creates a transport from `program arg...`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] for an empty command.
    pub fn new(command: &[String]) -> crate::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| crate::Error::InvalidConfig("bridge.command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: None,
            io: Mutex::new(None),
        })
    }

    /// Bounds each exchange. On expiry the child is killed.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn spawn(&self, component: &str) -> Result<ChildIo, BridgeError> {
        tracing::info!(program = %self.program, "starting bridge subprocess");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| execution(component, "spawn", &e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| execution(component, "spawn", &"child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| execution(component, "spawn", &"child stdout unavailable"))?;

        Ok(ChildIo {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            in_flight: false,
        })
    }

    async fn exchange(io: &mut ChildIo, request: &BridgeRequest) -> Result<String, BridgeError> {
        let mut line = request.to_line()?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| execution(&request.component, &request.method, &e))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| execution(&request.component, &request.method, &e))?;

        loop {
            let mut response = String::new();
            let read = io
                .stdout
                .read_line(&mut response)
                .await
                .map_err(|e| execution(&request.component, &request.method, &e))?;
            if read == 0 {
                return Err(execution(
                    &request.component,
                    &request.method,
                    &"bridge subprocess closed stdout",
                ));
            }
            if response.trim().is_empty() {
                continue;
            }
            if belongs_to_other_request(&response, &request.request_id) {
                tracing::debug!("discarding response for an abandoned request");
                continue;
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl BridgeTransport for SubprocessTransport {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn send(&self, request: &BridgeRequest) -> Result<String, BridgeError> {
        let mut guard = self.io.lock().await;
        if guard.as_ref().is_some_and(|io| io.in_flight) {
            if let Some(dirty) = guard.take() {
                dirty.kill("previous exchange abandoned");
            }
        }
        if guard.is_none() {
            *guard = Some(self.spawn(&request.component)?);
        }
        let Some(io) = guard.as_mut() else {
            return Err(execution(
                &request.component,
                &request.method,
                &"bridge subprocess unavailable",
            ));
        };

        io.in_flight = true;
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, Self::exchange(io, request))
                .await
                .unwrap_or_else(|_| {
                    Err(BridgeError::Timeout {
                        component: request.component.clone(),
                        method: request.method.clone(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
            None => Self::exchange(io, request).await,
        };
        io.in_flight = false;

        if let Err(e) = &result {
            if let Some(dead) = guard.take() {
                dead.kill(if matches!(e, BridgeError::Timeout { .. }) {
                    "exchange timed out"
                } else {
                    "exchange failed"
                });
            }
        }
        result
    }
}

fn belongs_to_other_request(line: &str, request_id: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| {
            value
                .get("request_id")
                .and_then(|id| id.as_str().map(|id| id != request_id))
        })
        .unwrap_or(false)
}

fn execution(component: &str, method: &str, cause: &dyn std::fmt::Display) -> BridgeError {
    BridgeError::Execution {
        component: component.to_string(),
        method: method.to_string(),
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_disconnected_transport() {
        let transport = DisconnectedTransport;
        assert!(!transport.is_connected());
        let request = BridgeRequest::new("embedding", "embed", vec![json!("x")]);
        assert!(matches!(
            transport.send(&request).await,
            Err(BridgeError::Disconnected { .. })
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(SubprocessTransport::new(&[]).is_err());
    }

    #[test]
    fn test_stale_line_detection() {
        assert!(belongs_to_other_request(r#"{"request_id":"old"}"#, "new"));
        assert!(!belongs_to_other_request(r#"{"request_id":"new"}"#, "new"));
        assert!(!belongs_to_other_request(r#"{"success":true}"#, "new"));
        assert!(!belongs_to_other_request("garbage", "new"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_echo_round_trip() {
        // `cat` echoes the request line back, which is not a valid response
        // envelope but proves the line transport works end to end.
        let transport = SubprocessTransport::new(&["cat".to_string()]).unwrap();
        let request = BridgeRequest::new("embedding", "embed", vec![json!("x")]);
        let line = transport.send(&request).await.unwrap();
        let echoed: BridgeRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(echoed, request);
    }

    /// Echoes each line, stalling on lines that mention "slow".
    #[cfg(unix)]
    fn stalling_echo() -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"while IFS= read -r line; do case "$line" in *slow*) sleep 2;; esac; printf '%s\n' "$line"; done"#
                .to_string(),
        ]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_restarts_child_on_clean_pipe() {
        let transport = SubprocessTransport::new(&stalling_echo())
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let slow = BridgeRequest::new("summarizer", "summarize", vec![json!("slow")]);
        assert!(matches!(
            transport.send(&slow).await,
            Err(BridgeError::Timeout { timeout_ms: 100, .. })
        ));

        let started = std::time::Instant::now();
        let fast = BridgeRequest::new("summarizer", "summarize", vec![json!("fast")]);
        let line = transport.send(&fast).await.unwrap();
        let echoed: BridgeRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(echoed, fast);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_exchange_restarts_child() {
        let transport = SubprocessTransport::new(&stalling_echo()).unwrap();
        let slow = BridgeRequest::new("summarizer", "summarize", vec![json!("slow")]);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), transport.send(&slow)).await;
        assert!(abandoned.is_err());

        let started = std::time::Instant::now();
        let fast = BridgeRequest::new("summarizer", "summarize", vec![json!("fast")]);
        let line = transport.send(&fast).await.unwrap();
        let echoed: BridgeRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(echoed, fast);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
