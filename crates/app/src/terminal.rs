//! Terminal broker: session registry and client <-> exec bridging.
//!
//! Each attached session runs two unidirectional pump tasks (client -> exec,
//! exec -> client) sharing one cancellation token; closing either side
//! cancels the other. The registry owns only session records, looked up by
//! id; the pumps own the channels.

use crate::deployments::{DeploymentDeps, primary_pod};
use benchkube_domain::terminal::SHELL_CANDIDATES;
use benchkube_domain::{DeploymentId, SessionId, TerminalSession};
use benchkube_ports::{ClusterGateway, ExecChannel, ExecRequest, TerminalDimensions};
use benchkube_shared::{
    CancellationToken, Clock, ErrorEnvelope, RequestContext, Result, new_session_id,
};
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Input messages from the client side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    /// Raw input bytes.
    Data(Bytes),
    /// Terminal resize.
    Resize {
        /// Rows.
        rows: u16,
        /// Columns.
        cols: u16,
    },
    /// Signal by name (`SIGINT`, `SIGQUIT`); delivered as the control byte.
    Signal(Box<str>),
}

/// Output messages to the client side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutput {
    /// Raw output bytes.
    Data(Bytes),
    /// Non-fatal error report.
    Error(Box<str>),
    /// The channel closed.
    Closed(Box<str>),
}

/// A live attachment: the channel pair the transport layer pumps.
#[derive(Debug)]
pub struct AttachedTerminal {
    /// Session id.
    pub session_id: SessionId,
    /// Send side for client input.
    pub input: mpsc::Sender<TerminalInput>,
    /// Receive side for shell output.
    pub output: mpsc::Receiver<TerminalOutput>,
}

struct SessionEntry {
    session: TerminalSession,
    attached: bool,
    cancel: CancellationToken,
}

/// Session registry and exec bridge.
pub struct TerminalBroker {
    sessions: Mutex<BTreeMap<Box<str>, SessionEntry>>,
    gateway: Arc<dyn ClusterGateway>,
    deploy: DeploymentDeps,
    clock: Arc<dyn Clock>,
    idle_timeout_ms: u64,
}

impl TerminalBroker {
    /// Create a broker.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        deploy: DeploymentDeps,
        clock: Arc<dyn Clock>,
        idle_timeout_ms: u64,
    ) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            gateway,
            deploy,
            clock,
            idle_timeout_ms,
        }
    }

    /// Create a session against a deployment's primary pod.
    ///
    /// Multiple independent sessions per deployment are permitted.
    pub async fn create_session(
        &self,
        ctx: &RequestContext,
        deployment_id: &DeploymentId,
        container: Option<Box<str>>,
        shell: Option<Box<str>>,
    ) -> Result<TerminalSession> {
        let record = self.deploy.store.get(ctx, deployment_id).await?;
        let pod = primary_pod(ctx, &self.deploy, &record).await?;
        let now = self.clock.now_ms();

        let session = TerminalSession {
            session_id: SessionId::parse(new_session_id())?,
            deployment_id: deployment_id.clone(),
            pod_name: pod.name,
            container_name: container.unwrap_or_else(|| "".into()),
            shell: shell.unwrap_or_else(|| SHELL_CANDIDATES[0].into()),
            created_at_ms: now,
            last_activity_at_ms: now,
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            session.session_id.as_str().into(),
            SessionEntry {
                session: session.clone(),
                attached: false,
                cancel: CancellationToken::new(),
            },
        );
        info!(session = %session.session_id, deployment = %deployment_id, "terminal.created");
        Ok(session)
    }

    /// Attach the (single) client to a session and start the pumps.
    ///
    /// A second connection to the same session id is refused with `conflict`.
    pub async fn attach(
        &self,
        ctx: &RequestContext,
        session_id: &SessionId,
    ) -> Result<AttachedTerminal> {
        let (session, cancel) = {
            let mut sessions = self.sessions.lock().await;
            let entry = sessions
                .get_mut(session_id.as_str())
                .ok_or_else(|| ErrorEnvelope::not_found("no such terminal session"))?;
            if entry.attached {
                return Err(ErrorEnvelope::conflict(
                    "a client is already attached to this session",
                ));
            }
            entry.attached = true;
            (entry.session.clone(), entry.cancel.clone())
        };

        let exec = self.open_exec(ctx, &session).await;
        let exec = match exec {
            Ok(exec) => exec,
            Err(error) => {
                self.remove(session_id, "exec open failed").await;
                return Err(error);
            },
        };

        let (input_tx, input_rx) = mpsc::channel::<TerminalInput>(64);
        let (output_tx, output_rx) = mpsc::channel::<TerminalOutput>(64);

        spawn_pumps(
            session_id.clone(),
            exec,
            input_rx,
            output_tx,
            cancel,
            Arc::clone(&self.clock),
        );

        Ok(AttachedTerminal {
            session_id: session_id.clone(),
            input: input_tx,
            output: output_rx,
        })
    }

    async fn open_exec(
        &self,
        ctx: &RequestContext,
        session: &TerminalSession,
    ) -> Result<ExecChannel> {
        let namespace = self
            .deploy
            .store
            .get(ctx, &session.deployment_id)
            .await?
            .namespace;
        let container = (!session.container_name.is_empty())
            .then(|| session.container_name.clone());

        // Requested shell first, then the fallback chain.
        let mut shells: Vec<Box<str>> = vec![session.shell.clone()];
        for candidate in SHELL_CANDIDATES {
            if candidate != session.shell.as_ref() {
                shells.push(candidate.into());
            }
        }

        let mut last_error = ErrorEnvelope::upstream("no shell could be started");
        for shell in shells {
            let request = ExecRequest {
                namespace: namespace.clone(),
                pod: session.pod_name.clone(),
                container: container.clone(),
                command: vec![shell.clone()],
                tty: true,
            };
            match self.gateway.exec(ctx, request).await {
                Ok(channel) => return Ok(channel),
                Err(error) => {
                    debug!(session = %session.session_id, shell = %shell, error = %error, "terminal.shell failed");
                    last_error = error;
                },
            }
        }
        Err(last_error)
    }

    /// Touch a session's activity clock.
    pub async fn touch(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(session_id.as_str()) {
            entry.session.last_activity_at_ms = self.clock.now_ms();
        }
    }

    /// Close and remove a session.
    pub async fn remove(&self, session_id: &SessionId, reason: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.remove(session_id.as_str()) {
            entry.cancel.cancel();
            info!(session = %session_id, reason, "terminal.closed");
        }
    }

    /// Close sessions idle past the timeout; returns how many were reaped.
    pub async fn reap_idle(&self) -> usize {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock().await;
        let idle: Vec<Box<str>> = sessions
            .iter()
            .filter(|(_, entry)| entry.session.is_idle_at(now, self.idle_timeout_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            if let Some(entry) = sessions.remove(id.as_ref()) {
                entry.cancel.cancel();
                info!(session = %id, "terminal.idle_reaped");
            }
        }
        idle.len()
    }

    /// Close every session (process shutdown).
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (id, entry) in std::mem::take(&mut *sessions) {
            entry.cancel.cancel();
            info!(session = %id, reason = "server shutdown", "terminal.closed");
        }
    }

    /// Current session count (diagnostics).
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn spawn_pumps(
    session_id: SessionId,
    exec: ExecChannel,
    mut input_rx: mpsc::Receiver<TerminalInput>,
    output_tx: mpsc::Sender<TerminalOutput>,
    cancel: CancellationToken,
    _clock: Arc<dyn Clock>,
) {
    let ExecChannel {
        mut input,
        mut output,
        resize,
    } = exec;

    // Client -> exec pump.
    let in_cancel = cancel.clone();
    let in_session = session_id.clone();
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                () = in_cancel.cancelled() => break,
                message = input_rx.recv() => message,
            };
            let Some(message) = message else { break };
            let write = match message {
                TerminalInput::Data(bytes) => input.write_all(&bytes).await,
                TerminalInput::Signal(name) => {
                    let byte = signal_byte(&name);
                    input.write_all(&[byte]).await
                },
                TerminalInput::Resize { rows, cols } => {
                    if resize
                        .send(TerminalDimensions { rows, cols })
                        .await
                        .is_err()
                    {
                        debug!(session = %in_session, "terminal.resize channel closed");
                    }
                    Ok(())
                },
            };
            if let Err(error) = write {
                warn!(session = %in_session, error = %error, "terminal.input write failed");
                break;
            }
        }
        // Close of this side cancels the other pump.
        in_cancel.cancel();
    });

    // Exec -> client pump.
    let out_cancel = cancel;
    let out_session = session_id;
    tokio::spawn(async move {
        loop {
            let chunk = tokio::select! {
                () = out_cancel.cancelled() => {
                    let _ = output_tx
                        .send(TerminalOutput::Closed("session closed".into()))
                        .await;
                    return;
                },
                chunk = output.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    if output_tx.send(TerminalOutput::Data(bytes)).await.is_err() {
                        break;
                    }
                },
                Some(Err(error)) => {
                    let _ = output_tx
                        .send(TerminalOutput::Error(
                            error.to_string().into_boxed_str(),
                        ))
                        .await;
                    break;
                },
                None => {
                    let _ = output_tx
                        .send(TerminalOutput::Closed("shell exited".into()))
                        .await;
                    break;
                },
            }
        }
        debug!(session = %out_session, "terminal.output pump ended");
        out_cancel.cancel();
    });
}

fn signal_byte(name: &str) -> u8 {
    // TTY control bytes; unknown signals degrade to ETX.
    match name {
        "SIGQUIT" => 0x1c,
        "SIGTSTP" => 0x1a,
        _ => 0x03,
    }
}
