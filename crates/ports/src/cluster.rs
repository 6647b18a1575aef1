//! Cluster API boundary contract.

use crate::{BoxFuture, ByteStream};
use benchkube_domain::{AppliedResource, Namespace, ResourceKind, ResourceStatus};
use benchkube_shared::{RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// A pod observed via the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    /// Pod name.
    pub name: Box<str>,
    /// Raw pod phase string (`Pending`, `Running`, ...).
    pub phase: Box<str>,
    /// Whether all containers report ready.
    pub ready: bool,
    /// Pod start time (epoch ms), when started.
    pub started_at_ms: Option<u64>,
}

/// Options for a log tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read from (defaults to the first container).
    pub container: Option<Box<str>>,
    /// Only return logs newer than this many seconds.
    pub since_seconds: Option<u32>,
    /// Number of lines from the end to return.
    pub tail_lines: Option<u32>,
    /// Keep the stream open and follow new output.
    pub follow: bool,
}

/// Terminal dimensions for exec resize messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDimensions {
    /// Rows.
    pub rows: u16,
    /// Columns.
    pub cols: u16,
}

/// Request to open an exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Namespace of the target pod.
    pub namespace: Namespace,
    /// Target pod name.
    pub pod: Box<str>,
    /// Container (defaults to the first container).
    pub container: Option<Box<str>>,
    /// Command to run.
    pub command: Vec<Box<str>>,
    /// Allocate a TTY (merges stdout/stderr).
    pub tty: bool,
}

/// A live bidirectional exec channel.
///
/// Closing `input` (dropping the writer) terminates the remote stdin;
/// the channel as a whole closes when `output` ends.
pub struct ExecChannel {
    /// Write side (remote stdin).
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
    /// Read side (remote stdout, merged with stderr under a TTY).
    pub output: ByteStream,
    /// Resize message sender.
    pub resize: mpsc::Sender<TerminalDimensions>,
}

impl std::fmt::Debug for ExecChannel {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ExecChannel").finish_non_exhaustive()
    }
}

/// The sole boundary to the cluster API.
///
/// Implementations carry per-call timeouts and keep-alives; they never
/// persist state.
pub trait ClusterGateway: Send + Sync {
    /// Apply one or more YAML documents with server-side semantics.
    ///
    /// Returns all applied resources in document order; the first is the
    /// primary resource.
    fn apply<'a>(
        &'a self,
        ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<Vec<AppliedResource>>>;

    /// Delete the resources named by the YAML documents. Idempotent:
    /// already-absent resources are not an error.
    fn delete<'a>(
        &'a self,
        ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<()>>;

    /// Normalized status for one resource; `phase = NotFound` when absent.
    fn get_status<'a>(
        &'a self,
        ctx: &'a RequestContext,
        kind: ResourceKind,
        namespace: &'a Namespace,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ResourceStatus>>;

    /// List pods matching a label selector.
    fn list_pods<'a>(
        &'a self,
        ctx: &'a RequestContext,
        namespace: &'a Namespace,
        label_selector: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PodInfo>>>;

    /// Stream logs from one pod. Finite snapshot unless `follow` is set;
    /// follow streams close on cancellation.
    fn tail_logs<'a>(
        &'a self,
        ctx: &'a RequestContext,
        namespace: &'a Namespace,
        pod: &'a str,
        options: LogOptions,
    ) -> BoxFuture<'a, Result<ByteStream>>;

    /// Open a bidirectional exec channel into one container.
    fn exec<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: ExecRequest,
    ) -> BoxFuture<'a, Result<ExecChannel>>;
}
