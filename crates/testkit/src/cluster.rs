//! Scripted cluster gateway for tests.
//!
//! Tracks a set of "live" resources from applies/deletes, serves scripted
//! status observations, and loops exec input back as output.

use benchkube_domain::{
    AppliedResource, Namespace, ResourceKind, ResourcePhase, ResourceStatus,
};
use benchkube_ports::{
    BoxFuture, ByteStream, ClusterGateway, ExecChannel, ExecRequest, LogOptions, PodInfo,
    TerminalDimensions,
};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize as _;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

type ResourceKey = (String, String, String);

#[derive(Debug, Default)]
struct GatewayState {
    live: BTreeSet<ResourceKey>,
    applies: Vec<(String, String)>,
    deletes: Vec<(String, String)>,
    statuses: BTreeMap<ResourceKey, VecDeque<ResourceStatus>>,
    pods: BTreeMap<String, Vec<PodInfo>>,
    logs: Vec<u8>,
}

/// A cluster gateway whose observations are scripted by the test.
#[derive(Debug, Default, Clone)]
pub struct ScriptedClusterGateway {
    state: Arc<Mutex<GatewayState>>,
    fail_next_apply: Arc<AtomicBool>,
}

impl ScriptedClusterGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a status observation for `(kind, namespace, name)`.
    ///
    /// Observations are served in order; the final one repeats. Without any
    /// script, live resources report `Pending` and absent ones `NotFound`.
    pub async fn push_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: ResourceStatus,
    ) {
        let mut state = self.state.lock().await;
        state
            .statuses
            .entry(key(kind, namespace, name))
            .or_default()
            .push_back(status);
    }

    /// Script the pods returned for a label selector.
    pub async fn set_pods(&self, selector: &str, pods: Vec<PodInfo>) {
        self.state.lock().await.pods.insert(selector.to_string(), pods);
    }

    /// Script the log bytes served by `tail_logs`.
    pub async fn set_logs(&self, bytes: &[u8]) {
        self.state.lock().await.logs = bytes.to_vec();
    }

    /// Make the next apply fail with an `upstream` error.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    /// Applied `(yaml, namespace)` pairs, in order.
    pub async fn applies(&self) -> Vec<(String, String)> {
        self.state.lock().await.applies.clone()
    }

    /// Deleted `(yaml, namespace)` pairs, in order.
    pub async fn deletes(&self) -> Vec<(String, String)> {
        self.state.lock().await.deletes.clone()
    }

    /// Whether a resource is currently live.
    pub async fn is_live(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.state.lock().await.live.contains(&key(kind, namespace, name))
    }

    /// Number of live resources.
    pub async fn live_count(&self) -> usize {
        self.state.lock().await.live.len()
    }
}

fn key(kind: ResourceKind, namespace: &str, name: &str) -> ResourceKey {
    (
        kind.as_str().to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn parse_documents(yaml: &str, namespace: &str) -> Result<Vec<AppliedResource>> {
    let mut resources = Vec::new();
    for document in serde_yaml_ng::Deserializer::from_str(yaml) {
        let value = serde_yaml_ng::Value::deserialize(document)
            .map_err(|error| ErrorEnvelope::invalid(format!("invalid YAML: {error}")))?;
        if value.is_null() {
            continue;
        }
        let kind_raw = value
            .get("kind")
            .and_then(serde_yaml_ng::Value::as_str)
            .ok_or_else(|| ErrorEnvelope::invalid("document missing `kind`"))?;
        let name = value
            .get("metadata")
            .and_then(|metadata| metadata.get("name"))
            .and_then(serde_yaml_ng::Value::as_str)
            .ok_or_else(|| ErrorEnvelope::invalid("document missing `metadata.name`"))?;
        resources.push(AppliedResource {
            kind: ResourceKind::from_kind_str(kind_raw),
            kind_raw: kind_raw.into(),
            name: name.into(),
            namespace: namespace.into(),
        });
    }
    if resources.is_empty() {
        return Err(ErrorEnvelope::invalid("manifest contains no documents"));
    }
    Ok(resources)
}

impl ClusterGateway for ScriptedClusterGateway {
    fn apply<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<Vec<AppliedResource>>> {
        Box::pin(async move {
            if self.fail_next_apply.swap(false, Ordering::SeqCst) {
                return Err(ErrorEnvelope::upstream("scripted apply failure"));
            }
            let resources = parse_documents(yaml, namespace.as_str())?;
            let mut state = self.state.lock().await;
            state
                .applies
                .push((yaml.to_string(), namespace.as_str().to_string()));
            for resource in &resources {
                state
                    .live
                    .insert(key(resource.kind, namespace.as_str(), &resource.name));
            }
            Ok(resources)
        })
    }

    fn delete<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let resources = parse_documents(yaml, namespace.as_str())?;
            let mut state = self.state.lock().await;
            state
                .deletes
                .push((yaml.to_string(), namespace.as_str().to_string()));
            for resource in &resources {
                state
                    .live
                    .remove(&key(resource.kind, namespace.as_str(), &resource.name));
            }
            Ok(())
        })
    }

    fn get_status<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        kind: ResourceKind,
        namespace: &'a Namespace,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ResourceStatus>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let resource_key = key(kind, namespace.as_str(), name);
            if let Some(queue) = state.statuses.get_mut(&resource_key) {
                if queue.len() > 1 {
                    if let Some(status) = queue.pop_front() {
                        return Ok(status);
                    }
                }
                if let Some(status) = queue.front() {
                    return Ok(status.clone());
                }
            }
            let phase = if state.live.contains(&resource_key) {
                ResourcePhase::Pending
            } else {
                ResourcePhase::NotFound
            };
            Ok(ResourceStatus {
                phase,
                ..ResourceStatus::default()
            })
        })
    }

    fn list_pods<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _namespace: &'a Namespace,
        label_selector: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PodInfo>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .await
                .pods
                .get(label_selector)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn tail_logs<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _namespace: &'a Namespace,
        _pod: &'a str,
        _options: LogOptions,
    ) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(async move {
            let bytes = Bytes::from(self.state.lock().await.logs.clone());
            let chunks: Vec<Result<Bytes>> = vec![Ok(bytes)];
            Ok(futures_util::stream::iter(chunks).boxed())
        })
    }

    fn exec<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _request: ExecRequest,
    ) -> BoxFuture<'a, Result<ExecChannel>> {
        Box::pin(async move {
            // Loopback shell: everything written to stdin comes back on stdout.
            let (output_tx, output_rx) = mpsc::channel::<Result<Bytes>>(64);
            let (resize_tx, mut resize_rx) = mpsc::channel::<TerminalDimensions>(8);
            tokio::spawn(async move { while resize_rx.recv().await.is_some() {} });

            let writer = LoopbackWriter { output: output_tx };
            let output = tokio_stream_from(output_rx);
            Ok(ExecChannel {
                input: Box::pin(writer),
                output,
                resize: resize_tx,
            })
        })
    }
}

fn tokio_stream_from(mut receiver: mpsc::Receiver<Result<Bytes>>) -> ByteStream {
    futures_util::stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed()
}

struct LoopbackWriter {
    output: mpsc::Sender<Result<Bytes>>,
}

impl tokio::io::AsyncWrite for LoopbackWriter {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let bytes = Bytes::copy_from_slice(buf);
        match self.output.try_send(Ok(bytes)) {
            Ok(()) => std::task::Poll::Ready(Ok(buf.len())),
            Err(_) => std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "loopback closed",
            ))),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
