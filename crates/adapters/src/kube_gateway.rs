//! Kubernetes cluster gateway.
//!
//! The sole component that talks to the cluster API. Applies use server-side
//! apply over `DynamicObject` + discovery so arbitrary kinds work; status is
//! read through typed APIs for the kinds the tracker understands.

use benchkube_domain::{
    AppliedResource, Namespace, ResourceKind, ResourcePhase, ResourceStatus,
};
use benchkube_ports::{
    BoxFuture, ByteStream, ClusterGateway, ExecChannel, ExecRequest, LogOptions, PodInfo,
    TerminalDimensions,
};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result, bounded_call};
use futures_util::{SinkExt, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment as K8sDeployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{
    Api, AttachParams, AttachedProcess, DeleteParams, DynamicObject, GroupVersionKind,
    ListParams, LogParams, Patch, PatchParams, TerminalSize,
};
use kube::core::discovery::Scope;
use kube::discovery::pinned_kind;
use kube::{Client, ResourceExt};
use serde::Deserialize as _;
use tokio::sync::mpsc;
use tracing::debug;

/// Field manager name used for server-side apply.
const FIELD_MANAGER: &str = "benchkube";

/// Cluster gateway over a shared kube client.
///
/// Stateless: the gateway never persists anything.
#[derive(Clone)]
pub struct KubeClusterGateway {
    client: Client,
}

impl KubeClusterGateway {
    /// Build over a shared client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn parse_objects(yaml: &str, namespace: &Namespace) -> Result<Vec<DynamicObject>> {
        let mut objects = Vec::new();
        for document in serde_yaml_ng::Deserializer::from_str(yaml) {
            let value = serde_yaml_ng::Value::deserialize(document)
                .map_err(|error| ErrorEnvelope::invalid(format!("invalid YAML: {error}")))?;
            if value.is_null() {
                continue;
            }
            let json = serde_json::to_value(&value)
                .map_err(|error| ErrorEnvelope::invalid(format!("invalid manifest: {error}")))?;
            let mut object: DynamicObject = serde_json::from_value(json).map_err(|error| {
                ErrorEnvelope::invalid(format!("manifest is not a resource document: {error}"))
            })?;
            if object.metadata.namespace.is_none() {
                object.metadata.namespace = Some(namespace.as_str().to_owned());
            }
            objects.push(object);
        }
        if objects.is_empty() {
            return Err(ErrorEnvelope::invalid("manifest contains no documents"));
        }
        Ok(objects)
    }

    async fn dynamic_api(&self, object: &DynamicObject, namespace: &Namespace) -> Result<Api<DynamicObject>> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| ErrorEnvelope::invalid("manifest document is missing apiVersion/kind"))?;
        let gvk = GroupVersionKind::try_from(types)
            .map_err(|error| ErrorEnvelope::invalid(format!("invalid apiVersion/kind: {error}")))?;
        let (resource, capabilities) = pinned_kind(&self.client, &gvk)
            .await
            .map_err(|error| map_kube_error(&error))?;
        let api = match capabilities.scope {
            Scope::Namespaced => {
                let ns = object
                    .metadata
                    .namespace
                    .as_deref()
                    .unwrap_or(namespace.as_str());
                Api::namespaced_with(self.client.clone(), ns, &resource)
            },
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }
}

fn map_kube_error(error: &kube::Error) -> ErrorEnvelope {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => ErrorEnvelope::not_found(response.message.clone()),
            401 | 403 => ErrorEnvelope::unauthorized(response.message.clone()),
            409 => ErrorEnvelope::conflict(response.message.clone()),
            _ => ErrorEnvelope::upstream(format!("cluster API error: {}", response.message)),
        },
        _ => ErrorEnvelope::upstream(format!("cluster unreachable: {error}")),
    }
}

fn time_ms(time: &k8s_openapi::apimachinery::pkg::apis::meta::v1::Time) -> u64 {
    u64::try_from(time.0.timestamp_millis()).unwrap_or(0)
}

fn not_found_status() -> ResourceStatus {
    ResourceStatus {
        phase: ResourcePhase::NotFound,
        ..ResourceStatus::default()
    }
}

fn job_status(job: &Job) -> ResourceStatus {
    let spec = job.spec.as_ref();
    let status = job.status.as_ref();
    let conditions: Vec<Box<str>> = status
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|condition| format!("{}={}", condition.type_, condition.status).into())
                .collect()
        })
        .unwrap_or_default();

    let succeeded = status.and_then(|status| status.succeeded);
    let failed = status.and_then(|status| status.failed);
    let completions = spec.and_then(|spec| spec.completions);
    let complete = conditions
        .iter()
        .any(|condition| condition.as_ref() == "Complete=True");
    let has_failed_condition = conditions
        .iter()
        .any(|condition| condition.as_ref() == "Failed=True");

    let phase = if complete || succeeded.unwrap_or(0) >= completions.unwrap_or(1) {
        ResourcePhase::Succeeded
    } else if has_failed_condition {
        ResourcePhase::Failed
    } else if status.and_then(|status| status.start_time.as_ref()).is_some() {
        ResourcePhase::Running
    } else {
        ResourcePhase::Pending
    };

    let message = has_failed_condition.then(|| {
        status
            .and_then(|status| status.conditions.as_ref())
            .and_then(|conditions| {
                conditions
                    .iter()
                    .find(|condition| condition.type_ == "Failed")
                    .and_then(|condition| condition.message.clone())
            })
            .unwrap_or_else(|| "job failed".to_string())
            .into_boxed_str()
    });

    ResourceStatus {
        phase,
        conditions,
        ready_replicas: None,
        succeeded,
        failed,
        completions,
        backoff_limit: spec.and_then(|spec| spec.backoff_limit),
        start_time_ms: status.and_then(|status| status.start_time.as_ref()).map(time_ms),
        completion_time_ms: status
            .and_then(|status| status.completion_time.as_ref())
            .map(time_ms),
        message,
    }
}

fn deployment_status(deployment: &K8sDeployment) -> ResourceStatus {
    let status = deployment.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas);
    let conditions: Vec<Box<str>> = status
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|condition| format!("{}={}", condition.type_, condition.status).into())
                .collect()
        })
        .unwrap_or_default();
    let phase = if ready.unwrap_or(0) >= 1 {
        ResourcePhase::Running
    } else {
        ResourcePhase::Pending
    };
    ResourceStatus {
        phase,
        conditions,
        ready_replicas: ready,
        ..ResourceStatus::default()
    }
}

fn pod_info(pod: &Pod) -> PodInfo {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        });
    PodInfo {
        name: pod.name_any().into_boxed_str(),
        phase: status
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string())
            .into_boxed_str(),
        ready,
        started_at_ms: status
            .and_then(|status| status.start_time.as_ref())
            .map(time_ms),
    }
}

impl ClusterGateway for KubeClusterGateway {
    fn apply<'a>(
        &'a self,
        ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<Vec<AppliedResource>>> {
        Box::pin(async move {
            let objects = Self::parse_objects(yaml, namespace)?;
            let mut applied = Vec::with_capacity(objects.len());
            for object in objects {
                ctx.ensure_not_cancelled("cluster.apply")?;
                let name = object.name_any();
                let kind_raw = object
                    .types
                    .as_ref()
                    .map(|types| types.kind.clone())
                    .unwrap_or_default();
                let api = self.dynamic_api(&object, namespace).await?;
                let params = PatchParams::apply(FIELD_MANAGER).force();
                bounded_call(ctx, "cluster.apply", async {
                    api.patch(&name, &params, &Patch::Apply(&object))
                        .await
                        .map_err(|error| map_kube_error(&error))
                })
                .await?;
                debug!(kind = %kind_raw, name = %name, "cluster.applied");
                applied.push(AppliedResource {
                    kind: ResourceKind::from_kind_str(&kind_raw),
                    kind_raw: kind_raw.into_boxed_str(),
                    name: name.into_boxed_str(),
                    namespace: object
                        .metadata
                        .namespace
                        .clone()
                        .unwrap_or_else(|| namespace.as_str().to_owned())
                        .into_boxed_str(),
                });
            }
            Ok(applied)
        })
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a RequestContext,
        yaml: &'a str,
        namespace: &'a Namespace,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let objects = Self::parse_objects(yaml, namespace)?;
            for object in objects {
                ctx.ensure_not_cancelled("cluster.delete")?;
                let name = object.name_any();
                let api = self.dynamic_api(&object, namespace).await?;
                let outcome = bounded_call(ctx, "cluster.delete", async {
                    api.delete(&name, &DeleteParams::default())
                        .await
                        .map(|_| ())
                        .map_err(|error| map_kube_error(&error))
                })
                .await;
                match outcome {
                    Ok(()) => debug!(name = %name, "cluster.deleted"),
                    // Already gone: delete is idempotent.
                    Err(error) if error.code == benchkube_shared::ErrorCode::not_found() => {},
                    Err(error) => return Err(error),
                }
            }
            Ok(())
        })
    }

    fn get_status<'a>(
        &'a self,
        ctx: &'a RequestContext,
        kind: ResourceKind,
        namespace: &'a Namespace,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ResourceStatus>> {
        Box::pin(async move {
            let status = match kind {
                ResourceKind::Job => {
                    let api: Api<Job> = Api::namespaced(self.client.clone(), namespace.as_str());
                    let fetch = async {
                        api.get(name).await.map_err(|error| map_kube_error(&error))
                    };
                    match bounded_call(ctx, "cluster.status", fetch).await {
                        Ok(job) => job_status(&job),
                        Err(error) if error.code == benchkube_shared::ErrorCode::not_found() => {
                            not_found_status()
                        },
                        Err(error) => return Err(error),
                    }
                },
                ResourceKind::Deployment => {
                    let api: Api<K8sDeployment> =
                        Api::namespaced(self.client.clone(), namespace.as_str());
                    let fetch = async {
                        api.get(name).await.map_err(|error| map_kube_error(&error))
                    };
                    match bounded_call(ctx, "cluster.status", fetch).await {
                        Ok(deployment) => deployment_status(&deployment),
                        Err(error) if error.code == benchkube_shared::ErrorCode::not_found() => {
                            not_found_status()
                        },
                        Err(error) => return Err(error),
                    }
                },
                _ => ResourceStatus::default(),
            };
            Ok(status)
        })
    }

    fn list_pods<'a>(
        &'a self,
        ctx: &'a RequestContext,
        namespace: &'a Namespace,
        label_selector: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PodInfo>>> {
        Box::pin(async move {
            let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace.as_str());
            let params = ListParams::default().labels(label_selector);
            let fetch = async {
                api.list(&params).await.map_err(|error| map_kube_error(&error))
            };
            let pods = bounded_call(ctx, "cluster.list_pods", fetch).await?;
            Ok(pods.items.iter().map(pod_info).collect())
        })
    }

    fn tail_logs<'a>(
        &'a self,
        ctx: &'a RequestContext,
        namespace: &'a Namespace,
        pod: &'a str,
        options: LogOptions,
    ) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(async move {
            let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace.as_str());
            let params = LogParams {
                container: options.container.as_deref().map(ToOwned::to_owned),
                follow: options.follow,
                since_seconds: options.since_seconds.map(i64::from),
                tail_lines: options.tail_lines.map(i64::from),
                timestamps: false,
                ..LogParams::default()
            };
            // Follow streams are unbounded; only the open is bounded here.
            let open = async {
                api.log_stream(pod, &params)
                    .await
                    .map_err(|error| map_kube_error(&error))
            };
            let reader = bounded_call(ctx, "cluster.logs", open).await?;
            let stream = tokio_util::io::ReaderStream::new(
                tokio_util::compat::FuturesAsyncReadCompatExt::compat(reader),
            )
            .map_err(ErrorEnvelope::from)
            .boxed();
            Ok(stream)
        })
    }

    fn exec<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: ExecRequest,
    ) -> BoxFuture<'a, Result<ExecChannel>> {
        Box::pin(async move {
            let api: Api<Pod> =
                Api::namespaced(self.client.clone(), request.namespace.as_str());
            let mut params = AttachParams::default()
                .stdin(true)
                .stdout(true)
                .stderr(!request.tty)
                .tty(request.tty);
            if let Some(container) = &request.container {
                params = params.container(container.as_ref());
            }
            let command: Vec<String> = request
                .command
                .iter()
                .map(|part| part.as_ref().to_owned())
                .collect();

            let open = async {
                api.exec(&request.pod, command, &params)
                    .await
                    .map_err(|error| map_kube_error(&error))
            };
            let mut attached: AttachedProcess =
                bounded_call(ctx, "cluster.exec", open).await?;

            let stdin = attached
                .stdin()
                .ok_or_else(|| ErrorEnvelope::upstream("exec channel has no stdin"))?;
            let stdout = attached
                .stdout()
                .ok_or_else(|| ErrorEnvelope::upstream("exec channel has no stdout"))?;

            // Bridge resize messages into the websocket protocol's channel.
            let (resize_tx, mut resize_rx) = mpsc::channel::<TerminalDimensions>(8);
            if let Some(mut sizer) = attached.terminal_size() {
                tokio::spawn(async move {
                    while let Some(dimensions) = resize_rx.recv().await {
                        let size = TerminalSize {
                            height: dimensions.rows,
                            width: dimensions.cols,
                        };
                        if sizer.send(size).await.is_err() {
                            break;
                        }
                    }
                });
            } else {
                tokio::spawn(async move { while resize_rx.recv().await.is_some() {} });
            }

            let output = tokio_util::io::ReaderStream::new(stdout)
                .map_err(ErrorEnvelope::from)
                .boxed();
            Ok(ExecChannel {
                input: Box::pin(stdin),
                output,
                resize: resize_tx,
            })
        })
    }
}
