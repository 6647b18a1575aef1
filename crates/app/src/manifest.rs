//! YAML manifest parsing, evaluation-job composition, and vLLM rendering.
//!
//! All manifest manipulation happens here so the rest of the app layer works
//! with plain strings and validated summaries.

use benchkube_domain::{Namespace, ResourceKind, VllmConfig};
use benchkube_shared::{ErrorEnvelope, Result};
use serde::Deserialize as _;
use serde_yaml_ng::Value;

fn yaml_invalid(error: serde_yaml_ng::Error) -> ErrorEnvelope {
    ErrorEnvelope::invalid(format!("invalid YAML: {error}"))
}

/// Env var injected into the job's first container.
pub const MODEL_ENDPOINT_ENV: &str = "VLLM_MODEL_ENDPOINT";
/// Mount path of the evaluation config inside the job container.
pub const EVAL_CONFIG_MOUNT_PATH: &str = "/app/configs";
/// File name of the mounted evaluation config.
pub const EVAL_CONFIG_FILE_NAME: &str = "eval_config.json";
/// Volume name backing the evaluation config mount.
const EVAL_CONFIG_VOLUME: &str = "eval-config";

/// Summary of the primary resource of a multi-document manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryResource {
    /// Tracked kind.
    pub kind: ResourceKind,
    /// Raw manifest kind string.
    pub kind_raw: Box<str>,
    /// Resource name.
    pub name: Box<str>,
}

/// Split a YAML string into its non-empty documents.
pub fn split_documents(yaml: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml_ng::Deserializer::from_str(yaml) {
        let value = Value::deserialize(document).map_err(yaml_invalid)?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    if documents.is_empty() {
        return Err(ErrorEnvelope::invalid("manifest contains no documents"));
    }
    Ok(documents)
}

/// Identify the primary resource: the first document in apply order.
pub fn primary_resource(yaml: &str) -> Result<PrimaryResource> {
    let documents = split_documents(yaml)?;
    let first = documents
        .first()
        .ok_or_else(|| ErrorEnvelope::invalid("manifest contains no documents"))?;
    summarize(first)
}

fn summarize(document: &Value) -> Result<PrimaryResource> {
    let kind_raw = document
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorEnvelope::invalid("manifest document is missing `kind`"))?;
    let name = document
        .get("metadata")
        .and_then(|metadata| metadata.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| ErrorEnvelope::invalid("manifest document is missing `metadata.name`"))?;
    Ok(PrimaryResource {
        kind: ResourceKind::from_kind_str(kind_raw),
        kind_raw: kind_raw.into(),
        name: name.into(),
    })
}

/// Compose the evaluation submission from a job manifest.
///
/// Mutations, per the submission contract:
/// 1. Append one `env` entry named `VLLM_MODEL_ENDPOINT` to the first
///    container (when an endpoint is provided).
/// 2. When a config is provided, append a `volumeMounts` entry and a
///    matching ConfigMap-backed `volume`, and emit the ConfigMap (named
///    `{job-name}-eval-config`) as a second document after the Job, so the
///    Job stays the primary resource.
pub fn compose_eval_job(
    job_yaml: &str,
    config_json: Option<&[u8]>,
    model_endpoint: Option<&str>,
) -> Result<String> {
    let documents = split_documents(job_yaml)?;
    if documents.len() != 1 {
        return Err(ErrorEnvelope::invalid(
            "job file must contain exactly one document",
        ));
    }
    let mut job = documents.into_iter().next().unwrap_or(Value::Null);

    let summary = summarize(&job)?;
    if summary.kind != ResourceKind::Job {
        return Err(ErrorEnvelope::invalid(format!(
            "job file must be a batch/v1 Job manifest, got `{}`",
            summary.kind_raw
        )));
    }
    let job_name = summary.name.clone();

    if let Some(endpoint) = model_endpoint {
        inject_env(&mut job, MODEL_ENDPOINT_ENV, endpoint)?;
    }

    let mut rendered = Vec::new();
    if let Some(config) = config_json {
        let config_map_name = format!("{job_name}-eval-config");
        mount_config(&mut job, &config_map_name)?;
        rendered.push(serde_yaml_ng::to_string(&job).map_err(yaml_invalid)?);
        rendered.push(
            serde_yaml_ng::to_string(&config_map(&config_map_name, config)?)
                .map_err(yaml_invalid)?,
        );
    } else {
        rendered.push(serde_yaml_ng::to_string(&job).map_err(yaml_invalid)?);
    }

    Ok(rendered.join("---\n"))
}

fn first_container<'a>(job: &'a mut Value) -> Result<&'a mut Value> {
    job.get_mut("spec")
        .and_then(|spec| spec.get_mut("template"))
        .and_then(|template| template.get_mut("spec"))
        .and_then(|pod_spec| pod_spec.get_mut("containers"))
        .and_then(|containers| containers.as_sequence_mut())
        .and_then(|containers| containers.first_mut())
        .ok_or_else(|| {
            ErrorEnvelope::invalid("job manifest has no `spec.template.spec.containers[0]`")
        })
}

fn inject_env(job: &mut Value, name: &str, value: &str) -> Result<()> {
    let container = first_container(job)?;
    let entry = serde_yaml_ng::to_value(EnvEntry { name, value }).map_err(yaml_invalid)?;
    push_to_sequence(container, "env", entry)
}

fn mount_config(job: &mut Value, config_map_name: &str) -> Result<()> {
    let container = first_container(job)?;
    let mount = serde_yaml_ng::to_value(VolumeMount {
        name: EVAL_CONFIG_VOLUME,
        mount_path: EVAL_CONFIG_MOUNT_PATH,
    })
    .map_err(yaml_invalid)?;
    push_to_sequence(container, "volumeMounts", mount)?;

    let pod_spec = job
        .get_mut("spec")
        .and_then(|spec| spec.get_mut("template"))
        .and_then(|template| template.get_mut("spec"))
        .ok_or_else(|| ErrorEnvelope::invalid("job manifest has no `spec.template.spec`"))?;
    let volume = serde_yaml_ng::to_value(ConfigMapVolume {
        name: EVAL_CONFIG_VOLUME,
        config_map: ConfigMapRef {
            name: config_map_name,
        },
    })
    .map_err(yaml_invalid)?;
    push_to_sequence(pod_spec, "volumes", volume)
}

fn push_to_sequence(parent: &mut Value, key: &str, entry: Value) -> Result<()> {
    let mapping = parent
        .as_mapping_mut()
        .ok_or_else(|| ErrorEnvelope::invalid("manifest node is not a mapping"))?;
    let list = mapping
        .entry(Value::String(key.to_string()))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    list.as_sequence_mut()
        .ok_or_else(|| ErrorEnvelope::invalid(format!("`{key}` is not a sequence")))?
        .push(entry);
    Ok(())
}

fn config_map(name: &str, config_json: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(config_json)
        .map_err(|_| ErrorEnvelope::invalid("evaluation config is not UTF-8"))?;
    let rendered = format!(
        concat!(
            "apiVersion: v1\n",
            "kind: ConfigMap\n",
            "metadata:\n",
            "  name: {name}\n",
        ),
        name = name
    );
    let mut value: Value = serde_yaml_ng::from_str(&rendered).map_err(yaml_invalid)?;
    let data = serde_yaml_ng::to_value(ConfigMapData { file: text }).map_err(yaml_invalid)?;
    value
        .as_mapping_mut()
        .ok_or_else(|| ErrorEnvelope::invalid("configmap render failed"))?
        .insert(Value::String("data".to_string()), data);
    Ok(value)
}

#[derive(serde::Serialize)]
struct EnvEntry<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct VolumeMount<'a> {
    name: &'a str,
    mount_path: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMapVolume<'a> {
    name: &'a str,
    config_map: ConfigMapRef<'a>,
}

#[derive(serde::Serialize)]
struct ConfigMapRef<'a> {
    name: &'a str,
}

#[derive(serde::Serialize)]
struct ConfigMapData<'a> {
    #[serde(rename = "eval_config.json")]
    file: &'a str,
}

/// Render the Deployment + Service manifest for an inference server.
///
/// The Deployment carries the GPU resource request from the config; the
/// Service exposes the serving port under the deployment's name.
pub fn render_vllm_manifest(config: &VllmConfig, namespace: &Namespace) -> String {
    let name = vllm_deployment_name(&config.model_name);
    let port = config.port.unwrap_or(8000);
    let served = config
        .served_model_name
        .as_deref()
        .unwrap_or(&config.model_name);

    let mut args = vec![
        format!("--model={}", config.model_name),
        format!("--served-model-name={served}"),
        format!("--port={port}"),
    ];
    if let Some(value) = &config.gpu_memory_utilization {
        args.push(format!("--gpu-memory-utilization={}", bare_value(value)));
    }
    if let Some(value) = config.max_num_seqs {
        args.push(format!("--max-num-seqs={value}"));
    }
    if let Some(value) = config.block_size {
        args.push(format!("--block-size={value}"));
    }
    if let Some(value) = config.tensor_parallel_size {
        args.push(format!("--tensor-parallel-size={value}"));
    }
    if let Some(value) = config.pipeline_parallel_size {
        args.push(format!("--pipeline-parallel-size={value}"));
    }
    if config.trust_remote_code == Some(true) {
        args.push("--trust-remote-code".to_string());
    }
    if let Some(value) = &config.dtype {
        args.push(format!("--dtype={value}"));
    }
    if let Some(value) = config.max_model_len {
        args.push(format!("--max-model-len={value}"));
    }
    if let Some(value) = &config.quantization {
        args.push(format!("--quantization={value}"));
    }
    for (key, value) in &config.additional_args {
        args.push(format!("--{key}={}", bare_value(value)));
    }

    let args_yaml = args
        .iter()
        .map(|arg| format!("            - \"{arg}\""))
        .collect::<Vec<_>>()
        .join("\n");

    let gpu_resources = if config.gpu_resource_count > 0 {
        format!(
            concat!(
                "          resources:\n",
                "            limits:\n",
                "              {gpu_type}: {count}\n",
            ),
            gpu_type = config.gpu_resource_type,
            count = config.gpu_resource_count,
        )
    } else {
        String::new()
    };

    format!(
        concat!(
            "apiVersion: apps/v1\n",
            "kind: Deployment\n",
            "metadata:\n",
            "  name: {name}\n",
            "  namespace: {namespace}\n",
            "  labels:\n",
            "    app: {name}\n",
            "spec:\n",
            "  replicas: 1\n",
            "  selector:\n",
            "    matchLabels:\n",
            "      app: {name}\n",
            "  template:\n",
            "    metadata:\n",
            "      labels:\n",
            "        app: {name}\n",
            "    spec:\n",
            "      containers:\n",
            "        - name: vllm\n",
            "          image: vllm/vllm-openai:latest\n",
            "          args:\n",
            "{args}\n",
            "          ports:\n",
            "            - containerPort: {port}\n",
            "{resources}",
            "---\n",
            "apiVersion: v1\n",
            "kind: Service\n",
            "metadata:\n",
            "  name: {name}\n",
            "  namespace: {namespace}\n",
            "spec:\n",
            "  selector:\n",
            "    app: {name}\n",
            "  ports:\n",
            "    - port: {port}\n",
            "      targetPort: {port}\n",
        ),
        name = name,
        namespace = namespace.as_str(),
        args = args_yaml,
        port = port,
        resources = gpu_resources,
    )
}

/// Derive a DNS-safe deployment name from a model name.
#[must_use]
pub fn vllm_deployment_name(model_name: &str) -> String {
    let slug: String = model_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let mut name = format!("vllm-{slug}");
    name.truncate(63);
    name.trim_end_matches('-').to_string()
}

fn bare_value(value: &benchkube_domain::CanonicalValue) -> String {
    use benchkube_domain::CanonicalValue as V;
    match value {
        V::Null => "null".to_string(),
        V::Bool(flag) => flag.to_string(),
        V::Int(int) => int.to_string(),
        V::Float(float) => float.to_string(),
        V::Str(text) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const JOB: &str = concat!(
        "apiVersion: batch/v1\n",
        "kind: Job\n",
        "metadata:\n",
        "  name: latency-bench\n",
        "spec:\n",
        "  template:\n",
        "    spec:\n",
        "      containers:\n",
        "        - name: bench\n",
        "          image: bench:1\n",
        "      restartPolicy: Never\n",
    );

    #[test]
    fn primary_resource_is_first_document() {
        let yaml = format!("{JOB}---\napiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n");
        let primary = primary_resource(&yaml).expect("primary");
        assert_eq!(primary.kind, ResourceKind::Job);
        assert_eq!(primary.name.as_ref(), "latency-bench");
    }

    #[test]
    fn empty_manifest_is_rejected() {
        assert!(split_documents("").is_err());
        assert!(split_documents("---\n---\n").is_err());
    }

    #[test]
    fn compose_injects_endpoint_env() {
        let composed =
            compose_eval_job(JOB, None, Some("http://svc:8000")).expect("composed");
        let documents = split_documents(&composed).expect("documents");
        assert_eq!(documents.len(), 1);
        let env = documents[0]["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_sequence()
            .expect("env list")
            .clone();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0]["name"].as_str(), Some(MODEL_ENDPOINT_ENV));
        assert_eq!(env[0]["value"].as_str(), Some("http://svc:8000"));
    }

    #[test]
    fn compose_mounts_config_and_emits_configmap_second() {
        let config = br#"{"samples": 100}"#;
        let composed =
            compose_eval_job(JOB, Some(config), Some("http://svc:8000")).expect("composed");
        let documents = split_documents(&composed).expect("documents");
        assert_eq!(documents.len(), 2, "job then configmap");

        // Job stays the primary resource.
        assert_eq!(documents[0]["kind"].as_str(), Some("Job"));
        let mounts = documents[0]["spec"]["template"]["spec"]["containers"][0]["volumeMounts"]
            .as_sequence()
            .expect("mounts")
            .clone();
        assert_eq!(mounts[0]["mountPath"].as_str(), Some(EVAL_CONFIG_MOUNT_PATH));
        let volumes = documents[0]["spec"]["template"]["spec"]["volumes"]
            .as_sequence()
            .expect("volumes")
            .clone();
        assert_eq!(
            volumes[0]["configMap"]["name"].as_str(),
            Some("latency-bench-eval-config")
        );

        assert_eq!(documents[1]["kind"].as_str(), Some("ConfigMap"));
        assert_eq!(
            documents[1]["metadata"]["name"].as_str(),
            Some("latency-bench-eval-config")
        );
        assert_eq!(
            documents[1]["data"][EVAL_CONFIG_FILE_NAME].as_str(),
            Some(r#"{"samples": 100}"#)
        );
    }

    #[test]
    fn compose_rejects_non_job_manifests() {
        let service = "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n";
        assert!(compose_eval_job(service, None, None).is_err());
    }

    #[test]
    fn existing_env_entries_are_preserved() {
        let job_with_env = JOB.replace(
            "          image: bench:1\n",
            concat!(
                "          image: bench:1\n",
                "          env:\n",
                "            - name: EXISTING\n",
                "              value: keep\n",
            ),
        );
        let composed =
            compose_eval_job(&job_with_env, None, Some("http://svc:8000")).expect("composed");
        let documents = split_documents(&composed).expect("documents");
        let env = documents[0]["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_sequence()
            .expect("env list")
            .clone();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0]["name"].as_str(), Some("EXISTING"));
        assert_eq!(env[1]["name"].as_str(), Some(MODEL_ENDPOINT_ENV));
    }

    #[test]
    fn vllm_manifest_renders_deployment_and_service() {
        let config = VllmConfig {
            model_name: "microsoft/DialoGPT-medium".into(),
            gpu_resource_type: "nvidia.com/gpu".into(),
            gpu_resource_count: 1,
            gpu_memory_utilization: None,
            max_num_seqs: Some(64),
            block_size: None,
            tensor_parallel_size: None,
            pipeline_parallel_size: None,
            trust_remote_code: Some(true),
            dtype: None,
            max_model_len: None,
            quantization: None,
            served_model_name: None,
            port: None,
            additional_args: BTreeMap::new(),
        };
        let namespace = Namespace::parse("default").expect("namespace");
        let rendered = render_vllm_manifest(&config, &namespace);

        let documents = split_documents(&rendered).expect("documents");
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["kind"].as_str(), Some("Deployment"));
        assert_eq!(documents[1]["kind"].as_str(), Some("Service"));
        assert_eq!(
            documents[0]["metadata"]["name"].as_str(),
            Some("vllm-microsoft-dialogpt-medium")
        );
        let limits = &documents[0]["spec"]["template"]["spec"]["containers"][0]["resources"]
            ["limits"];
        assert_eq!(limits["nvidia.com/gpu"].as_u64(), Some(1));
        let args = documents[0]["spec"]["template"]["spec"]["containers"][0]["args"]
            .as_sequence()
            .expect("args")
            .clone();
        assert!(args.iter().any(|arg| arg.as_str() == Some("--max-num-seqs=64")));
        assert!(args.iter().any(|arg| arg.as_str() == Some("--trust-remote-code")));
    }

    #[test]
    fn deployment_name_is_dns_safe() {
        assert_eq!(
            vllm_deployment_name("microsoft/DialoGPT-medium"),
            "vllm-microsoft-dialogpt-medium"
        );
        let long = vllm_deployment_name(&"x".repeat(100));
        assert!(long.len() <= 63);
    }
}
