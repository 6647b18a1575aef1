//! Inference-server deployment configs and placement fingerprints.

use crate::deployment::Deployment;
use crate::primitives::DeploymentId;
use benchkube_shared::ErrorEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical scalar value for fingerprint fields and `additional_args`.
///
/// The encoding is deterministic under reordering of mapping keys and
/// numeric-equivalent encodings: mappings are emitted in key-sorted order
/// (`BTreeMap`), integers are never promoted to floats, and booleans and
/// null stay distinct from strings. Absent is equal only to absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CanonicalValue {
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (kept exact; `1` != `1.0` only when the float is not integral).
    Int(i64),
    /// Float, stored in its shortest decimal representation.
    Float(Box<str>),
    /// String.
    Str(Box<str>),
}

impl CanonicalValue {
    /// Canonicalize a JSON scalar; arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ErrorEnvelope> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(flag) => Ok(Self::Bool(*flag)),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    return Ok(Self::Int(int));
                }
                number.as_f64().map_or_else(
                    || Err(ErrorEnvelope::invalid("unrepresentable number")),
                    |float| {
                        // Integral floats collapse onto the integer encoding so
                        // `1` and `1.0` fingerprint identically.
                        if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
                            #[allow(clippy::cast_possible_truncation, reason = "checked integral")]
                            return Ok(Self::Int(float as i64));
                        }
                        Ok(Self::Float(format!("{float}").into_boxed_str()))
                    },
                )
            },
            serde_json::Value::String(text) => Ok(Self::Str(text.as_str().into())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                ErrorEnvelope::invalid("additionalArgs values must be scalars"),
            ),
        }
    }

    /// Canonical string form used in fingerprint rendering.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(flag) => format!("bool:{flag}"),
            Self::Int(int) => format!("int:{int}"),
            Self::Float(float) => format!("float:{float}"),
            Self::Str(text) => format!("str:{text}"),
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.canonical())
    }
}

/// Strict inference-server deployment request.
///
/// Unknown keys are rejected at the boundary (`deny_unknown_fields`), not
/// deep inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VllmConfig {
    /// Model to serve (e.g. `microsoft/DialoGPT-medium`).
    pub model_name: Box<str>,
    /// GPU resource type requested (e.g. `nvidia.com/gpu`, `nvidia.com/mig-3g.20gb`).
    pub gpu_resource_type: Box<str>,
    /// GPU resource count requested.
    pub gpu_resource_count: u32,
    /// Fraction of GPU memory the server may use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_utilization: Option<CanonicalValue>,
    /// Maximum concurrent sequences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num_seqs: Option<u32>,
    /// KV-cache block size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    /// Tensor parallel degree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<u32>,
    /// Pipeline parallel degree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_parallel_size: Option<u32>,
    /// Allow remote code execution for custom models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_remote_code: Option<bool>,
    /// Model dtype (e.g. `bfloat16`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<Box<str>>,
    /// Maximum model context length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u32>,
    /// Quantization scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Box<str>>,
    /// Name the model is served under (defaults to `model_name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_model_name: Option<Box<str>>,
    /// Serving port (defaults to 8000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Extra CLI arguments, canonicalized scalars keyed by flag name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_args: BTreeMap<Box<str>, CanonicalValue>,
}

impl VllmConfig {
    /// Validate the request invariants.
    pub fn validate(&self) -> Result<(), ErrorEnvelope> {
        if self.model_name.trim().is_empty() {
            return Err(ErrorEnvelope::invalid("modelName must be non-empty"));
        }
        if self.gpu_resource_type.trim().is_empty() {
            return Err(ErrorEnvelope::invalid("gpuResourceType must be non-empty"));
        }
        Ok(())
    }

    /// The fingerprint used for reuse and conflict decisions.
    #[must_use]
    pub fn fingerprint(&self) -> ConfigFingerprint {
        ConfigFingerprint {
            model_name: self.model_name.clone(),
            gpu_resource_type: self.gpu_resource_type.clone(),
            gpu_resource_count: self.gpu_resource_count,
            gpu_memory_utilization: self.gpu_memory_utilization.clone(),
            max_num_seqs: self.max_num_seqs,
            block_size: self.block_size,
            tensor_parallel_size: self.tensor_parallel_size,
            pipeline_parallel_size: self.pipeline_parallel_size,
            trust_remote_code: self.trust_remote_code,
            dtype: self.dtype.clone(),
            max_model_len: self.max_model_len,
            quantization: self.quantization.clone(),
            served_model_name: self.served_model_name.clone(),
            additional_args: self.additional_args.clone(),
        }
    }
}

/// The canonical tuple that determines reuse and conflict for
/// inference-server deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFingerprint {
    /// Model to serve.
    pub model_name: Box<str>,
    /// GPU resource type requested.
    pub gpu_resource_type: Box<str>,
    /// GPU resource count requested.
    pub gpu_resource_count: u32,
    /// Fraction of GPU memory the server may use.
    pub gpu_memory_utilization: Option<CanonicalValue>,
    /// Maximum concurrent sequences.
    pub max_num_seqs: Option<u32>,
    /// KV-cache block size.
    pub block_size: Option<u32>,
    /// Tensor parallel degree.
    pub tensor_parallel_size: Option<u32>,
    /// Pipeline parallel degree.
    pub pipeline_parallel_size: Option<u32>,
    /// Allow remote code execution.
    pub trust_remote_code: Option<bool>,
    /// Model dtype.
    pub dtype: Option<Box<str>>,
    /// Maximum model context length.
    pub max_model_len: Option<u32>,
    /// Quantization scheme.
    pub quantization: Option<Box<str>>,
    /// Name the model is served under.
    pub served_model_name: Option<Box<str>>,
    /// Extra CLI arguments, key-sorted.
    pub additional_args: BTreeMap<Box<str>, CanonicalValue>,
}

impl ConfigFingerprint {
    /// Two fingerprints GPU-conflict iff both request more than zero of the
    /// same exact GPU resource type. A MIG slice type conflicts only with
    /// itself; different slices coexist.
    #[must_use]
    pub fn gpu_conflicts_with(&self, other: &Self) -> bool {
        self.gpu_resource_count > 0
            && other.gpu_resource_count > 0
            && self.gpu_resource_type == other.gpu_resource_type
    }

    /// Deterministic text rendering (key-sorted, canonical scalar forms).
    #[must_use]
    pub fn canonical(&self) -> String {
        fn opt(value: Option<&CanonicalValue>) -> String {
            value.map_or_else(|| "absent".to_string(), CanonicalValue::canonical)
        }
        fn opt_num<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "absent".to_string(), |v| format!("int:{v}"))
        }
        fn opt_str(value: Option<&str>) -> String {
            value.map_or_else(|| "absent".to_string(), |v| format!("str:{v}"))
        }
        fn opt_bool(value: Option<bool>) -> String {
            value.map_or_else(|| "absent".to_string(), |v| format!("bool:{v}"))
        }

        let mut lines = vec![
            format!("model_name=str:{}", self.model_name),
            format!("gpu_resource_type=str:{}", self.gpu_resource_type),
            format!("gpu_resource_count=int:{}", self.gpu_resource_count),
            format!(
                "gpu_memory_utilization={}",
                opt(self.gpu_memory_utilization.as_ref())
            ),
            format!("max_num_seqs={}", opt_num(self.max_num_seqs)),
            format!("block_size={}", opt_num(self.block_size)),
            format!(
                "tensor_parallel_size={}",
                opt_num(self.tensor_parallel_size)
            ),
            format!(
                "pipeline_parallel_size={}",
                opt_num(self.pipeline_parallel_size)
            ),
            format!("trust_remote_code={}", opt_bool(self.trust_remote_code)),
            format!("dtype={}", opt_str(self.dtype.as_deref())),
            format!("max_model_len={}", opt_num(self.max_model_len)),
            format!("quantization={}", opt_str(self.quantization.as_deref())),
            format!(
                "served_model_name={}",
                opt_str(self.served_model_name.as_deref())
            ),
        ];
        for (key, value) in &self.additional_args {
            lines.push(format!("arg:{key}={}", value.canonical()));
        }
        lines.join("\n")
    }
}

/// A tracked inference-server deployment: a [`Deployment`] plus its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VllmDeployment {
    /// The underlying tracked deployment bundle.
    pub deployment: Deployment,
    /// Placement fingerprint.
    pub fingerprint: ConfigFingerprint,
}

/// Outcome of placement admission for a candidate inference server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// An identical active deployment exists; reuse it.
    Reuse(DeploymentId),
    /// No conflicts; apply the candidate directly.
    Admit,
    /// Conflicting deployments must be evicted before applying.
    EvictAndAdmit(Vec<DeploymentId>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(model: &str, gpu_type: &str, count: u32) -> VllmConfig {
        VllmConfig {
            model_name: model.into(),
            gpu_resource_type: gpu_type.into(),
            gpu_resource_count: count,
            gpu_memory_utilization: None,
            max_num_seqs: None,
            block_size: None,
            tensor_parallel_size: None,
            pipeline_parallel_size: None,
            trust_remote_code: None,
            dtype: None,
            max_model_len: None,
            quantization: None,
            served_model_name: None,
            port: None,
            additional_args: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_configs_fingerprint_equal() {
        let a = config("microsoft/DialoGPT-medium", "nvidia.com/gpu", 1);
        let b = config("microsoft/DialoGPT-medium", "nvidia.com/gpu", 1);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().canonical(), b.fingerprint().canonical());
    }

    #[test]
    fn mig_slices_do_not_conflict_across_profiles() {
        let small = config("m1", "nvidia.com/mig-3g.20gb", 1).fingerprint();
        let large = config("m2", "nvidia.com/mig-4g.24gb", 1).fingerprint();
        assert!(!small.gpu_conflicts_with(&large));

        let same = config("m3", "nvidia.com/mig-3g.20gb", 1).fingerprint();
        assert!(small.gpu_conflicts_with(&same));
    }

    #[test]
    fn zero_count_never_conflicts() {
        let cpu_only = config("m1", "nvidia.com/gpu", 0).fingerprint();
        let gpu = config("m2", "nvidia.com/gpu", 1).fingerprint();
        assert!(!cpu_only.gpu_conflicts_with(&gpu));
    }

    #[test]
    fn integer_and_integral_float_encode_identically() {
        let int = CanonicalValue::from_json(&json!(1)).expect("int");
        let float = CanonicalValue::from_json(&json!(1.0)).expect("float");
        assert_eq!(int, float);

        let frac = CanonicalValue::from_json(&json!(0.9)).expect("frac");
        assert_eq!(frac.canonical(), "float:0.9");
    }

    #[test]
    fn bool_null_and_string_stay_distinct() {
        let truthy = CanonicalValue::from_json(&json!(true)).expect("bool");
        let text = CanonicalValue::from_json(&json!("true")).expect("str");
        let null = CanonicalValue::from_json(&json!(null)).expect("null");
        assert_ne!(truthy, text);
        assert_ne!(null, CanonicalValue::Str("null".into()));
        assert_ne!(truthy.canonical(), text.canonical());
    }

    #[test]
    fn additional_args_are_key_sorted_in_canonical_form() {
        let mut a = config("m", "nvidia.com/gpu", 1);
        a.additional_args
            .insert("zeta".into(), CanonicalValue::Int(1));
        a.additional_args
            .insert("alpha".into(), CanonicalValue::Str("x".into()));

        let rendered = a.fingerprint().canonical();
        let alpha = rendered.find("arg:alpha").expect("alpha present");
        let zeta = rendered.find("arg:zeta").expect("zeta present");
        assert!(alpha < zeta);
    }

    #[test]
    fn nested_args_are_rejected() {
        assert!(CanonicalValue::from_json(&json!({"a": 1})).is_err());
        assert!(CanonicalValue::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn absent_only_equals_absent() {
        let mut with_dtype = config("m", "nvidia.com/gpu", 1);
        with_dtype.dtype = Some("bfloat16".into());
        let without = config("m", "nvidia.com/gpu", 1);
        assert_ne!(with_dtype.fingerprint(), without.fingerprint());
    }
}
