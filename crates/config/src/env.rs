//! Environment variable names and typed accessors.

use benchkube_shared::{ErrorEnvelope, redact_if_secret};
use std::collections::BTreeMap;

/// Env var: MongoDB connection string (required).
pub const ENV_MONGO_URL: &str = "MONGO_URL";
/// Env var: kubeconfig path; in-cluster config is used when unset.
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
/// Env var: opaque credential for the versioned source (secret).
pub const ENV_SOURCE_TOKEN: &str = "SOURCE_TOKEN";
/// Env var: base URL of the versioned source API.
pub const ENV_SOURCE_API_URL: &str = "SOURCE_API_URL";
/// Env var: base URL of the model registry API.
pub const ENV_REGISTRY_API_URL: &str = "REGISTRY_API_URL";
/// Env var: `owner/repo` the registry bridge commits into.
pub const ENV_BRIDGE_REPOSITORY: &str = "BRIDGE_REPOSITORY";
/// Env var: branch the registry bridge commits to.
pub const ENV_BRIDGE_REFERENCE: &str = "BRIDGE_REFERENCE";
/// Env var: namespace used when a request does not name one.
pub const ENV_DEFAULT_NAMESPACE: &str = "DEFAULT_NAMESPACE";
/// Env var: default number of log lines returned by observability endpoints.
pub const ENV_LOG_TAIL_LINES: &str = "LOG_TAIL_LINES";
/// Env var: deployment apply/await timeout in seconds.
pub const ENV_DEPLOYMENT_TIMEOUT: &str = "DEPLOYMENT_TIMEOUT";
/// Env var: delay before a scheduled evaluation fires, in minutes.
pub const ENV_EVALUATION_DELAY_MINUTES: &str = "EVALUATION_DELAY_MINUTES";
/// Env var: registry bridge poll interval in seconds.
pub const ENV_POLLING_INTERVAL: &str = "POLLING_INTERVAL";
/// Env var: deployment reconciler tick interval in seconds.
pub const ENV_RECONCILE_INTERVAL_SECONDS: &str = "RECONCILE_INTERVAL_SECONDS";
/// Env var: evaluation sweeper tick interval in seconds.
pub const ENV_EVAL_SWEEP_INTERVAL_SECONDS: &str = "EVAL_SWEEP_INTERVAL_SECONDS";
/// Env var: per-sweep parallel status call cap.
pub const ENV_RECONCILE_PARALLELISM: &str = "RECONCILE_PARALLELISM";
/// Env var: failure budget for benchmark jobs.
pub const ENV_JOB_MAX_FAILURES: &str = "JOB_MAX_FAILURES";
/// Env var: failure budget for vLLM deployments (stricter).
pub const ENV_VLLM_MAX_FAILURES: &str = "VLLM_MAX_FAILURES";
/// Env var: terminal session idle timeout in minutes.
pub const ENV_TERMINAL_IDLE_TIMEOUT_MINUTES: &str = "TERMINAL_IDLE_TIMEOUT_MINUTES";
/// Env var: bind host shared by all service listeners.
pub const ENV_SERVER_HOST: &str = "SERVER_HOST";
/// Env var: benchmark deployer listener port.
pub const ENV_DEPLOYER_PORT: &str = "BENCH_DEPLOYER_PORT";
/// Env var: vLLM management listener port.
pub const ENV_VLLM_PORT: &str = "BENCH_VLLM_PORT";
/// Env var: evaluation scheduler listener port.
pub const ENV_EVAL_PORT: &str = "BENCH_EVAL_PORT";

/// Snapshot of the process environment used for parsing.
pub type EnvMap = BTreeMap<String, String>;

/// Capture the process environment as an [`EnvMap`].
#[must_use]
pub fn env_from_process() -> EnvMap {
    std::env::vars().collect()
}

/// Fetch a required variable; `invalid` when missing or empty.
pub fn required<'a>(env: &'a EnvMap, key: &str) -> Result<&'a str, ErrorEnvelope> {
    match env.get(key).map(String::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ErrorEnvelope::invalid(format!(
            "required environment variable {key} is not set"
        ))),
    }
}

/// Fetch an optional variable (empty counts as unset).
#[must_use]
pub fn optional<'a>(env: &'a EnvMap, key: &str) -> Option<&'a str> {
    env.get(key)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Parse an optional unsigned integer with a default.
pub fn u64_or(env: &EnvMap, key: &str, default: u64) -> Result<u64, ErrorEnvelope> {
    parse_or(env, key, default)
}

/// Parse an optional `u32` with a default.
pub fn u32_or(env: &EnvMap, key: &str, default: u32) -> Result<u32, ErrorEnvelope> {
    parse_or(env, key, default)
}

/// Parse an optional `u16` with a default.
pub fn u16_or(env: &EnvMap, key: &str, default: u16) -> Result<u16, ErrorEnvelope> {
    parse_or(env, key, default)
}

fn parse_or<T: std::str::FromStr>(
    env: &EnvMap,
    key: &str,
    default: T,
) -> Result<T, ErrorEnvelope> {
    match optional(env, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ErrorEnvelope::invalid(format!("environment variable {key} has an invalid value"))
                .with_metadata("value", redact_if_secret(key, raw))
        }),
    }
}

/// Every variable the services recognize.
pub const RECOGNIZED_ENV_VARS: [&str; 22] = [
    ENV_MONGO_URL,
    ENV_KUBECONFIG,
    ENV_SOURCE_TOKEN,
    ENV_SOURCE_API_URL,
    ENV_REGISTRY_API_URL,
    ENV_BRIDGE_REPOSITORY,
    ENV_BRIDGE_REFERENCE,
    ENV_DEFAULT_NAMESPACE,
    ENV_LOG_TAIL_LINES,
    ENV_DEPLOYMENT_TIMEOUT,
    ENV_EVALUATION_DELAY_MINUTES,
    ENV_POLLING_INTERVAL,
    ENV_RECONCILE_INTERVAL_SECONDS,
    ENV_EVAL_SWEEP_INTERVAL_SECONDS,
    ENV_RECONCILE_PARALLELISM,
    ENV_JOB_MAX_FAILURES,
    ENV_VLLM_MAX_FAILURES,
    ENV_TERMINAL_IDLE_TIMEOUT_MINUTES,
    ENV_SERVER_HOST,
    ENV_DEPLOYER_PORT,
    ENV_VLLM_PORT,
    ENV_EVAL_PORT,
];

/// Render the recognized environment for startup diagnostics.
///
/// Only recognized variables appear; secret-named values are dropped
/// wholesale and connection strings lose any embedded credentials.
#[must_use]
pub fn describe_env(env: &EnvMap) -> BTreeMap<String, String> {
    RECOGNIZED_ENV_VARS
        .iter()
        .filter_map(|key| {
            env.get(*key)
                .map(|value| ((*key).to_string(), redact_if_secret(key, value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn required_rejects_missing_and_empty() {
        assert!(required(&env(&[]), ENV_MONGO_URL).is_err());
        assert!(required(&env(&[(ENV_MONGO_URL, "  ")]), ENV_MONGO_URL).is_err());
        let ok = required(
            &env(&[(ENV_MONGO_URL, "mongodb://db:27017")]),
            ENV_MONGO_URL,
        );
        assert_eq!(ok.ok(), Some("mongodb://db:27017"));
    }

    #[test]
    fn numeric_parsing_is_strict() {
        let bad = u32_or(&env(&[(ENV_LOG_TAIL_LINES, "lots")]), ENV_LOG_TAIL_LINES, 100);
        assert!(bad.is_err());
        let defaulted = u32_or(&env(&[]), ENV_LOG_TAIL_LINES, 100);
        assert_eq!(defaulted.ok(), Some(100));
    }

    #[test]
    fn describe_env_reports_only_recognized_vars_and_redacts() {
        let snapshot = env(&[
            (ENV_MONGO_URL, "mongodb://ops:hunter2@db:27017/bench"),
            (ENV_SOURCE_TOKEN, "ghp_abc"),
            (ENV_DEFAULT_NAMESPACE, "bench"),
            ("PATH", "/usr/bin"),
        ]);
        let described = describe_env(&snapshot);

        assert_eq!(
            described.get(ENV_MONGO_URL).map(String::as_str),
            Some("mongodb://[REDACTED]@db:27017/bench"),
            "embedded connection-string credentials are masked"
        );
        assert_eq!(
            described.get(ENV_SOURCE_TOKEN).map(String::as_str),
            Some(benchkube_shared::REDACTED)
        );
        assert_eq!(
            described.get(ENV_DEFAULT_NAMESPACE).map(String::as_str),
            Some("bench")
        );
        assert!(!described.contains_key("PATH"), "unrecognized vars are omitted");
    }

    #[test]
    fn invalid_secret_values_are_redacted_in_errors() {
        let error = u64_or(&env(&[(ENV_SOURCE_TOKEN, "oops")]), ENV_SOURCE_TOKEN, 0)
            .err()
            .map(|error| error.metadata);
        let metadata = error.unwrap_or_default();
        assert_eq!(
            metadata.get("value").map(String::as_str),
            Some(benchkube_shared::REDACTED)
        );
    }
}
