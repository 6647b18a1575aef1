//! Validated runtime settings assembled from the environment.

use crate::env::{
    ENV_BRIDGE_REFERENCE, ENV_BRIDGE_REPOSITORY, ENV_DEFAULT_NAMESPACE, ENV_DEPLOYER_PORT,
    ENV_DEPLOYMENT_TIMEOUT, ENV_EVAL_PORT,
    ENV_EVAL_SWEEP_INTERVAL_SECONDS, ENV_EVALUATION_DELAY_MINUTES, ENV_JOB_MAX_FAILURES,
    ENV_KUBECONFIG, ENV_LOG_TAIL_LINES, ENV_MONGO_URL, ENV_POLLING_INTERVAL,
    ENV_RECONCILE_INTERVAL_SECONDS,
    ENV_RECONCILE_PARALLELISM, ENV_REGISTRY_API_URL, ENV_SERVER_HOST, ENV_SOURCE_API_URL,
    ENV_SOURCE_TOKEN, ENV_TERMINAL_IDLE_TIMEOUT_MINUTES, ENV_VLLM_MAX_FAILURES, ENV_VLLM_PORT,
    EnvMap, optional, required, u16_or, u32_or, u64_or,
};
use benchkube_domain::Namespace;
use benchkube_shared::{ErrorEnvelope, SecretString};
use url::Url;

/// Default base URL for the versioned source API.
pub const DEFAULT_SOURCE_API_URL: &str = "https://api.github.com";
/// Default bind host.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Validated settings shared by all benchkube services.
#[derive(Debug, Clone)]
pub struct Settings {
    /// MongoDB connection string.
    pub mongo_url: Box<str>,
    /// Optional kubeconfig path; in-cluster config when unset.
    pub kubeconfig: Option<Box<str>>,
    /// Source API credential.
    pub source_token: Option<SecretString>,
    /// Base URL of the versioned source API.
    pub source_api_url: Url,
    /// Base URL of the model registry API, when the bridge is enabled.
    pub registry_api_url: Option<Url>,
    /// `(owner, repository)` the registry bridge commits into.
    pub bridge_repository: Option<(Box<str>, Box<str>)>,
    /// Branch the registry bridge commits to.
    pub bridge_reference: Box<str>,
    /// Namespace used when a request does not name one.
    pub default_namespace: Namespace,
    /// Default log lines returned by observability endpoints.
    pub log_tail_lines: u32,
    /// Deployment apply/await timeout in seconds.
    pub deployment_timeout_secs: u64,
    /// Delay before a scheduled evaluation fires, in minutes.
    pub evaluation_delay_minutes: u64,
    /// Registry bridge poll interval in seconds.
    pub polling_interval_secs: u64,
    /// Deployment reconciler tick interval in seconds.
    pub reconcile_interval_secs: u64,
    /// Evaluation sweeper tick interval in seconds.
    pub eval_sweep_interval_secs: u64,
    /// Per-sweep parallel status call cap.
    pub reconcile_parallelism: u32,
    /// Failure budget for benchmark jobs.
    pub job_max_failures: u32,
    /// Failure budget for vLLM deployments.
    pub vllm_max_failures: u32,
    /// Terminal idle timeout in minutes.
    pub terminal_idle_timeout_minutes: u64,
    /// Bind host shared by all listeners.
    pub server_host: Box<str>,
    /// Benchmark deployer listener port.
    pub deployer_port: u16,
    /// vLLM management listener port.
    pub vllm_port: u16,
    /// Evaluation scheduler listener port.
    pub eval_port: u16,
}

impl Settings {
    /// Evaluation delay in milliseconds.
    #[must_use]
    pub const fn evaluation_delay_ms(&self) -> u64 {
        self.evaluation_delay_minutes * 60 * 1000
    }

    /// Terminal idle timeout in milliseconds.
    #[must_use]
    pub const fn terminal_idle_timeout_ms(&self) -> u64 {
        self.terminal_idle_timeout_minutes * 60 * 1000
    }
}

/// Parse and validate settings from an environment snapshot.
///
/// Fails fast with `invalid` on the first unusable value; the binary maps
/// that to a non-zero exit.
pub fn load_settings(env: &EnvMap) -> Result<Settings, ErrorEnvelope> {
    let mongo_url: Box<str> = required(env, ENV_MONGO_URL)?.into();

    let source_api_url = parse_url(
        optional(env, ENV_SOURCE_API_URL).unwrap_or(DEFAULT_SOURCE_API_URL),
        ENV_SOURCE_API_URL,
    )?;
    let registry_api_url = optional(env, ENV_REGISTRY_API_URL)
        .map(|raw| parse_url(raw, ENV_REGISTRY_API_URL))
        .transpose()?;
    let bridge_repository = optional(env, ENV_BRIDGE_REPOSITORY)
        .map(|raw| {
            raw.split_once('/')
                .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
                .map(|(owner, repo)| (Box::from(owner), Box::from(repo)))
                .ok_or_else(|| {
                    ErrorEnvelope::invalid(format!(
                        "{ENV_BRIDGE_REPOSITORY} must look like `owner/repo`"
                    ))
                })
        })
        .transpose()?;

    let default_namespace = match optional(env, ENV_DEFAULT_NAMESPACE) {
        Some(raw) => Namespace::parse(raw)?,
        None => Namespace::default_namespace(),
    };

    let settings = Settings {
        mongo_url,
        kubeconfig: optional(env, ENV_KUBECONFIG).map(Into::into),
        source_token: optional(env, ENV_SOURCE_TOKEN).map(SecretString::from),
        source_api_url,
        registry_api_url,
        bridge_repository,
        bridge_reference: optional(env, ENV_BRIDGE_REFERENCE).unwrap_or("main").into(),
        default_namespace,
        log_tail_lines: u32_or(env, ENV_LOG_TAIL_LINES, 100)?,
        deployment_timeout_secs: u64_or(env, ENV_DEPLOYMENT_TIMEOUT, 600)?,
        evaluation_delay_minutes: u64_or(env, ENV_EVALUATION_DELAY_MINUTES, 30)?,
        polling_interval_secs: u64_or(env, ENV_POLLING_INTERVAL, 60)?,
        reconcile_interval_secs: u64_or(env, ENV_RECONCILE_INTERVAL_SECONDS, 30)?,
        eval_sweep_interval_secs: u64_or(env, ENV_EVAL_SWEEP_INTERVAL_SECONDS, 30)?,
        reconcile_parallelism: u32_or(env, ENV_RECONCILE_PARALLELISM, 16)?,
        job_max_failures: u32_or(env, ENV_JOB_MAX_FAILURES, 3)?,
        vllm_max_failures: u32_or(env, ENV_VLLM_MAX_FAILURES, 2)?,
        terminal_idle_timeout_minutes: u64_or(env, ENV_TERMINAL_IDLE_TIMEOUT_MINUTES, 30)?,
        server_host: optional(env, ENV_SERVER_HOST)
            .unwrap_or(DEFAULT_SERVER_HOST)
            .into(),
        deployer_port: u16_or(env, ENV_DEPLOYER_PORT, 8080)?,
        vllm_port: u16_or(env, ENV_VLLM_PORT, 8081)?,
        eval_port: u16_or(env, ENV_EVAL_PORT, 8082)?,
    };

    validate(&settings)?;
    Ok(settings)
}

fn parse_url(raw: &str, key: &str) -> Result<Url, ErrorEnvelope> {
    Url::parse(raw)
        .map_err(|error| ErrorEnvelope::invalid(format!("{key} is not a valid URL: {error}")))
}

fn validate(settings: &Settings) -> Result<(), ErrorEnvelope> {
    if settings.reconcile_interval_secs == 0
        || settings.eval_sweep_interval_secs == 0
        || settings.polling_interval_secs == 0
    {
        return Err(ErrorEnvelope::invalid("loop intervals must be positive"));
    }
    if settings.reconcile_parallelism == 0 {
        return Err(ErrorEnvelope::invalid(
            "RECONCILE_PARALLELISM must be positive",
        ));
    }
    let mut ports = [
        settings.deployer_port,
        settings.vllm_port,
        settings.eval_port,
    ];
    ports.sort_unstable();
    if ports.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(ErrorEnvelope::invalid(
            "service ports must be pairwise distinct",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_env() -> EnvMap {
        [(ENV_MONGO_URL.to_string(), "mongodb://db:27017/bench".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = load_settings(&minimal_env()).expect("settings parse");
        assert_eq!(settings.default_namespace.as_str(), "default");
        assert_eq!(settings.log_tail_lines, 100);
        assert_eq!(settings.deployment_timeout_secs, 600);
        assert_eq!(settings.evaluation_delay_minutes, 30);
        assert_eq!(settings.polling_interval_secs, 60);
        assert_eq!(settings.reconcile_interval_secs, 30);
        assert_eq!(settings.job_max_failures, 3);
        assert_eq!(settings.vllm_max_failures, 2);
        assert_eq!(settings.evaluation_delay_ms(), 30 * 60 * 1000);
    }

    #[test]
    fn missing_mongo_url_fails_fast() {
        assert!(load_settings(&EnvMap::new()).is_err());
    }

    #[test]
    fn duplicate_ports_are_rejected() {
        let mut env = minimal_env();
        env.insert(ENV_DEPLOYER_PORT.to_string(), "9000".to_string());
        env.insert(ENV_VLLM_PORT.to_string(), "9000".to_string());
        assert!(load_settings(&env).is_err());
    }

    #[test]
    fn secret_token_is_wrapped() {
        let mut env = minimal_env();
        env.insert(ENV_SOURCE_TOKEN.to_string(), "ghp_secret".to_string());
        let settings = load_settings(&env).expect("settings parse");
        let token = settings.source_token.expect("token present");
        assert_eq!(format!("{token}"), benchkube_shared::REDACTED);
        assert_eq!(token.expose(), "ghp_secret");
    }
}
