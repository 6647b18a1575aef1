//! Registry-to-source bridge: one-way mirror of model versions into the
//! versioned source.
//!
//! Mirror state is derived from the source repository itself: a file at
//! `applications/{run_id}.yaml` means "already mirrored". No local state.

use benchkube_ports::{ModelRegistry, RegisteredModelVersion, SourceClient, SourceLocation};
use benchkube_shared::{Clock, ErrorEnvelope, RequestContext, Result};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Folder the mirrored application files land in.
pub const APPLICATIONS_FOLDER: &str = "applications";
/// Template path within the source repository.
pub const TEMPLATE_PATH: &str = "template/job.yaml";

/// Dependencies for the registry bridge.
#[derive(Clone)]
pub struct BridgeDeps {
    /// Upstream model registry.
    pub registry: Arc<dyn ModelRegistry>,
    /// Versioned-source client.
    pub source: Arc<dyn SourceClient>,
    /// Clock for rendered timestamps.
    pub clock: Arc<dyn Clock>,
    /// Target repository location.
    pub location: SourceLocation,
}

/// Outcome of one bridge tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeOutcome {
    /// New files committed.
    pub mirrored: u32,
    /// Existing files whose `global` block was updated.
    pub updated: u32,
}

/// One bridge tick: mirror new versions, update changed ones.
pub async fn bridge_tick(ctx: &RequestContext, deps: &BridgeDeps) -> Result<BridgeOutcome> {
    let versions = deps.registry.list_model_versions(ctx).await?;
    if versions.is_empty() {
        return Ok(BridgeOutcome::default());
    }

    let existing = deps
        .source
        .list_folder(ctx, &deps.location, APPLICATIONS_FOLDER)
        .await?;
    let mirrored: BTreeMap<Box<str>, Box<str>> = existing
        .into_iter()
        .filter_map(|entry| {
            entry
                .name
                .strip_suffix(".yaml")
                .map(|run_id| (run_id.into(), entry.path))
        })
        .collect();

    let template = deps
        .source
        .fetch_file(ctx, &deps.location, TEMPLATE_PATH)
        .await?;
    let template = String::from_utf8(template.content)
        .map_err(|_| ErrorEnvelope::invalid("bridge template is not UTF-8"))?;

    let mut outcome = BridgeOutcome::default();
    for version in versions {
        ctx.ensure_not_cancelled("bridge.version")?;
        match mirrored.get(&version.run_id) {
            None => {
                let rendered = render_template(&template, &version, deps.clock.now_ms());
                let path = format!("{APPLICATIONS_FOLDER}/{}.yaml", version.run_id);
                deps.source
                    .put_file(
                        ctx,
                        &deps.location,
                        &path,
                        rendered.as_bytes(),
                        &format!("mirror model version {}", version.run_id),
                    )
                    .await?;
                info!(run_id = %version.run_id, "bridge.mirrored");
                outcome.mirrored = outcome.mirrored.saturating_add(1);
            },
            Some(path) => {
                match refresh_global_block(ctx, deps, path, &version).await {
                    Ok(true) => outcome.updated = outcome.updated.saturating_add(1),
                    Ok(false) => {},
                    Err(error) => {
                        warn!(run_id = %version.run_id, error = %error, "bridge.update failed");
                    },
                }
            },
        }
    }
    Ok(outcome)
}

/// Render the template by literal placeholder substitution.
///
/// The placeholder set is closed (`run_id`, `experiment_id`, `timestamp`,
/// `model_name`, `model_version`), so no template engine is involved.
#[must_use]
pub fn render_template(template: &str, version: &RegisteredModelVersion, now_ms: u64) -> String {
    template
        .replace("{run_id}", &version.run_id)
        .replace("{experiment_id}", &version.experiment_id)
        .replace("{timestamp}", &now_ms.to_string())
        .replace("{model_name}", &version.model_name)
        .replace("{model_version}", &version.model_version)
}

/// Update the file's `global` block when model name/version changed.
async fn refresh_global_block(
    ctx: &RequestContext,
    deps: &BridgeDeps,
    path: &str,
    version: &RegisteredModelVersion,
) -> Result<bool> {
    let blob = deps.source.fetch_file(ctx, &deps.location, path).await?;
    let text = String::from_utf8(blob.content)
        .map_err(|_| ErrorEnvelope::invalid("mirrored file is not UTF-8"))?;
    let mut value: Value = serde_yaml_ng::from_str(&text)
        .map_err(|error| ErrorEnvelope::invalid(format!("mirrored file is not YAML: {error}")))?;

    let global = value
        .get_mut("global")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| ErrorEnvelope::invalid("mirrored file has no `global` block"))?;

    let current_name = global
        .get("model_name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let current_version = global
        .get("model_version")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if current_name == version.model_name.as_ref()
        && current_version == version.model_version.as_ref()
    {
        return Ok(false);
    }

    global.insert(
        Value::String("model_name".to_string()),
        Value::String(version.model_name.to_string()),
    );
    global.insert(
        Value::String("model_version".to_string()),
        Value::String(version.model_version.to_string()),
    );

    let rendered = serde_yaml_ng::to_string(&value)
        .map_err(|error| ErrorEnvelope::invalid(format!("mirrored file render failed: {error}")))?;
    deps.source
        .put_file(
            ctx,
            &deps.location,
            path,
            rendered.as_bytes(),
            &format!("update model version {}", version.run_id),
        )
        .await?;
    info!(run_id = %version.run_id, "bridge.global_updated");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitution_is_literal() {
        let template = concat!(
            "global:\n",
            "  model_name: \"{model_name}\"\n",
            "  model_version: \"{model_version}\"\n",
            "run: {run_id}-{experiment_id}-{timestamp}\n",
        );
        let version = RegisteredModelVersion {
            run_id: "r42".into(),
            experiment_id: "e7".into(),
            model_name: "llama".into(),
            model_version: "3".into(),
            created_at_ms: 0,
        };
        let rendered = render_template(template, &version, 1234);
        assert!(rendered.contains("model_name: \"llama\""));
        assert!(rendered.contains("run: r42-e7-1234"));
        assert!(!rendered.contains('{'));
    }
}
