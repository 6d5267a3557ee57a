//! Champion promotion: point the registry alias at the best run of an experiment.
//!
//! The procedure is a straight line of registry calls. Any registry failure aborts it
//! as-is; a crash between removing and re-setting the alias leaves no champion.

use homelens_core::{RegistryApi, RegistryError, Run, RunSearch};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PromotionPlan {
    pub model_name: String,
    pub experiment: String,
    pub metric: String,
    pub alias: String,
    pub artifact_path: String,
    pub dry_run: bool,
}

impl Default for PromotionPlan {
    fn default() -> Self {
        Self {
            model_name: "homelens-ca-model".into(),
            experiment: "HomeLens CA-DL Research".into(),
            metric: "test_r2_score".into(),
            alias: "champion".into(),
            artifact_path: "model".into(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// No run has a positive value for the metric.
    NoCandidate,
    AlreadyChampion { run_id: String },
    WouldPromote { run_id: String, previous_version: Option<String> },
    Promoted { run_id: String, previous_version: Option<String>, new_version: String },
}

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("experiment {0:?} not found")]
    UnknownExperiment(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Registry source for a run's model: `<artifact_uri>/<path>`, or a `runs:/` URI when
/// the run reports no artifact location.
pub fn model_source(run: &Run, artifact_path: &str) -> String {
    let path = artifact_path.trim_matches('/');
    if run.info.artifact_uri.is_empty() {
        format!("runs:/{}/{path}", run.info.run_id)
    } else {
        format!("{}/{path}", run.info.artifact_uri.trim_end_matches('/'))
    }
}

pub async fn promote_champion(registry: &dyn RegistryApi, plan: &PromotionPlan) -> Result<Promotion, PromoteError> {
    let champion = match registry.get_model_version_by_alias(&plan.model_name, &plan.alias).await {
        Ok(mv) => {
            info!(run_id = %mv.run_id, version = %mv.version, "current champion");
            Some(mv)
        }
        Err(e) if e.is_not_found() => {
            warn!(model = %plan.model_name, alias = %plan.alias, "no version holds the alias");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let experiment = registry.get_experiment_by_name(&plan.experiment).await.map_err(|e| {
        if e.is_not_found() { PromoteError::UnknownExperiment(plan.experiment.clone()) } else { e.into() }
    })?;
    let runs = registry.search_runs(&RunSearch::top_by_metric(&experiment.experiment_id, &plan.metric)).await?;
    let Some(best) = runs.into_iter().next() else {
        info!(metric = %plan.metric, "no runs found with the specified metric");
        return Ok(Promotion::NoCandidate);
    };
    let run_id = best.info.run_id.clone();
    info!(run_id = %run_id, score = ?best.metric(&plan.metric), "current best run");

    if champion.as_ref().is_some_and(|c| c.run_id == run_id) {
        info!("best run is already the champion");
        return Ok(Promotion::AlreadyChampion { run_id });
    }
    let previous_version = champion.map(|c| c.version);
    if plan.dry_run {
        info!(run_id = %run_id, ?previous_version, "dry run, registry left untouched");
        return Ok(Promotion::WouldPromote { run_id, previous_version });
    }

    if previous_version.is_some() {
        registry.delete_alias(&plan.model_name, &plan.alias).await?;
        info!(alias = %plan.alias, "removed alias from previous champion");
    }
    let source = model_source(&best, &plan.artifact_path);
    let mv = registry.create_model_version(&plan.model_name, &source, &run_id).await?;
    info!(version = %mv.version, source = %source, "registered new model version");
    registry.set_alias(&plan.model_name, &plan.alias, &mv.version).await?;
    info!(version = %mv.version, "updated champion model");
    Ok(Promotion::Promoted { run_id, previous_version, new_version: mv.version })
}
