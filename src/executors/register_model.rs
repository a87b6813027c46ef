//! # Model Registration
//!
//! Promote a candidate from the data scientist's sandbox into the project: copy its
//! artifacts under `models/{experiment}/{trial}` in the project bucket, rewrite the
//! serving container to point at the copies, and register the model.
//!
//! A container whose environment still references the sandbox (`s3://` values other than
//! the submit directory) cannot be promoted and fails the step without retry.

use super::task_executor::{StepError, TaskExecutor, TaskInput, TaskOutcome};
use crate::collaborators::{
    ArtifactCopy, ArtifactPromotion, ContainerDefinition, ModelRegistry, S3Uri,
};
use crate::constants::{executors, pointers};
use crate::utils::{append_timestamp, Clock};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Container environment key holding the inference code bundle
pub const SUBMIT_DIRECTORY_ENV: &str = "SAGEMAKER_SUBMIT_DIRECTORY";
/// Training hyperparameter holding the JSON-encoded training code bundle
pub const SUBMIT_DIRECTORY_HYPERPARAMETER: &str = "sagemaker_submit_directory";

/// `/input/training_job`
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingJob {
    pub training_job_name: String,
    pub experiment_name: String,
    pub trial_name: String,
    pub model_artifacts_uri: String,
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, String>,
}

/// `/input/model`
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateModel {
    pub primary_container: ContainerDefinition,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterModelParameters {
    #[serde(default)]
    model_name_prefix: Option<String>,
}

/// Rewrite a container definition to serve from promoted artifacts
pub fn promote_container(
    container: &ContainerDefinition,
    new_data_uri: &str,
    new_submit_uri: Option<&str>,
) -> Result<ContainerDefinition, StepError> {
    let mut promoted = container.clone();
    promoted.model_data_url = new_data_uri.to_string();

    match new_submit_uri {
        Some(uri) => {
            promoted
                .environment
                .insert(SUBMIT_DIRECTORY_ENV.to_string(), uri.to_string());
        }
        None => {
            if promoted
                .environment
                .get(SUBMIT_DIRECTORY_ENV)
                .is_some_and(|v| !v.is_empty())
            {
                return Err(StepError::failed(
                    "model has a submit directory but no replacement was provided",
                ));
            }
        }
    }

    if let Some((key, _)) = promoted
        .environment
        .iter()
        .find(|(k, v)| k.as_str() != SUBMIT_DIRECTORY_ENV && S3Uri::is_s3_uri(v))
    {
        return Err(StepError::failed(format!(
            "container environment variable '{key}' references a non-promoted s3 artifact"
        )));
    }

    Ok(promoted)
}

fn parse_uri(uri: &str) -> Result<S3Uri, StepError> {
    S3Uri::parse(uri).map_err(StepError::failed)
}

/// Build the promotion plan for a training job and its candidate model
pub fn plan_promotion(
    training_job: &TrainingJob,
    model: &CandidateModel,
    bucket: &str,
    model_name: String,
) -> Result<ArtifactPromotion, StepError> {
    let folder = format!(
        "models/{}/{}",
        training_job.experiment_name, training_job.trial_name
    );
    let destination = |file: &str| S3Uri::new(bucket, format!("{folder}/{file}"));
    let mut copies = Vec::new();

    copies.push(ArtifactCopy {
        source: parse_uri(&training_job.model_artifacts_uri)?,
        destination: destination("model-train.tar.gz"),
    });

    let model_tar = destination("model.tar.gz");
    copies.push(ArtifactCopy {
        source: parse_uri(&model.primary_container.model_data_url)?,
        destination: model_tar.clone(),
    });

    if let Some(encoded) = training_job
        .hyperparameters
        .get(SUBMIT_DIRECTORY_HYPERPARAMETER)
    {
        // Hyperparameters are JSON-encoded to carry non-string types
        let uri: String = serde_json::from_str(encoded).map_err(|e| {
            StepError::failed(format!(
                "invalid {SUBMIT_DIRECTORY_HYPERPARAMETER} hyperparameter: {e}"
            ))
        })?;
        copies.push(ArtifactCopy {
            source: parse_uri(&uri)?,
            destination: destination("train-sourcedir.tar.gz"),
        });
    }

    let inference_tar = match model.primary_container.environment.get(SUBMIT_DIRECTORY_ENV) {
        Some(uri) if !uri.is_empty() => {
            let target = destination("inference.tar.gz");
            copies.push(ArtifactCopy {
                source: parse_uri(uri)?,
                destination: target.clone(),
            });
            Some(target.to_string())
        }
        _ => None,
    };

    let primary_container = promote_container(
        &model.primary_container,
        &model_tar.to_string(),
        inference_tar.as_deref(),
    )?;

    let tags = BTreeMap::from([
        ("Pipeline-Status".to_string(), "New".to_string()),
        ("ExperimentName".to_string(), training_job.experiment_name.clone()),
        ("TrialName".to_string(), training_job.trial_name.clone()),
        ("TrainingJobName".to_string(), training_job.training_job_name.clone()),
    ]);

    Ok(ArtifactPromotion {
        model_name,
        folder,
        copies,
        primary_container,
        tags,
    })
}

#[derive(Debug)]
pub struct RegisterModelExecutor {
    registry: Arc<dyn ModelRegistry>,
    artifact_bucket: String,
    clock: Arc<dyn Clock>,
}

impl RegisterModelExecutor {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        artifact_bucket: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            artifact_bucket,
            clock,
        }
    }
}

#[async_trait]
impl TaskExecutor for RegisterModelExecutor {
    fn name(&self) -> &str {
        executors::REGISTER_MODEL
    }

    async fn execute(&self, input: TaskInput<'_>) -> Result<TaskOutcome, StepError> {
        let parameters: RegisterModelParameters = input.parameters_as()?;
        let training_job: TrainingJob =
            serde_json::from_value(input.require(pointers::TRAINING_JOB)?.clone())
                .map_err(|e| StepError::failed(format!("invalid training job descriptor: {e}")))?;
        let model: CandidateModel = serde_json::from_value(input.require(pointers::MODEL)?.clone())
            .map_err(|e| StepError::failed(format!("invalid model descriptor: {e}")))?;

        let prefix = parameters.model_name_prefix.as_deref().unwrap_or("pipeline");
        let model_name = append_timestamp(prefix, self.clock.now());
        let promotion = plan_promotion(&training_job, &model, &self.artifact_bucket, model_name)?;

        let registered = self.registry.publish(&promotion).await?;
        info!(
            execution_id = %input.execution_id,
            model_name = %registered.model_name,
            folder = %promotion.folder,
            artifacts = promotion.copies.len(),
            "Registered candidate model"
        );

        Ok(TaskOutcome::Completed(json!({
            "model_name": registered.model_name,
            "model_arn": registered.model_arn,
            "folder": promotion.folder,
            "model_data_url": promotion.primary_container.model_data_url,
            "artifacts": promotion
                .copies
                .iter()
                .map(|c| c.destination.to_string())
                .collect::<Vec<_>>(),
        })))
    }
}
