//! Model registration: publish sandbox artifacts into the project bucket and register a
//! servable model identity.

use super::error::{CollaboratorError, CollaboratorResult, InjectedFaults};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket/key pair parsed from an `s3://bucket/key` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a URI; the scheme is matched case-insensitively
    pub fn parse(uri: &str) -> Result<Self, String> {
        let scheme = uri.get(..5).unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("s3://") {
            return Err(format!("s3 uri must begin with 's3://': got {uri}"));
        }
        let rest = &uri[5..];
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(format!("s3 uri has no bucket: {uri}"));
        }
        Ok(Self::new(bucket, key))
    }

    pub fn is_s3_uri(value: &str) -> bool {
        value
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("s3://"))
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCopy {
    pub source: S3Uri,
    pub destination: S3Uri,
}

/// Serving container for a registered model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    #[serde(default)]
    pub image: String,
    pub model_data_url: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Everything needed to move a candidate from the sandbox into the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPromotion {
    pub model_name: String,
    pub folder: String,
    pub copies: Vec<ArtifactCopy>,
    pub primary_container: ContainerDefinition,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub model_name: String,
    pub model_arn: String,
}

#[async_trait]
pub trait ModelRegistry: Send + Sync + fmt::Debug {
    /// Copy the artifacts and register the model; returns the servable identity
    async fn publish(&self, promotion: &ArtifactPromotion) -> CollaboratorResult<RegisteredModel>;
}

/// Registry that records promotions instead of calling a model platform
#[derive(Debug, Default)]
pub struct InMemoryModelRegistry {
    published: Mutex<Vec<ArtifactPromotion>>,
    faults: InjectedFaults,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }

    pub fn published(&self) -> Vec<ArtifactPromotion> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn publish(&self, promotion: &ArtifactPromotion) -> CollaboratorResult<RegisteredModel> {
        self.faults.next()?;

        let mut published = self.published.lock();
        if published.iter().any(|p| p.model_name == promotion.model_name) {
            return Err(CollaboratorError::rejected(
                "model_registry",
                format!("model {} already exists", promotion.model_name),
            ));
        }
        published.push(promotion.clone());

        Ok(RegisteredModel {
            model_name: promotion.model_name.clone(),
            model_arn: format!("arn:promoter:model/{}", promotion.model_name),
        })
    }
}
