//! # External Collaborators
//!
//! Interfaces to the systems the promotion pipeline drives but does not own: the model
//! registry, the batch scoring service, the serving platform and the notification
//! transport. Each trait ships with an in-memory implementation used by the server's
//! simulation mode and by the test suite.

pub mod error;
pub mod model_registry;
pub mod notifier;
pub mod scoring;
pub mod serving_target;

pub use error::{CollaboratorError, CollaboratorResult, InjectedFaults};
pub use model_registry::{
    ArtifactCopy, ArtifactPromotion, ContainerDefinition, InMemoryModelRegistry, ModelRegistry,
    RegisteredModel, S3Uri,
};
pub use notifier::{
    ApprovalNotification, FallbackNotifier, LoggingNotifier, Notifier, RecordingNotifier,
};
pub use scoring::{InMemoryScoringService, ScoringService};
pub use serving_target::{
    CaptureMode, DataCaptureConfig, EndpointConfiguration, EndpointDescription,
    InMemoryServingTarget, ProductionVariant, ServingTarget, VariantSummary, STATUS_CREATING,
    STATUS_IN_SERVICE, STATUS_UPDATING,
};
