//! Generation Pipeline domain (spec §4.D, §4.F, §4.G, §4.I): the
//! Generation Repository, Worker Pool, Intake Controller and the unified
//! Timeline Query.

pub mod api;
pub mod domain;
pub mod repository;
pub mod worker;

pub use domain::{
    Generation, GenerationEvent, GenerationState, GenerationStateMachine, GenerationStatus,
    ImageInput, OperationType, OperationTypeName, PromptComposer, PromptTemplate, ReferenceType,
    StateError, Upload, UploadPurpose, DEFAULT_MODEL,
};
pub use repository::{
    GenerationsRepository, OperationTypeRepository, PromptTemplateRepository, UploadRepository,
};
pub use worker::{GenerationJobPayload, GenerationProcessor};

pub use api::{routes, GenerationsState};
