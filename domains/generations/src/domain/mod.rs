//! Domain types for generations: entities, the state machine, the
//! normalized image input sum type, and prompt composition.

pub mod entities;
pub mod image_input;
pub mod prompt;
pub mod state;

pub use entities::{
    Generation, GenerationStatus, OperationType, OperationTypeName, PromptTemplate,
    ReferenceType, Upload, UploadPurpose, DEFAULT_MODEL,
};
pub use image_input::ImageInput;
pub use prompt::PromptComposer;
pub use state::{GenerationEvent, GenerationState, GenerationStateMachine, StateError};
