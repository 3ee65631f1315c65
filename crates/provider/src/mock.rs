//! Mock generative client: configurable scripted outcomes, for unit tests
//! and local development. Grounded on `MockRenderService`'s
//! programmable-behavior + request-history shape.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{GenerateRequest, GenerateResult, GenerativeClient, ProviderError};

/// One scripted step: either a successful image or an error message (fed
/// through `error_from_message` classification, same as a real HTTP error
/// body would be).
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Image { bytes: Vec<u8>, mime: String },
    Error(String),
}

pub struct MockGenerativeClient {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    history: Mutex<Vec<GenerateRequest>>,
}

impl MockGenerativeClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes to return in order, one per `call`. When the script
    /// is empty, `call` defaults to returning a 1x1 PNG stand-in.
    pub fn push_outcome(&self, outcome: ScriptedOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn recorded_requests(&self) -> Vec<GenerateRequest> {
        self.history.lock().unwrap().clone()
    }
}

impl Default for MockGenerativeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn call(&self, request: &GenerateRequest) -> Result<GenerateResult, ProviderError> {
        self.history.lock().unwrap().push(request.clone());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedOutcome::Image { bytes, mime }) => Ok(GenerateResult {
                image_bytes: bytes,
                mime,
            }),
            Some(ScriptedOutcome::Error(message)) => Err(crate::error_from_message(message)),
            None => Ok(GenerateResult {
                image_bytes: vec![0x89, 0x50, 0x4e, 0x47],
                mime: "image/png".to_string(),
            }),
        }
    }
}
