//! Normalized upload input (spec SS9 redesign flag): the Intake Controller
//! canonicalizes every "file OR id OR both" request shape down to this sum
//! type before enqueue, so the worker only ever sees `Uploaded` ids.

use uuid::Uuid;

/// Either a reference to an already-persisted `Upload` row the caller owns,
/// or raw bytes the intake controller has not yet stored.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Uploaded { upload_id: Uuid },
    Fresh { bytes: Vec<u8>, mime: String, filename: String },
}

impl ImageInput {
    pub fn is_fresh(&self) -> bool {
        matches!(self, ImageInput::Fresh { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_distinguishes_variants() {
        let uploaded = ImageInput::Uploaded { upload_id: Uuid::new_v4() };
        let fresh = ImageInput::Fresh {
            bytes: vec![1, 2, 3],
            mime: "image/png".to_string(),
            filename: "ref.png".to_string(),
        };
        assert!(!uploaded.is_fresh());
        assert!(fresh.is_fresh());
    }
}
