//! Policy port: the opaque inference capability.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{ActionChunk, ImageFrame, PolicyError};
use serde::{Deserialize, Serialize};

/// Supported policy families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Action chunking transformer.
    Act,
    /// Vision-language-action flow model.
    Pi0,
    /// Autoregressive variant of `Pi0`.
    Pi0Fast,
    /// Small vision-language-action model.
    SmolVla,
    /// Diffusion policy.
    Diffusion,
}

impl PolicyKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Act,
        Self::Pi0,
        Self::Pi0Fast,
        Self::SmolVla,
        Self::Diffusion,
    ];

    /// Parse a policy type tag (case-insensitive).
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(tag.trim()))
    }

    /// Wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Pi0 => "pi0",
            Self::Pi0Fast => "pi0fast",
            Self::SmolVla => "smolvla",
            Self::Diffusion => "diffusion",
        }
    }

    /// Whether this kind consumes a language instruction.
    pub fn supports_language(self) -> bool {
        matches!(self, Self::Pi0 | Self::Pi0Fast | Self::SmolVla)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model a session runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    /// Checkpoint path or hub id.
    pub path: String,
    /// Policy family.
    #[serde(rename = "type")]
    pub kind: PolicyKind,
}

/// External inference capability.
///
/// `predict` may take arbitrarily long; the inference loop bounds it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyPort: Send + Sync {
    /// Predict the next chunk of actions from the latest observation.
    ///
    /// `joint_state` is in canonical joint order. `instruction` is only
    /// supplied to language-capable policies.
    async fn predict(
        &self,
        images: HashMap<String, ImageFrame>,
        joint_state: Vec<f32>,
        instruction: Option<String>,
    ) -> Result<ActionChunk, PolicyError>;

    /// Free-form model description for diagnostics.
    fn model_info(&self) -> Option<serde_json::Value> {
        None
    }

    /// Drop any internal temporal state (action buffers, observation history).
    fn reset(&self) {}
}

/// Everything a factory needs to load a policy for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyLoadRequest {
    /// Model to load.
    pub descriptor: PolicyDescriptor,
    /// Cameras the session will feed, in configuration order.
    pub camera_names: Vec<String>,
    /// Language instruction, already filtered by capability.
    pub instruction: Option<String>,
}

/// Loads policies of one kind.
#[async_trait]
pub trait PolicyFactory: Send + Sync {
    /// Load a policy instance for a session.
    async fn load(&self, request: &PolicyLoadRequest) -> Result<Arc<dyn PolicyPort>, PolicyError>;
}

/// Policy that returns the same chunk on every call.
///
/// Useful for simulation and dry runs where no model is available.
pub struct FixedChunkPolicy {
    chunk: ActionChunk,
    info: serde_json::Value,
}

impl FixedChunkPolicy {
    /// Create a policy that always predicts `chunk`.
    pub fn new(chunk: ActionChunk) -> Self {
        let info = serde_json::json!({
            "name": "fixed_chunk",
            "chunk_len": chunk.len(),
        });
        Self { chunk, info }
    }
}

#[async_trait]
impl PolicyPort for FixedChunkPolicy {
    async fn predict(
        &self,
        _images: HashMap<String, ImageFrame>,
        _joint_state: Vec<f32>,
        _instruction: Option<String>,
    ) -> Result<ActionChunk, PolicyError> {
        Ok(self.chunk.clone())
    }

    fn model_info(&self) -> Option<serde_json::Value> {
        Some(self.info.clone())
    }
}

/// Factory producing [`FixedChunkPolicy`] instances.
pub struct FixedChunkFactory {
    chunk: ActionChunk,
}

impl FixedChunkFactory {
    /// Factory whose policies always predict `chunk`.
    pub fn new(chunk: ActionChunk) -> Self {
        Self { chunk }
    }
}

#[async_trait]
impl PolicyFactory for FixedChunkFactory {
    async fn load(&self, request: &PolicyLoadRequest) -> Result<Arc<dyn PolicyPort>, PolicyError> {
        if request.descriptor.path.trim().is_empty() {
            return Err(PolicyError::Load("empty policy path".into()));
        }
        Ok(Arc::new(FixedChunkPolicy::new(self.chunk.clone())))
    }
}
