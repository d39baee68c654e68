//! Speech Transcriber adapter (C11): a thin boundary trait with no bundled
//! implementation, mirroring the teacher's tool-boundary traits in `mcp.rs`
//! (a narrow interface the orchestrator depends on, wired to a concrete
//! backend only at the HTTP layer).

use crate::error::Result;
use async_trait::async_trait;

/// Result of a transcription call.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub transcript: String,
    pub detected_language: String,
}

/// Converts recorded audio into text, handing off to whatever speech-to-text
/// backend the deployment wires in. No default implementation is provided —
/// this crate's scope ends at the adapter boundary.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribes `audio` bytes, optionally hinted with an expected ISO
    /// 639-1 `language_hint`.
    async fn transcribe(&self, audio: &[u8], language_hint: Option<&str>) -> Result<Transcription>;
}

/// Placeholder wired in when no speech-to-text backend is configured. Always
/// fails — this crate's scope ends at the adapter boundary, so a deployment
/// that wants `/chat/speech-to-text` to work must supply a real
/// `SpeechTranscriber`.
pub struct UnconfiguredTranscriber;

#[async_trait]
impl SpeechTranscriber for UnconfiguredTranscriber {
    async fn transcribe(&self, _audio: &[u8], _language_hint: Option<&str>) -> Result<Transcription> {
        Err(crate::error::AgentError::Config(
            "no speech-to-text backend configured".to_string(),
        ))
    }
}
