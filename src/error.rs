use thiserror::Error;

/// Failures surfaced by the Gemini adapter, grouped by the stage they
/// interrupt. Messages are written for direct display.
#[derive(Debug, Error)]
pub enum AiError {
    /// The adapter could not be constructed, so chat is disabled for the
    /// lifetime of the process.
    #[error("Could not initialize the AI chat: {0}")]
    Initialization(String),

    /// Campaign text or image generation failed. Resubmitting is allowed.
    #[error("{0}")]
    Generation(String),

    /// A chat reply stream ended early. Fragments already delivered stay
    /// visible.
    #[error("{0}")]
    Streaming(String),
}
