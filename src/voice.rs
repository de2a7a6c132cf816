use tracing::info;

/// Speech seam. The HTTP server runs voiceless, so the default backend
/// echoes; a real TTS/STT engine slots in behind the same trait.
pub trait Speech: Send + Sync {
    /// Speak (or echo) the text; returns what was said for the envelope.
    fn speak(&self, text: &str) -> String;
    fn listen(&self) -> Option<String>;
    fn is_available(&self) -> bool {
        false
    }
}

/// Console echo backend used in server mode.
pub struct ConsoleVoice;

impl Speech for ConsoleVoice {
    fn speak(&self, text: &str) -> String {
        info!(text, "assistant says");
        text.to_string()
    }

    fn listen(&self) -> Option<String> {
        None
    }
}
