use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime-replaceable LLM settings. The rest of `Config` is frozen at
/// startup; these can be swapped through POST /api/config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSettings {
    pub provider: String,
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub vision_model: String,
    pub enable_reasoning: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            api_base: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "openai/gpt-oss-20b:free".to_string(),
            vision_model: "gpt-4o".to_string(),
            enable_reasoning: true,
        }
    }
}

impl LlmSettings {
    /// Copy of the settings with the API key masked to its first 8 chars.
    pub fn masked(&self) -> Self {
        let mut safe = self.clone();
        if !safe.api_key.is_empty() {
            let prefix: String = safe.api_key.chars().take(8).collect();
            safe.api_key = format!("{}...", prefix);
        }
        safe
    }

    /// True when an API key is set and is not an obvious placeholder.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != "YOUR_API_KEY_HERE" && self.api_key.len() > 10
    }
}

/// Voice synthesis parameters, wired through to whichever speech backend is
/// attached. The server runs voiceless; these still travel in status output.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSettings {
    pub rate: u32,
    pub volume: f32,
    pub pitch: f32,
    pub preferred_voice: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 230,
            volume: 1.0,
            pitch: 1.5,
            preferred_voice: "david".to_string(),
        }
    }
}

/// Immutable configuration record, built once at startup with env overrides
/// already applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub voice: VoiceSettings,
    pub os_family: &'static str,
    pub server_port: u16,
    pub debug: bool,
    /// SYSTEM_COMMAND reports success whenever the shell spawn itself worked.
    /// Setting DESKPILOT_STRICT_EXIT_CODES=1 makes success follow the child's
    /// exit status instead.
    pub strict_exit_codes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            voice: VoiceSettings::default(),
            os_family: os_family(),
            server_port: 5000,
            debug: true,
            strict_exit_codes: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Ok(v) = env::var("LLM_PROVIDER") {
            cfg.llm.provider = v;
        }
        if let Ok(v) = env::var("LLM_API_KEY") {
            cfg.llm.api_key = v;
        }
        if let Ok(v) = env::var("LLM_API_BASE") {
            cfg.llm.api_base = v;
        }
        if let Ok(v) = env::var("LLM_MODEL") {
            cfg.llm.model = v;
        }
        if let Ok(v) = env::var("LLM_VISION_MODEL") {
            cfg.llm.vision_model = v;
        }
        if let Ok(v) = env::var("LLM_ENABLE_REASONING") {
            cfg.llm.enable_reasoning = v.eq_ignore_ascii_case("true") || v == "1";
        }

        if let Some(v) = env_parse::<u32>("VOICE_RATE") {
            cfg.voice.rate = v;
        }
        if let Some(v) = env_parse::<f32>("VOICE_VOLUME") {
            cfg.voice.volume = v;
        }
        if let Some(v) = env_parse::<f32>("VOICE_PITCH") {
            cfg.voice.pitch = v;
        }
        if let Ok(v) = env::var("VOICE_PREFERRED_VOICE") {
            cfg.voice.preferred_voice = v;
        }

        if let Some(v) = env_parse::<u16>("DESKPILOT_PORT") {
            cfg.server_port = v;
        }
        if let Ok(v) = env::var("DESKPILOT_DEBUG") {
            cfg.debug = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = env::var("DESKPILOT_STRICT_EXIT_CODES") {
            cfg.strict_exit_codes = v.eq_ignore_ascii_case("true") || v == "1";
        }

        cfg
    }

    /// Directories the file search walks, filtered to those that exist.
    pub fn search_locations(&self) -> Vec<PathBuf> {
        let mut locations = Vec::new();
        if let Some(home) = dirs::home_dir() {
            locations.push(home.clone());
            for sub in ["Desktop", "Documents", "Downloads", "Pictures", "Videos", "Music"] {
                locations.push(home.join(sub));
            }
            if self.os_family == "Windows" {
                locations.push(home.join("OneDrive"));
            }
        }
        if self.os_family == "Darwin" {
            locations.push(PathBuf::from("/Applications"));
        }
        locations.retain(|p| p.exists());
        locations
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// OS family tag embedded into the interpretation prompt, matching the
/// platform names the model is primed with.
pub fn os_family() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "Darwin"
    } else {
        "Linux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_key_keeps_prefix_only() {
        let settings = LlmSettings {
            api_key: "sk-or-v1-abcdef0123456789".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.masked().api_key, "sk-or-v1...");
    }

    #[test]
    fn empty_key_stays_empty_when_masked() {
        let settings = LlmSettings::default();
        assert_eq!(settings.masked().api_key, "");
    }

    #[test]
    fn placeholder_key_is_not_configured() {
        let mut settings = LlmSettings::default();
        settings.api_key = "YOUR_API_KEY_HERE".to_string();
        assert!(!settings.is_configured());
        settings.api_key = "short".to_string();
        assert!(!settings.is_configured());
        settings.api_key = "sk-or-v1-abcdef0123456789".to_string();
        assert!(settings.is_configured());
    }
}
