use std::process::Command;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::interpreter::{extract_json_object, strip_code_fences};

/// Screen and input seam; the default impl shells out to platform tools,
/// tests substitute a scripted stub.
pub trait ScreenControl: Send + Sync {
    /// PNG capture, base64-encoded, with the screen dimensions.
    fn capture(&self) -> Option<ScreenShot>;
    /// Click at a position given as percentages (0-100) of the screen.
    fn click_percent(&self, x_percent: f64, y_percent: f64) -> bool;
    fn scroll(&self, direction: &str, amount: i64) -> bool;
    fn type_text(&self, text: &str) -> bool;
    fn press_key(&self, key: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct ScreenShot {
    pub png_base64: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenPosition {
    pub x: f64,
    pub y: f64,
}

/// Structured verdict of a vision call over a screenshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisionAnalysis {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target_description: String,
    #[serde(default)]
    pub approximate_position: Option<ScreenPosition>,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub response: String,
}

impl VisionAnalysis {
    pub fn information(response: &str) -> Self {
        VisionAnalysis {
            action: "INFORMATION".to_string(),
            response: response.to_string(),
            target_description: String::new(),
            approximate_position: None,
            confidence: String::new(),
            reasoning: String::new(),
        }
    }

    pub fn click_position(&self) -> Option<&ScreenPosition> {
        if self.action == "CLICK" {
            self.approximate_position.as_ref()
        } else {
            None
        }
    }
}

pub fn build_vision_prompt(user_query: &str) -> String {
    format!(
        r#"Analyze this screenshot and help with: "{user_query}"

Respond with JSON ONLY:
{{
    "action": "CLICK" | "INFORMATION" | "NOT_FOUND",
    "target_description": "what to interact with",
    "approximate_position": {{"x": percent_x, "y": percent_y}},
    "confidence": "high" | "medium" | "low",
    "reasoning": "what you found",
    "response": "user message"
}}

For clicks: provide x,y as percentages (0-100) of screen size.
For information: describe what you see."#
    )
}

/// Parse a vision response; free text degrades to an INFORMATION verdict.
pub fn parse_vision_response(raw: &str) -> VisionAnalysis {
    let text = strip_code_fences(raw);
    extract_json_object(&text)
        .and_then(|span| serde_json::from_str::<VisionAnalysis>(span).ok())
        .unwrap_or_else(|| VisionAnalysis::information(&text))
}

pub fn percent_to_pixels(x_percent: f64, y_percent: f64, width: u32, height: u32) -> (i64, i64) {
    let x = (width as f64 * x_percent / 100.0) as i64;
    let y = (height as f64 * y_percent / 100.0) as i64;
    (x, y)
}

/// Default backend driving platform input tools (xdotool on Linux,
/// osascript on macOS, PowerShell on Windows).
pub struct ShellScreen;

impl ShellScreen {
    fn screen_size(&self) -> (u32, u32) {
        if cfg!(target_os = "linux") {
            if let Some(out) = run_capture("xdotool", &["getdisplaygeometry"]) {
                let mut parts = out.split_whitespace();
                if let (Some(w), Some(h)) = (
                    parts.next().and_then(|v| v.parse().ok()),
                    parts.next().and_then(|v| v.parse().ok()),
                ) {
                    return (w, h);
                }
            }
        }
        (1920, 1080)
    }
}

impl ScreenControl for ShellScreen {
    fn capture(&self) -> Option<ScreenShot> {
        let path = std::env::temp_dir().join(format!("deskpilot-shot-{}.png", std::process::id()));
        let file = path.display().to_string();
        let ok = if cfg!(target_os = "macos") {
            run_status("screencapture", &["-x", &file])
        } else if cfg!(target_os = "windows") {
            false
        } else {
            run_status("gnome-screenshot", &["-f", &file])
                || run_status("import", &["-window", "root", &file])
                || run_status("grim", &[&file])
        };
        if !ok {
            warn!("screen capture failed");
            return None;
        }

        let bytes = std::fs::read(&path).ok()?;
        let _ = std::fs::remove_file(&path);
        let (width, height) = self.screen_size();
        Some(ScreenShot {
            png_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            width,
            height,
        })
    }

    fn click_percent(&self, x_percent: f64, y_percent: f64) -> bool {
        let (width, height) = self.screen_size();
        let (x, y) = percent_to_pixels(x_percent, y_percent, width, height);
        if cfg!(target_os = "macos") {
            let script = format!(
                "tell application \"System Events\" to click at {{{x}, {y}}}"
            );
            run_status("osascript", &["-e", &script])
        } else if cfg!(target_os = "windows") {
            false
        } else {
            run_status("xdotool", &["mousemove", &x.to_string(), &y.to_string()])
                && run_status("xdotool", &["click", "1"])
        }
    }

    fn scroll(&self, direction: &str, amount: i64) -> bool {
        let up = matches!(direction.to_lowercase().as_str(), "up" | "top");
        let down = matches!(direction.to_lowercase().as_str(), "down" | "bottom");
        if !up && !down {
            warn!(direction, "invalid scroll direction");
            return false;
        }
        let repeat = amount.max(1).to_string();
        if cfg!(target_os = "macos") {
            // Page up / page down key codes, repeated.
            let code = if up { "116" } else { "121" };
            let script = format!(
                "tell application \"System Events\" to repeat {repeat} times\nkey code {code}\nend repeat"
            );
            run_status("osascript", &["-e", &script])
        } else if cfg!(target_os = "windows") {
            false
        } else {
            let button = if up { "4" } else { "5" };
            run_status("xdotool", &["click", "--repeat", &repeat, button])
        }
    }

    fn type_text(&self, text: &str) -> bool {
        if cfg!(target_os = "macos") {
            let script = format!(
                "tell application \"System Events\" to keystroke \"{}\"",
                text.replace('\\', "\\\\").replace('"', "\\\"")
            );
            run_status("osascript", &["-e", &script])
        } else if cfg!(target_os = "windows") {
            false
        } else {
            run_status("xdotool", &["type", "--delay", "50", text])
        }
    }

    fn press_key(&self, key: &str) -> bool {
        if cfg!(target_os = "macos") {
            let script = mac_keystroke_script(key);
            run_status("osascript", &["-e", &script])
        } else if cfg!(target_os = "windows") {
            false
        } else {
            run_status("xdotool", &["key", key])
        }
    }
}

fn mac_keystroke_script(key: &str) -> String {
    if let Some((modifiers, base)) = key.rsplit_once('+') {
        let using: Vec<String> = modifiers
            .split('+')
            .map(|m| match m.trim() {
                "ctrl" | "control" => "control down".to_string(),
                "cmd" | "command" => "command down".to_string(),
                "alt" | "option" => "option down".to_string(),
                "shift" => "shift down".to_string(),
                other => format!("{other} down"),
            })
            .collect();
        format!(
            "tell application \"System Events\" to keystroke \"{}\" using {{{}}}",
            base.trim(),
            using.join(", ")
        )
    } else {
        format!("tell application \"System Events\" to keystroke \"{key}\"")
    }
}

fn run_status(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn run_capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_verdict_exposes_position() {
        let raw = r#"{"action": "CLICK", "approximate_position": {"x": 40, "y": 75}, "confidence": "high", "response": "Clicking"}"#;
        let analysis = parse_vision_response(raw);
        let pos = analysis.click_position().unwrap();
        assert_eq!(pos.x, 40.0);
        assert_eq!(pos.y, 75.0);
    }

    #[test]
    fn information_verdict_has_no_click() {
        let raw = r#"{"action": "INFORMATION", "response": "A browser window"}"#;
        let analysis = parse_vision_response(raw);
        assert!(analysis.click_position().is_none());
        assert_eq!(analysis.response, "A browser window");
    }

    #[test]
    fn free_text_degrades_to_information() {
        let analysis = parse_vision_response("I can see a desktop with several icons");
        assert_eq!(analysis.action, "INFORMATION");
        assert_eq!(analysis.response, "I can see a desktop with several icons");
    }

    #[test]
    fn percent_math_maps_to_pixels() {
        assert_eq!(percent_to_pixels(50.0, 50.0, 1920, 1080), (960, 540));
        assert_eq!(percent_to_pixels(0.0, 100.0, 1920, 1080), (0, 1080));
    }

    #[test]
    fn mac_combo_builds_modifier_clause() {
        let script = mac_keystroke_script("ctrl+c");
        assert!(script.contains("keystroke \"c\""));
        assert!(script.contains("control down"));
        let plain = mac_keystroke_script("enter");
        assert!(!plain.contains("using"));
    }
}
