use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm_gateway::{user_message, CompletionApi};

/// Closed action vocabulary. Anything the model emits outside this set maps
/// to `Unknown` and the dispatcher answers with its generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenApp,
    OpenFolder,
    SearchWeb,
    SearchYoutube,
    PlayYoutube,
    OpenWebsite,
    ScreenClick,
    ScreenAnalyze,
    TypeText,
    PressKey,
    Scroll,
    SearchFiles,
    OpenFile,
    Conversation,
    SystemCommand,
    Unknown,
}

impl Action {
    pub fn from_tag(tag: &str) -> Action {
        match tag.trim().to_uppercase().as_str() {
            "OPEN_APP" => Action::OpenApp,
            "OPEN_FOLDER" => Action::OpenFolder,
            "SEARCH_WEB" => Action::SearchWeb,
            "SEARCH_YOUTUBE" => Action::SearchYoutube,
            "PLAY_YOUTUBE" => Action::PlayYoutube,
            "OPEN_WEBSITE" => Action::OpenWebsite,
            "SCREEN_CLICK" => Action::ScreenClick,
            "SCREEN_ANALYZE" => Action::ScreenAnalyze,
            "TYPE_TEXT" => Action::TypeText,
            "PRESS_KEY" => Action::PressKey,
            "SCROLL" => Action::Scroll,
            "SEARCH_FILES" => Action::SearchFiles,
            "OPEN_FILE" => Action::OpenFile,
            "CONVERSATION" => Action::Conversation,
            "SYSTEM_COMMAND" => Action::SystemCommand,
            _ => Action::Unknown,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Action::OpenApp => "OPEN_APP",
            Action::OpenFolder => "OPEN_FOLDER",
            Action::SearchWeb => "SEARCH_WEB",
            Action::SearchYoutube => "SEARCH_YOUTUBE",
            Action::PlayYoutube => "PLAY_YOUTUBE",
            Action::OpenWebsite => "OPEN_WEBSITE",
            Action::ScreenClick => "SCREEN_CLICK",
            Action::ScreenAnalyze => "SCREEN_ANALYZE",
            Action::TypeText => "TYPE_TEXT",
            Action::PressKey => "PRESS_KEY",
            Action::Scroll => "SCROLL",
            Action::SearchFiles => "SEARCH_FILES",
            Action::OpenFile => "OPEN_FILE",
            Action::Conversation => "CONVERSATION",
            Action::SystemCommand => "SYSTEM_COMMAND",
            Action::Unknown => "UNKNOWN",
        }
    }
}

/// Structured result of interpreting one command.
#[derive(Debug, Clone)]
pub struct Intent {
    pub action: Action,
    pub target: String,
    pub reasoning: String,
    pub executable_hints: Vec<String>,
    pub folder_paths: Vec<String>,
    pub params: HashMap<String, Value>,
    pub response: String,
}

impl Intent {
    pub fn conversation(response: &str) -> Self {
        Intent {
            action: Action::Conversation,
            target: String::new(),
            reasoning: "Parse error".to_string(),
            executable_hints: Vec::new(),
            folder_paths: Vec::new(),
            params: HashMap::new(),
            response: response.to_string(),
        }
    }

    pub fn param_str(&self, key: &str) -> Option<String> {
        self.params.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }
}

/// Wire shape the model is asked for; lenient on every field but `action`.
#[derive(Debug, Deserialize, Serialize)]
struct RawIntent {
    #[serde(default)]
    action: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    executable_hints: Vec<String>,
    #[serde(default)]
    folder_paths: Vec<String>,
    #[serde(default)]
    params: HashMap<String, Value>,
    #[serde(default)]
    response: String,
}

/// Strip Markdown code-fence wrappers the model likes to add around JSON.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Locate the first JSON object in free-form text. Bounded scanner: tracks
/// string/escape state and brace depth; if the braces never balance, falls
/// back to the greedy first-`{` .. last-`}` span.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse a raw model response into an Intent. Never fails: malformed or
/// missing JSON degrades to a CONVERSATION intent echoing the text.
pub fn parse_intent_response(raw: &str) -> Intent {
    let text = strip_code_fences(raw);

    let Some(span) = extract_json_object(&text) else {
        return Intent::conversation(&text);
    };

    match serde_json::from_str::<RawIntent>(span) {
        Ok(parsed) => Intent {
            action: Action::from_tag(&parsed.action),
            target: parsed.target,
            reasoning: parsed.reasoning,
            executable_hints: parsed.executable_hints,
            folder_paths: parsed.folder_paths,
            params: parsed.params,
            response: parsed.response,
        },
        Err(err) => {
            debug!(%err, "intent JSON rejected, degrading to conversation");
            Intent::conversation(&text)
        }
    }
}

/// Deterministic guard over the three YouTube-adjacent outcomes. The model
/// prompt states the same rules, but phrasing drift misclassifies often
/// enough that the final word stays lexical:
///   - playback verbs (play / watch / listen / put on) => PLAY_YOUTUBE,
///   - an explicit "search" mentioning youtube => SEARCH_YOUTUBE,
///   - opening the bare youtube home page => OPEN_WEBSITE("youtube").
/// Exactly one of the three (or none) fires for any command.
pub fn media_override(command: &str) -> Option<(Action, String)> {
    let lower = command.to_lowercase();
    if lower.contains("http://") || lower.contains("https://") {
        return None;
    }
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let mentions_youtube = tokens.iter().any(|t| *t == "youtube");
    let explicit_search = tokens.iter().any(|t| *t == "search");

    if explicit_search {
        if mentions_youtube {
            // Keep the search phrase verbatim; only the framing tokens
            // around it are stripped.
            let mut rest: Vec<&str> = tokens.iter().filter(|t| **t != "search").copied().collect();
            while matches!(rest.first(), Some(&"youtube") | Some(&"for") | Some(&"on")) {
                rest.remove(0);
            }
            while rest.last() == Some(&"youtube") {
                rest.pop();
                if matches!(rest.last(), Some(&"on") | Some(&"in") | Some(&"for")) {
                    rest.pop();
                }
            }
            if !rest.is_empty() {
                return Some((Action::SearchYoutube, rest.join(" ")));
            }
        }
        return None;
    }

    if mentions_youtube {
        let leftover: Vec<&str> = tokens
            .iter()
            .filter(|t| !matches!(**t, "open" | "go" | "to" | "the" | "launch" | "visit" | "youtube"))
            .copied()
            .collect();
        if leftover.is_empty() {
            return Some((Action::OpenWebsite, "youtube".to_string()));
        }
    }

    let mut keyword_at = None;
    let mut skip = 1;
    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "play" | "watch" | "listen" => {
                keyword_at = Some(i);
                break;
            }
            "put" if tokens.get(i + 1) == Some(&"on") => {
                keyword_at = Some(i);
                skip = 2;
                break;
            }
            _ => {}
        }
    }

    let start = keyword_at? + skip;
    let mut rest: Vec<&str> = tokens.get(start..)?.to_vec();
    if rest.first() == Some(&"to") {
        rest.remove(0);
    }
    while rest.last() == Some(&"youtube") {
        rest.pop();
        if matches!(rest.last(), Some(&"on") | Some(&"in")) {
            rest.pop();
        }
    }
    let target = rest.join(" ");
    if target.is_empty() {
        None
    } else {
        Some((Action::PlayYoutube, target))
    }
}

/// Builds the single interpretation prompt: action vocabulary, OS family,
/// and up to 50 indexed app names as grounding context.
pub fn build_interpretation_prompt(command: &str, os_family: &str, apps: &[String]) -> String {
    let apps_context = if apps.is_empty() {
        "Scanning...".to_string()
    } else {
        apps.iter().take(50).cloned().collect::<Vec<_>>().join(", ")
    };

    format!(
        r#"You are a desktop assistant with COMPLETE system control capabilities.

CRITICAL: Respond with VALID JSON only. No markdown, no extra text.

Available Actions:
1. OPEN_APP - Open application
2. OPEN_FOLDER - Open folder
3. SEARCH_WEB - Google search
4. SEARCH_YOUTUBE - YouTube search (search only)
5. PLAY_YOUTUBE - Play YouTube video directly
6. OPEN_WEBSITE - Open website (for specific sites)
7. SCREEN_CLICK - Click on screen
8. SCREEN_ANALYZE - Analyze screen
9. TYPE_TEXT - Type text
10. PRESS_KEY - Press key/combination
11. SCROLL - Scroll up/down
12. SEARCH_FILES - Search files/folders
13. OPEN_FILE - Open specific file/folder
14. CONVERSATION - General chat
15. SYSTEM_COMMAND - Execute command

System: {os_family}
Detected Apps: {apps_context}

JSON Format:
{{
    "action": "ACTION_TYPE",
    "target": "target/query",
    "reasoning": "why this action",
    "executable_hints": ["possible", "executables"],
    "folder_paths": ["possible/paths"],
    "params": {{"direction": "up/down", "amount": 3, "key": "enter"}},
    "response": "user message"
}}

CRITICAL YOUTUBE RULES:
1. PLAY_YOUTUBE = When user wants to PLAY/WATCH/LISTEN
   - Keywords: "play", "watch", "listen", "put on"
   - Examples: "play despacito", "watch tutorial", "listen to music"
   - Target is search terms only, never a URL
2. SEARCH_YOUTUBE = ONLY when user explicitly says "search"
3. OPEN_WEBSITE = When opening the YouTube homepage: target should be "youtube"

Examples:
"open chrome" -> {{"action": "OPEN_APP", "target": "chrome", "response": "Opening Chrome"}}
"play despacito" -> {{"action": "PLAY_YOUTUBE", "target": "despacito", "response": "Playing despacito"}}
"open youtube" -> {{"action": "OPEN_WEBSITE", "target": "youtube", "response": "Opening YouTube"}}
"scroll down" -> {{"action": "SCROLL", "target": "down", "params": {{"direction": "down", "amount": 3}}, "response": "Scrolling"}}

Now interpret: {command}"#
    )
}

/// The intent parser: prompt construction plus fault-tolerant response
/// recovery over the completion gateway.
pub struct Interpreter {
    llm: Arc<dyn CompletionApi>,
    os_family: &'static str,
}

impl Interpreter {
    pub fn new(llm: Arc<dyn CompletionApi>, os_family: &'static str) -> Self {
        Self { llm, os_family }
    }

    /// Interpret a command against the current app context. Returns `None`
    /// only when the gateway call itself fails; every response, however
    /// malformed, yields an Intent.
    pub async fn interpret(&self, command: &str, apps_context: &[String]) -> Option<Intent> {
        let prompt = build_interpretation_prompt(command, self.os_family, apps_context);
        let response = match self.llm.call(user_message(&prompt), false).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "interpretation call failed");
                return None;
            }
        };

        let mut intent = parse_intent_response(&response);
        if let Some((action, target)) = media_override(command) {
            if override_applies(&intent, command) && (intent.action != action || intent.target.is_empty()) {
                debug!(from = intent.action.tag(), to = action.tag(), "media partition override");
                intent.action = action;
                intent.target = target;
            }
        }
        Some(intent)
    }
}

/// The lexical partition may only correct intents that are themselves inside
/// the partition (or unresolvable). A concrete unrelated action like OPEN_APP
/// is the model's call: "open google play store" contains a playback verb but
/// is an app launch, and the override must not hijack it.
fn override_applies(intent: &Intent, command: &str) -> bool {
    match intent.action {
        Action::PlayYoutube | Action::SearchYoutube | Action::Unknown => true,
        Action::OpenWebsite => {
            intent.target.is_empty() || intent.target.to_lowercase().contains("youtube")
        }
        // Genuine chat stays chat unless the command itself is about YouTube
        // (the usual sign the reply degraded from unparseable JSON).
        Action::Conversation => command.to_lowercase().contains("youtube"),
        _ => false,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;

    /// Canned completion backend for parser and dispatcher tests.
    pub struct StubApi {
        pub reply: Result<String, String>,
    }

    impl StubApi {
        pub fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.to_string()) })
        }

        pub fn fail(message: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(message.to_string()) })
        }
    }

    #[async_trait]
    impl CompletionApi for StubApi {
        async fn call(&self, _messages: Vec<Value>, _use_vision: bool) -> Result<String, AppError> {
            self.reply.clone().map_err(AppError::Api)
        }
    }

    #[test]
    fn extracts_object_from_prose() {
        let text = "Sure! Here you go: {\"action\": \"OPEN_APP\"} hope that helps";
        assert_eq!(extract_json_object(text), Some("{\"action\": \"OPEN_APP\"}"));
    }

    #[test]
    fn extracts_nested_object() {
        let text = "{\"a\": {\"b\": 1}, \"c\": \"x}\"}";
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn unbalanced_braces_fall_back_to_greedy_span() {
        let text = "{\"action\": \"SCROLL\", \"params\": {\"amount\": 3}";
        // No balanced close; greedy span still hands something to serde,
        // whose failure then degrades to conversation.
        let span = extract_json_object(text).unwrap();
        assert!(span.starts_with('{'));
        let intent = parse_intent_response(text);
        assert_eq!(intent.action, Action::Conversation);
    }

    #[test]
    fn non_json_text_degrades_to_conversation() {
        let intent = parse_intent_response("I think you mean hello");
        assert_eq!(intent.action, Action::Conversation);
        assert_eq!(intent.response, "I think you mean hello");
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "```json\n{\"action\": \"OPEN_APP\", \"target\": \"chrome\", \"response\": \"Opening Chrome\"}\n```";
        let intent = parse_intent_response(raw);
        assert_eq!(intent.action, Action::OpenApp);
        assert_eq!(intent.target, "chrome");
    }

    #[test]
    fn unknown_action_tag_maps_to_unknown() {
        let intent = parse_intent_response("{\"action\": \"LAUNCH_MISSILES\", \"target\": \"x\"}");
        assert_eq!(intent.action, Action::Unknown);
    }

    #[test]
    fn action_tags_round_trip() {
        for action in [
            Action::OpenApp,
            Action::OpenFolder,
            Action::SearchWeb,
            Action::SearchYoutube,
            Action::PlayYoutube,
            Action::OpenWebsite,
            Action::ScreenClick,
            Action::ScreenAnalyze,
            Action::TypeText,
            Action::PressKey,
            Action::Scroll,
            Action::SearchFiles,
            Action::OpenFile,
            Action::Conversation,
            Action::SystemCommand,
        ] {
            assert_eq!(Action::from_tag(action.tag()), action);
        }
    }

    #[test]
    fn playback_phrasings_classify_as_play() {
        for command in [
            "play despacito",
            "watch lofi hip hop",
            "listen to miles davis",
            "put on some jazz",
            "play despacito on youtube",
        ] {
            let (action, target) = media_override(command).unwrap();
            assert_eq!(action, Action::PlayYoutube, "{command}");
            assert!(!target.is_empty());
            assert!(!target.contains("youtube"), "{target}");
        }
    }

    #[test]
    fn explicit_search_classifies_as_search() {
        let (action, target) = media_override("search youtube for cat videos").unwrap();
        assert_eq!(action, Action::SearchYoutube);
        assert_eq!(target, "cat videos");
    }

    #[test]
    fn explicit_search_keeps_the_phrase_intact() {
        let (action, target) = media_override("search for rust tutorials on youtube").unwrap();
        assert_eq!(action, Action::SearchYoutube);
        assert_eq!(target, "rust tutorials");

        let (_, target) = media_override("search youtube for recipes for dinner").unwrap();
        assert_eq!(target, "recipes for dinner");
    }

    #[test]
    fn bare_youtube_open_is_website() {
        for command in ["open youtube", "go to youtube", "youtube"] {
            let (action, target) = media_override(command).unwrap();
            assert_eq!(action, Action::OpenWebsite, "{command}");
            assert_eq!(target, "youtube");
        }
    }

    #[test]
    fn partition_is_mutually_exclusive() {
        // Each representative phrasing lands in exactly one bucket.
        let cases = [
            ("play despacito", Action::PlayYoutube),
            ("watch a rust tutorial", Action::PlayYoutube),
            ("listen to music", Action::PlayYoutube),
            ("put on the news", Action::PlayYoutube),
            ("search youtube for rust tutorials", Action::SearchYoutube),
            ("open youtube", Action::OpenWebsite),
        ];
        for (command, expected) in cases {
            let (action, _) = media_override(command).unwrap();
            assert_eq!(action, expected, "{command}");
        }
    }

    #[test]
    fn unrelated_commands_are_untouched() {
        assert!(media_override("open chrome").is_none());
        assert!(media_override("find my resume").is_none());
        assert!(media_override("scroll down").is_none());
        assert!(media_override("play https://example.com/video").is_none());
    }

    #[test]
    fn prompt_substitutes_placeholder_while_cache_empty() {
        let prompt = build_interpretation_prompt("open chrome", "Linux", &[]);
        assert!(prompt.contains("Scanning..."));
        let apps = vec!["chrome".to_string(), "firefox".to_string()];
        let prompt = build_interpretation_prompt("open chrome", "Linux", &apps);
        assert!(prompt.contains("chrome, firefox"));
    }

    #[tokio::test]
    async fn interpret_returns_none_on_gateway_failure() {
        let interpreter = Interpreter::new(StubApi::fail("connection refused"), "Linux");
        assert!(interpreter.interpret("open chrome", &[]).await.is_none());
    }

    #[tokio::test]
    async fn interpret_recovers_free_text_reply() {
        let interpreter = Interpreter::new(StubApi::ok("I think you mean hello"), "Linux");
        let intent = interpreter.interpret("hello there", &[]).await.unwrap();
        assert_eq!(intent.action, Action::Conversation);
        assert_eq!(intent.response, "I think you mean hello");
    }

    #[tokio::test]
    async fn interpret_trusts_model_for_app_names_with_playback_verbs() {
        for (command, target) in [
            ("open google play store", "google play store"),
            ("open apple watch settings", "apple watch settings"),
        ] {
            let raw = format!(
                "{{\"action\": \"OPEN_APP\", \"target\": \"{target}\", \"response\": \"Opening\"}}"
            );
            let interpreter = Interpreter::new(StubApi::ok(&raw), "Linux");
            let intent = interpreter.interpret(command, &[]).await.unwrap();
            assert_eq!(intent.action, Action::OpenApp, "{command}");
            assert_eq!(intent.target, target, "{command}");
        }
    }

    #[tokio::test]
    async fn interpret_trusts_model_for_conversational_playback_phrases() {
        let raw = "{\"action\": \"CONVERSATION\", \"target\": \"\", \"response\": \"Careful!\"}";
        let interpreter = Interpreter::new(StubApi::ok(raw), "Linux");
        let intent = interpreter.interpret("watch out", &[]).await.unwrap();
        assert_eq!(intent.action, Action::Conversation);
        assert_eq!(intent.response, "Careful!");
    }

    #[tokio::test]
    async fn interpret_applies_media_partition_over_model_output() {
        let raw = "{\"action\": \"SEARCH_YOUTUBE\", \"target\": \"despacito\", \"response\": \"Searching\"}";
        let interpreter = Interpreter::new(StubApi::ok(raw), "Linux");
        let intent = interpreter.interpret("play despacito", &[]).await.unwrap();
        assert_eq!(intent.action, Action::PlayYoutube);
        assert_eq!(intent.target, "despacito");
    }
}
