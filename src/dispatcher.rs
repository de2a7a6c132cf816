use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::app_index::{AppControl, AppIndex};
use crate::config::Config;
use crate::file_search::{FileAccess, FileEntry, FileSearcher};
use crate::folders::{FolderControl, FolderOpener};
use crate::interpreter::{Action, Intent, Interpreter};
use crate::llm_gateway::{vision_message, CompletionApi, LlmClient};
use crate::media::{MediaBackend, YtDlpMedia};
use crate::os_actions::{self, SystemWeb, WebControl};
use crate::screen::{build_vision_prompt, parse_vision_response, ScreenControl, ShellScreen, VisionAnalysis};
use crate::session::SessionContext;
use crate::url_normalizer::UrlNormalizer;
use crate::voice::{ConsoleVoice, Speech};

const EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "goodbye"];

/// Uniform result envelope: exactly one per dispatched command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<FileEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CommandOutcome {
    pub fn ok(action: &str, response: String) -> Self {
        CommandOutcome {
            success: true,
            response,
            action: Some(action.to_string()),
            results: None,
            url: None,
        }
    }

    pub fn failed(action: &str, response: String) -> Self {
        CommandOutcome {
            success: false,
            response,
            action: Some(action.to_string()),
            results: None,
            url: None,
        }
    }

    pub fn rejected(response: &str) -> Self {
        CommandOutcome {
            success: false,
            response: response.to_string(),
            action: None,
            results: None,
            url: None,
        }
    }
}

/// Central coordinator: owns the session context and routes each intent to
/// its capability backend.
pub struct Assistant {
    pub config: Config,
    pub llm: Arc<LlmClient>,
    llm_api: Arc<dyn CompletionApi>,
    interpreter: Interpreter,
    normalizer: UrlNormalizer,
    pub apps: Arc<dyn AppControl>,
    pub folders: Arc<dyn FolderControl>,
    pub files: Arc<dyn FileAccess>,
    pub screen: Arc<dyn ScreenControl>,
    pub media: Arc<dyn MediaBackend>,
    pub voice: Arc<dyn Speech>,
    pub web: Arc<dyn WebControl>,
    pub context: Mutex<SessionContext>,
}

impl Assistant {
    /// Wire up the default OS backends. The app index scan runs here,
    /// synchronously, so the interpretation prompt has context from the
    /// first command on.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone())?);
        let llm_api: Arc<dyn CompletionApi> = llm.clone();
        let searcher = Arc::new(FileSearcher::new(config.search_locations()));
        let folders = Arc::new(FolderOpener::new(searcher.clone()));
        let apps = Arc::new(AppIndex::scan());

        Ok(Self {
            interpreter: Interpreter::new(llm_api.clone(), config.os_family),
            normalizer: UrlNormalizer::new(llm_api.clone()),
            llm,
            llm_api,
            apps,
            folders,
            files: searcher,
            screen: Arc::new(ShellScreen),
            media: Arc::new(YtDlpMedia),
            voice: Arc::new(ConsoleVoice),
            web: Arc::new(SystemWeb),
            context: Mutex::new(SessionContext::default()),
            config,
        })
    }

    /// Test/embedding constructor with every backend injected.
    #[allow(clippy::too_many_arguments)]
    pub fn with_backends(
        config: Config,
        llm_api: Arc<dyn CompletionApi>,
        apps: Arc<dyn AppControl>,
        folders: Arc<dyn FolderControl>,
        files: Arc<dyn FileAccess>,
        screen: Arc<dyn ScreenControl>,
        media: Arc<dyn MediaBackend>,
        voice: Arc<dyn Speech>,
        web: Arc<dyn WebControl>,
    ) -> anyhow::Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone())?);
        Ok(Self {
            interpreter: Interpreter::new(llm_api.clone(), config.os_family),
            normalizer: UrlNormalizer::new(llm_api.clone()),
            llm,
            llm_api,
            apps,
            folders,
            files,
            screen,
            media,
            voice,
            web,
            context: Mutex::new(SessionContext::default()),
            config,
        })
    }

    fn speak(&self, text: &str) -> String {
        self.voice.speak(text)
    }

    /// LLM-backed URL resolution, exposed for /api/verify-url.
    pub async fn resolve_url(&self, site_input: &str) -> String {
        self.normalizer.resolve(site_input).await
    }

    /// Capture the screen and ask the vision model about it.
    pub async fn analyze_screen(&self, user_query: &str) -> Option<VisionAnalysis> {
        let shot = self.screen.capture()?;
        let prompt = build_vision_prompt(user_query);
        match self
            .llm_api
            .call(vision_message(&prompt, &shot.png_base64), true)
            .await
        {
            Ok(response) => Some(parse_vision_response(&response)),
            Err(err) => {
                warn!(%err, "vision analysis failed");
                None
            }
        }
    }

    /// Complete command pipeline: interpret, dispatch, envelope.
    pub async fn process_command(&self, command: &str) -> CommandOutcome {
        let command = command.trim();
        if command.is_empty() {
            return CommandOutcome::rejected("No command received");
        }

        let lower = command.to_lowercase();
        if EXIT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            let response = self.speak("Goodbye!");
            return CommandOutcome::ok("exit", response);
        }

        info!(command, "analyzing command");
        let apps_context = self.apps.app_names();
        let Some(intent) = self.interpreter.interpret(command, &apps_context).await else {
            let response = self.speak("I couldn't understand that.");
            return CommandOutcome::rejected(&response);
        };

        info!(reasoning = %intent.reasoning, action = intent.action.tag(), "intent resolved");
        let outcome = self.execute(command, &intent).await;
        if outcome.success {
            let mut ctx = self.context.lock().expect("session context lock poisoned");
            let action = outcome.action.clone().unwrap_or_default();
            ctx.record_exchange(command, &outcome.response, &action);
        }
        outcome
    }

    async fn execute(&self, command: &str, intent: &Intent) -> CommandOutcome {
        match intent.action {
            Action::Scroll => {
                let direction = intent
                    .param_str("direction")
                    .unwrap_or_else(|| intent.target.clone());
                let amount = intent.param_i64("amount").unwrap_or(3);
                let success = self.screen.scroll(&direction, amount);
                self.envelope("scroll", success, intent, "Couldn't scroll the screen.")
            }

            Action::TypeText => {
                let success = self.screen.type_text(&intent.target);
                self.envelope("type", success, intent, "Couldn't type the text.")
            }

            Action::PressKey => {
                let key = intent
                    .param_str("key")
                    .unwrap_or_else(|| intent.target.clone());
                let success = self.screen.press_key(&key);
                self.envelope("keypress", success, intent, "Couldn't press that key.")
            }

            Action::SearchFiles => self.search_files(intent),

            Action::OpenFile => self.open_file(intent),

            Action::OpenApp => {
                let success = self.apps.smart_open(&intent.target, &intent.executable_hints);
                if success {
                    let mut ctx = self.context.lock().expect("session context lock poisoned");
                    ctx.last_app = Some(intent.target.clone());
                }
                let response = if success {
                    self.speak(&intent.response)
                } else {
                    self.speak(&format!("Couldn't find {}", intent.target))
                };
                CommandOutcome {
                    success,
                    response,
                    action: Some("open_app".to_string()),
                    results: None,
                    url: None,
                }
            }

            Action::OpenFolder => {
                let success = self.folders.open_folder(&intent.target, &intent.folder_paths);
                let response = if success {
                    self.speak(&intent.response)
                } else {
                    self.speak(&format!("Couldn't find {} folder", intent.target))
                };
                CommandOutcome {
                    success,
                    response,
                    action: Some("open_folder".to_string()),
                    results: None,
                    url: None,
                }
            }

            Action::ScreenClick => {
                self.speak("Analyzing screen...");
                match self.analyze_screen(command).await {
                    Some(analysis) => match analysis.click_position() {
                        Some(pos) => {
                            let success = self.screen.click_percent(pos.x, pos.y);
                            let said = if analysis.response.is_empty() {
                                "Clicked"
                            } else {
                                analysis.response.as_str()
                            };
                            let response = self.speak(said);
                            CommandOutcome {
                                success,
                                response,
                                action: Some("click".to_string()),
                                results: None,
                                url: None,
                            }
                        }
                        None => CommandOutcome::rejected(&self.speak("Couldn't identify click target.")),
                    },
                    None => CommandOutcome::rejected(&self.speak("Couldn't identify click target.")),
                }
            }

            Action::ScreenAnalyze => {
                self.speak("Analyzing screen...");
                match self.analyze_screen(command).await {
                    Some(analysis) => {
                        let said = if analysis.response.is_empty() {
                            "Screen analyzed"
                        } else {
                            analysis.response.as_str()
                        };
                        CommandOutcome::ok("analyze", self.speak(said))
                    }
                    None => CommandOutcome::rejected(&self.speak("Couldn't analyze screen.")),
                }
            }

            Action::SearchWeb => {
                let url = format!(
                    "https://www.google.com/search?q={}",
                    urlencoding::encode(&intent.target)
                );
                let success = self.web.open_url(&url);
                if success {
                    let mut ctx = self.context.lock().expect("session context lock poisoned");
                    ctx.last_browser_tab = Some("search".to_string());
                }
                self.envelope("search", success, intent, "Couldn't open the search page.")
            }

            Action::SearchYoutube => {
                let success = self.media.open_search_page(&intent.target);
                if success {
                    let mut ctx = self.context.lock().expect("session context lock poisoned");
                    ctx.last_browser_tab = Some("youtube".to_string());
                }
                self.envelope("youtube", success, intent, "Couldn't open YouTube search.")
            }

            Action::PlayYoutube => {
                let success = self.media.play_first(&intent.target);
                if success {
                    let mut ctx = self.context.lock().expect("session context lock poisoned");
                    ctx.last_browser_tab = Some("youtube_video".to_string());
                }
                let response = if success {
                    self.speak(&intent.response)
                } else {
                    self.speak(&format!("Couldn't play {}", intent.target))
                };
                CommandOutcome {
                    success,
                    response,
                    action: Some("play_youtube".to_string()),
                    results: None,
                    url: None,
                }
            }

            Action::OpenWebsite => {
                let url = self.resolve_url(&intent.target).await;
                let success = self.web.open_url(&url);
                if success {
                    let mut ctx = self.context.lock().expect("session context lock poisoned");
                    ctx.last_browser_tab = Some(intent.target.clone());
                }
                let mut outcome = self.envelope("website", success, intent, "Couldn't open the website.");
                outcome.url = Some(url);
                outcome
            }

            Action::Conversation => CommandOutcome::ok("conversation", self.speak(&intent.response)),

            Action::SystemCommand => self.system_command(intent),

            Action::Unknown => CommandOutcome::rejected(&self.speak("I'm not sure how to handle that.")),
        }
    }

    fn search_files(&self, intent: &Intent) -> CommandOutcome {
        let file_type = intent.param_str("file_type");
        let results = self
            .files
            .search(&intent.target, file_type.as_deref(), crate::file_search::DEFAULT_MAX_RESULTS);

        if results.is_empty() {
            return CommandOutcome {
                success: false,
                response: self.speak("No files or folders found."),
                action: Some("search_files".to_string()),
                results: None,
                url: None,
            };
        }

        let folders: Vec<&FileEntry> = results.iter().filter(|r| r.is_folder()).collect();
        let files: Vec<&FileEntry> = results.iter().filter(|r| !r.is_folder()).collect();
        log_preview(&folders, &files);

        let response = self.speak(&format!(
            "Found {} folders and {} files.",
            folders.len(),
            files.len()
        ));

        {
            let mut ctx = self.context.lock().expect("session context lock poisoned");
            ctx.last_search_results = results.clone();
        }

        CommandOutcome {
            success: true,
            response,
            action: Some("search_files".to_string()),
            results: Some(results),
            url: None,
        }
    }

    fn open_file(&self, intent: &Intent) -> CommandOutcome {
        // Any digit string counts as an ordinal, "0" included; with prior
        // results it resolves (or bounds-checks to "not found") rather than
        // searching for the literal digits.
        let ordinal: Option<usize> = intent.target.parse().ok();

        if let Some(n) = ordinal {
            let recalled = {
                let ctx = self.context.lock().expect("session context lock poisoned");
                if ctx.last_search_results.is_empty() {
                    None
                } else {
                    // Out-of-range ordinals fall through to "not found"
                    // rather than a fresh search on the digit string.
                    Some(ctx.search_result_at(n).cloned())
                }
            };
            match recalled {
                Some(Some(entry)) => {
                    let success = self.files.open(&entry.path);
                    let response = self.speak(&format!("Opening {}", entry.name));
                    return CommandOutcome {
                        success,
                        response,
                        action: Some("open_file".to_string()),
                        results: None,
                        url: None,
                    };
                }
                Some(None) => {
                    return CommandOutcome::failed("open_file", self.speak("File not found."));
                }
                None => {}
            }
        }

        let results = self
            .files
            .search(&intent.target, None, crate::file_search::DEFAULT_MAX_RESULTS);
        if let Some(first) = results.first() {
            let success = self.files.open(&first.path);
            let response = self.speak(&format!("Opening {}", first.name));
            return CommandOutcome {
                success,
                response,
                action: Some("open_file".to_string()),
                results: None,
                url: None,
            };
        }

        CommandOutcome::failed("open_file", self.speak("File not found."))
    }

    fn system_command(&self, intent: &Intent) -> CommandOutcome {
        match os_actions::run_shell(&intent.target) {
            Ok(output) => {
                // Historically success tracks "the shell ran", not the exit
                // code; strict mode ties it to the child's status instead.
                let success = if self.config.strict_exit_codes {
                    output.returncode == 0
                } else {
                    true
                };
                let response = if success {
                    self.speak(&intent.response)
                } else {
                    let detail = if output.stderr.trim().is_empty() {
                        format!("exit code {}", output.returncode)
                    } else {
                        output.stderr.trim().to_string()
                    };
                    self.speak(&format!("Error: {detail}"))
                };
                CommandOutcome {
                    success,
                    response,
                    action: Some("system".to_string()),
                    results: None,
                    url: None,
                }
            }
            Err(err) => CommandOutcome::failed("system", self.speak(&format!("Error: {err}"))),
        }
    }

    /// Shared envelope for branches that pass the model's response through
    /// on success and a branch-specific message on backend failure.
    fn envelope(&self, action: &str, success: bool, intent: &Intent, failure: &str) -> CommandOutcome {
        let response = if success {
            self.speak(&intent.response)
        } else {
            self.speak(failure)
        };
        CommandOutcome {
            success,
            response,
            action: Some(action.to_string()),
            results: None,
            url: None,
        }
    }

    /// Status snapshot for /api/status.
    pub fn status(&self) -> serde_json::Value {
        let ctx = self.context.lock().expect("session context lock poisoned");
        let settings = self.llm.settings().masked();
        let search_locations: Vec<String> = self
            .config
            .search_locations()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        serde_json::json!({
            "status": "online",
            "os": self.config.os_family,
            "context": ctx.snapshot(),
            "search_locations": search_locations,
            "llm_configured": self.llm.is_configured(),
            "llm_provider": settings.provider,
            "api_base": settings.api_base,
            "model": settings.model,
            "api_key": settings.api_key,
            "indexed_apps": self.apps.count(),
            "voice_settings": &self.config.voice,
            "features": {
                "vision": true,
                "typing": true,
                "file_search": true,
                "folder_search": true,
                "scroll": true,
                "keyboard": true,
                "url_intelligence": true,
                "youtube_direct_play": true,
                "reasoning_support": settings.enable_reasoning,
                "voice_enabled": self.voice.is_available(),
            },
        })
    }
}

fn log_preview(folders: &[&FileEntry], files: &[&FileEntry]) {
    for entry in folders.iter().take(3) {
        info!(name = %entry.name, "folder match");
    }
    for entry in files.iter().take(3) {
        info!(name = %entry.name, "file match");
    }
}
