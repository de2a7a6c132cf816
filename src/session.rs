use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::file_search::FileEntry;

/// One completed command/response pair kept for follow-up resolution.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub command: String,
    pub response: String,
    pub action: String,
    pub at: DateTime<Utc>,
}

/// Session-scoped mutable state. Owned by the `Assistant` behind a mutex;
/// mutated only by the dispatcher after a successful action.
#[derive(Debug, Default, Serialize)]
pub struct SessionContext {
    pub last_browser_tab: Option<String>,
    pub last_app: Option<String>,
    pub conversation_history: Vec<Exchange>,
    pub last_search_results: Vec<FileEntry>,
}

impl SessionContext {
    pub fn record_exchange(&mut self, command: &str, response: &str, action: &str) {
        self.conversation_history.push(Exchange {
            command: command.to_string(),
            response: response.to_string(),
            action: action.to_string(),
            at: Utc::now(),
        });
    }

    /// 1-based recall into the last file-search results.
    pub fn search_result_at(&self, ordinal: usize) -> Option<&FileEntry> {
        if ordinal == 0 {
            return None;
        }
        self.last_search_results.get(ordinal - 1)
    }

    /// Status snapshot matching the original context shape.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "last_browser_tab": &self.last_browser_tab,
            "last_app": &self.last_app,
            "conversation_history": self.conversation_history.len(),
            "last_search_results": self.last_search_results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_search::EntryKind;

    fn entry(name: &str) -> FileEntry {
        FileEntry {
            path: format!("/home/user/{name}"),
            name: name.to_string(),
            kind: EntryKind::File,
            parent: "/home/user".to_string(),
            size: Some(1),
            extension: None,
        }
    }

    #[test]
    fn ordinal_recall_is_one_based_and_bounded() {
        let mut ctx = SessionContext::default();
        ctx.last_search_results = vec![entry("a.txt"), entry("b.txt")];
        assert_eq!(ctx.search_result_at(1).unwrap().name, "a.txt");
        assert_eq!(ctx.search_result_at(2).unwrap().name, "b.txt");
        assert!(ctx.search_result_at(0).is_none());
        assert!(ctx.search_result_at(3).is_none());
        assert!(ctx.search_result_at(99).is_none());
    }

    #[test]
    fn history_appends_in_order() {
        let mut ctx = SessionContext::default();
        ctx.record_exchange("open chrome", "Opening Chrome", "open_app");
        ctx.record_exchange("play despacito", "Playing despacito", "play_youtube");
        assert_eq!(ctx.conversation_history.len(), 2);
        assert_eq!(ctx.conversation_history[0].command, "open chrome");
        assert_eq!(ctx.conversation_history[1].action, "play_youtube");
    }
}
