use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::os_actions;

/// Media playback/search seam; the default impl drives the `yt-dlp` CLI.
pub trait MediaBackend: Send + Sync {
    fn search_videos(&self, query: &str, limit: usize) -> Vec<VideoEntry>;
    /// Resolve the top result and open it directly; on any failure fall
    /// back to opening the search-results page and report false.
    fn play_first(&self, query: &str) -> bool;
    fn open_search_page(&self, query: &str) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEntry {
    pub title: String,
    pub link: String,
    pub duration: String,
    pub views: String,
    pub thumbnail: String,
    pub channel: String,
    pub upload_time: String,
}

pub fn search_results_url(query: &str) -> String {
    format!(
        "https://www.youtube.com/results?search_query={}",
        urlencoding::encode(query)
    )
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub struct YtDlpMedia;

impl YtDlpMedia {
    fn flat_search(&self, query: &str, limit: usize) -> Option<Vec<Value>> {
        let spec = format!("ytsearch{limit}:{query}");
        let output = Command::new("yt-dlp")
            .args(["-J", "--flat-playlist", "--no-warnings", &spec])
            .output()
            .ok()?;
        if !output.status.success() {
            warn!(query, "yt-dlp search failed");
            return None;
        }
        let parsed: Value = serde_json::from_slice(&output.stdout).ok()?;
        match parsed.get("entries") {
            Some(Value::Array(entries)) => Some(entries.clone()),
            _ => Some(vec![parsed]),
        }
    }
}

impl MediaBackend for YtDlpMedia {
    fn search_videos(&self, query: &str, limit: usize) -> Vec<VideoEntry> {
        let Some(entries) = self.flat_search(query, limit) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id")?.as_str()?;
                Some(VideoEntry {
                    title: entry["title"].as_str().unwrap_or_default().to_string(),
                    link: watch_url(id),
                    duration: entry["duration_string"].as_str().unwrap_or_default().to_string(),
                    views: entry["view_count"]
                        .as_i64()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    thumbnail: entry["thumbnails"][0]["url"].as_str().unwrap_or_default().to_string(),
                    channel: entry["channel"].as_str().unwrap_or_default().to_string(),
                    upload_time: entry["upload_date"].as_str().unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    fn play_first(&self, query: &str) -> bool {
        info!(query, "resolving top video match");
        let top = self
            .flat_search(query, 1)
            .and_then(|entries| entries.into_iter().next())
            .and_then(|entry| entry.get("id").and_then(|v| v.as_str()).map(String::from));

        match top {
            Some(id) => {
                let url = watch_url(&id);
                info!(%url, "playing top match");
                os_actions::open_path(&url)
            }
            None => {
                warn!(query, "no playable match, falling back to search page");
                self.open_search_page(query);
                false
            }
        }
    }

    fn open_search_page(&self, query: &str) -> bool {
        os_actions::open_path(&search_results_url(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_is_percent_encoded() {
        assert_eq!(
            search_results_url("lofi hip hop"),
            "https://www.youtube.com/results?search_query=lofi%20hip%20hop"
        );
    }

    #[test]
    fn watch_url_shape() {
        assert_eq!(watch_url("dQw4w9WgXcQ"), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
