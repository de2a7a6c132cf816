use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::file_search::FileSearcher;
use crate::os_actions::{self, expand_path};

/// Folder seam consumed by the dispatcher; stubbed in tests.
pub trait FolderControl: Send + Sync {
    fn open_folder(&self, folder_name: &str, candidates: &[String]) -> bool;
}

type FolderStrategy = fn(&FolderOpener, &str, &[String]) -> Option<PathBuf>;

/// Resolution order is part of the contract: well-known aliases win over any
/// model-suggested path template, which wins over a tree search, which wins
/// over trying the raw string as a literal path.
pub const FOLDER_RESOLUTION_STRATEGIES: [(&str, FolderStrategy); 4] = [
    ("known_alias", FolderOpener::strategy_known_alias),
    ("candidate_paths", FolderOpener::strategy_candidate_paths),
    ("tree_search", FolderOpener::strategy_tree_search),
    ("literal_path", FolderOpener::strategy_literal_path),
];

pub struct FolderOpener {
    searcher: Arc<FileSearcher>,
}

impl FolderOpener {
    pub fn new(searcher: Arc<FileSearcher>) -> Self {
        Self { searcher }
    }

    /// Well-known folder alias table, relative to the user's home.
    pub fn known_folder(name: &str) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let sub = match name.to_lowercase().as_str() {
            "downloads" => "Downloads",
            "documents" => "Documents",
            "desktop" => "Desktop",
            "pictures" => "Pictures",
            "music" => "Music",
            "videos" => "Videos",
            "onedrive" | "one_drive" => "OneDrive",
            _ => return None,
        };
        Some(home.join(sub))
    }

    fn strategy_known_alias(&self, folder_name: &str, _candidates: &[String]) -> Option<PathBuf> {
        let path = Self::known_folder(folder_name)?;
        path.exists().then_some(path)
    }

    fn strategy_candidate_paths(&self, _folder_name: &str, candidates: &[String]) -> Option<PathBuf> {
        candidates
            .iter()
            .map(|template| expand_path(template))
            .find(|path| path.exists())
    }

    fn strategy_tree_search(&self, folder_name: &str, _candidates: &[String]) -> Option<PathBuf> {
        self.searcher
            .search(folder_name, None, 10)
            .into_iter()
            .find(|entry| entry.is_folder())
            .map(|entry| PathBuf::from(entry.path))
    }

    fn strategy_literal_path(&self, folder_name: &str, _candidates: &[String]) -> Option<PathBuf> {
        let path = PathBuf::from(folder_name);
        path.exists().then_some(path)
    }

    /// First existing match across the ordered strategies.
    pub fn resolve(&self, folder_name: &str, candidates: &[String]) -> Option<(&'static str, PathBuf)> {
        for (name, strategy) in FOLDER_RESOLUTION_STRATEGIES.iter() {
            if let Some(path) = strategy(self, folder_name, candidates) {
                return Some((name, path));
            }
        }
        None
    }
}

impl FolderControl for FolderOpener {
    fn open_folder(&self, folder_name: &str, candidates: &[String]) -> bool {
        info!(folder_name, "opening folder");
        match self.resolve(folder_name, candidates) {
            Some((strategy, path)) => {
                info!(strategy, path = %path.display(), "folder resolved");
                os_actions::open_path(&path.display().to_string())
            }
            None => {
                warn!(folder_name, "no folder candidate exists");
                false
            }
        }
    }
}
