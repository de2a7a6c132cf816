use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_WALK_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One file-search hit, in the shape the HTTP layer and dispatcher share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub parent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl FileEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Detailed single-file metadata for /api/file-info.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub size_human: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub extension: Option<String>,
    pub parent: String,
    pub absolute: String,
}

/// File seam consumed by the dispatcher; stubbed in tests.
pub trait FileAccess: Send + Sync {
    fn search(&self, query: &str, file_type: Option<&str>, max_results: usize) -> Vec<FileEntry>;
    /// Open a file or folder with the platform default handler.
    fn open(&self, path: &str) -> bool;
    fn info(&self, path: &str) -> Option<FileInfo>;
}

/// Recursive substring search over the configured user directories.
/// There is no index; every request walks the tree fresh.
pub struct FileSearcher {
    locations: Vec<PathBuf>,
}

impl FileSearcher {
    pub fn new(locations: Vec<PathBuf>) -> Self {
        Self { locations }
    }

    pub fn search(&self, query: &str, file_type: Option<&str>, max_results: usize) -> Vec<FileEntry> {
        let needle = query.to_lowercase();
        let wanted_ext = file_type.map(|t| t.trim_start_matches('.').to_lowercase());
        let mut results = Vec::new();

        info!(query, "searching user directories");
        for location in &self.locations {
            debug!(location = %location.display(), "scanning");
            for entry in WalkDir::new(location)
                .max_depth(MAX_WALK_DEPTH)
                .into_iter()
                .filter_entry(|e| !is_hidden(e.path()))
                .filter_map(|e| e.ok())
            {
                if results.len() >= max_results {
                    break;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.to_lowercase().contains(&needle) {
                    continue;
                }

                let path = entry.path();
                if entry.file_type().is_dir() {
                    if wanted_ext.is_some() {
                        continue;
                    }
                    results.push(folder_entry(path, &name));
                } else if entry.file_type().is_file() {
                    let ext = extension_of(path);
                    if let Some(wanted) = &wanted_ext {
                        if ext.as_deref() != Some(wanted.as_str()) {
                            continue;
                        }
                    }
                    results.push(file_entry(path, &name, entry.metadata().ok().map(|m| m.len()), ext));
                }
            }
            if results.len() >= max_results {
                break;
            }
        }

        sort_entries(&mut results);
        info!(count = results.len(), "search finished");
        results
    }

    pub fn file_info(&self, path: &str) -> Option<FileInfo> {
        let p = Path::new(path);
        let meta = p.metadata().ok()?;
        let name = p.file_name()?.to_string_lossy().to_string();
        Some(FileInfo {
            name,
            path: path.to_string(),
            size: meta.len(),
            size_human: format_size(meta.len()),
            kind: if meta.is_dir() { EntryKind::Folder } else { EntryKind::File },
            extension: extension_of(p),
            parent: p.parent().map(|d| d.display().to_string()).unwrap_or_default(),
            absolute: p
                .canonicalize()
                .map(|a| a.display().to_string())
                .unwrap_or_else(|_| path.to_string()),
        })
    }
}

impl FileAccess for FileSearcher {
    fn search(&self, query: &str, file_type: Option<&str>, max_results: usize) -> Vec<FileEntry> {
        FileSearcher::search(self, query, file_type, max_results)
    }

    fn open(&self, path: &str) -> bool {
        if !Path::new(path).exists() {
            return false;
        }
        crate::os_actions::open_path(path)
    }

    fn info(&self, path: &str) -> Option<FileInfo> {
        self.file_info(path)
    }
}

/// Folders first, then case-insensitive name order.
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        (!a.is_folder(), a.name.to_lowercase()).cmp(&(!b.is_folder(), b.name.to_lowercase()))
    });
}

fn folder_entry(path: &Path, name: &str) -> FileEntry {
    FileEntry {
        path: path.display().to_string(),
        name: name.to_string(),
        kind: EntryKind::Folder,
        parent: path.parent().map(|d| d.display().to_string()).unwrap_or_default(),
        size: None,
        extension: None,
    }
}

fn file_entry(path: &Path, name: &str, size: Option<u64>, extension: Option<String>) -> FileEntry {
    FileEntry {
        path: path.display().to_string(),
        name: name.to_string(),
        kind: EntryKind::File,
        parent: path.parent().map(|d| d.display().to_string()).unwrap_or_default(),
        size,
        extension,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

pub fn format_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < units.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", size, units[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry(name: &str, kind: EntryKind) -> FileEntry {
        FileEntry {
            path: format!("/tmp/{name}"),
            name: name.to_string(),
            kind,
            parent: "/tmp".to_string(),
            size: None,
            extension: None,
        }
    }

    #[test]
    fn folders_sort_before_files() {
        let mut entries = vec![
            entry("zeta.txt", EntryKind::File),
            entry("Alpha", EntryKind::Folder),
            entry("beta.txt", EntryKind::File),
            entry("gamma", EntryKind::Folder),
        ];
        sort_entries(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "gamma", "beta.txt", "zeta.txt"]);
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(512), "512.0B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0MB");
    }

    #[test]
    fn search_matches_substring_and_caps_results() {
        let dir = std::env::temp_dir().join(format!("deskpilot-search-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("reports")).unwrap();
        fs::write(dir.join("resume-draft.txt"), b"x").unwrap();
        fs::write(dir.join("reports/resume-final.pdf"), b"x").unwrap();
        fs::write(dir.join("unrelated.txt"), b"x").unwrap();

        let searcher = FileSearcher::new(vec![dir.clone()]);
        let results = searcher.search("resume", None, DEFAULT_MAX_RESULTS);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.name.to_lowercase().contains("resume")));

        let capped = searcher.search("resume", None, 1);
        assert_eq!(capped.len(), 1);

        let pdf_only = searcher.search("resume", Some("pdf"), DEFAULT_MAX_RESULTS);
        assert_eq!(pdf_only.len(), 1);
        assert_eq!(pdf_only[0].extension.as_deref(), Some("pdf"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_info_reports_metadata() {
        let dir = std::env::temp_dir().join(format!("deskpilot-info-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("notes.md");
        fs::write(&file, b"hello").unwrap();

        let searcher = FileSearcher::new(vec![dir.clone()]);
        let info = searcher.file_info(&file.display().to_string()).unwrap();
        assert_eq!(info.name, "notes.md");
        assert_eq!(info.size, 5);
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.extension.as_deref(), Some("md"));

        assert!(searcher.file_info("/no/such/path").is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
