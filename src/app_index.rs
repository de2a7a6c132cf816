use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use tracing::{info, warn};

use crate::os_actions;

/// One resolved application, keyed in the cache by lower-cased name.
#[derive(Debug, Clone, Serialize)]
pub struct AppEntry {
    pub name: String,
    pub path: Option<String>,
    pub source: String,
}

/// Application seam the dispatcher and HTTP layer consume; stubbed in tests.
pub trait AppControl: Send + Sync {
    /// Multi-strategy open; first succeeding strategy wins.
    fn smart_open(&self, app_name: &str, hints: &[String]) -> bool;
    /// Cache-only resolution (exact key, partial key, partial display name).
    fn resolve(&self, app_name: &str) -> Option<String>;
    fn app_names(&self) -> Vec<String>;
    fn list(&self, limit: Option<usize>, search: Option<&str>) -> Vec<AppEntry>;
    fn count(&self) -> usize;
    /// Rescan and atomically replace the cache; returns the new size.
    fn refresh(&self) -> usize;
}

type LaunchStrategy = fn(&AppIndex, &str, &[String]) -> bool;

/// Strategy order is significant and deliberately goes from precise to
/// permissive: cached path, then spawning each hint as a program, then
/// handing hints and the raw name to the OS shell.
pub const APP_LAUNCH_STRATEGIES: [(&str, LaunchStrategy); 3] = [
    ("cached_path", AppIndex::strategy_cached_path),
    ("hint_spawn", AppIndex::strategy_hint_spawn),
    ("shell_run", AppIndex::strategy_shell_run),
];

/// Installed-application cache. Built once at startup, read-only during
/// dispatch, fully replaced on refresh.
pub struct AppIndex {
    apps: RwLock<HashMap<String, AppEntry>>,
}

impl AppIndex {
    pub fn scan() -> Self {
        info!("indexing installed applications");
        let apps = scan_installed_apps();
        info!(count = apps.len(), "application index built");
        Self { apps: RwLock::new(apps) }
    }

    pub fn from_entries(entries: Vec<AppEntry>) -> Self {
        let mut apps = HashMap::new();
        for entry in entries {
            apps.insert(entry.name.to_lowercase(), entry);
        }
        Self { apps: RwLock::new(apps) }
    }

    fn strategy_cached_path(&self, app_name: &str, _hints: &[String]) -> bool {
        let Some(path) = self.resolve(app_name) else {
            return false;
        };
        if !Path::new(&path).exists() {
            return false;
        }
        let target = launchable_in(&path).unwrap_or(path);
        os_actions::open_path(&target)
    }

    fn strategy_hint_spawn(&self, _app_name: &str, hints: &[String]) -> bool {
        hints.iter().any(|hint| os_actions::spawn_program(hint))
    }

    fn strategy_shell_run(&self, app_name: &str, hints: &[String]) -> bool {
        std::iter::once(app_name)
            .chain(hints.iter().map(|h| h.as_str()))
            .any(os_actions::shell_launch)
    }
}

impl AppControl for AppIndex {
    fn smart_open(&self, app_name: &str, hints: &[String]) -> bool {
        info!(app_name, "searching for application");
        for (name, strategy) in APP_LAUNCH_STRATEGIES.iter() {
            if strategy(self, app_name, hints) {
                info!(app_name, strategy = name, "application opened");
                return true;
            }
        }
        warn!(app_name, "could not find or open application");
        false
    }

    fn resolve(&self, app_name: &str) -> Option<String> {
        let apps = self.apps.read().expect("app cache lock poisoned");
        let wanted = app_name.to_lowercase();

        if let Some(entry) = apps.get(&wanted) {
            return entry.path.clone();
        }
        for (key, entry) in apps.iter() {
            if key.contains(&wanted) || wanted.contains(key.as_str()) {
                return entry.path.clone();
            }
        }
        for entry in apps.values() {
            let display = entry.name.to_lowercase();
            if display.contains(&wanted) || wanted.contains(&display) {
                return entry.path.clone();
            }
        }
        None
    }

    fn app_names(&self) -> Vec<String> {
        let apps = self.apps.read().expect("app cache lock poisoned");
        let mut names: Vec<String> = apps.values().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    fn list(&self, limit: Option<usize>, search: Option<&str>) -> Vec<AppEntry> {
        let apps = self.apps.read().expect("app cache lock poisoned");
        let needle = search.map(|s| s.to_lowercase());
        let mut entries: Vec<AppEntry> = apps
            .values()
            .filter(|e| match &needle {
                Some(n) => e.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    fn count(&self) -> usize {
        self.apps.read().expect("app cache lock poisoned").len()
    }

    fn refresh(&self) -> usize {
        info!("refreshing application index");
        let fresh = scan_installed_apps();
        let count = fresh.len();
        *self.apps.write().expect("app cache lock poisoned") = fresh;
        info!(count, "application index replaced");
        count
    }
}

/// If a cached path points at a directory, find something launchable inside.
fn launchable_in(path: &str) -> Option<String> {
    let dir = Path::new(path);
    if !dir.is_dir() || path.ends_with(".app") {
        return None;
    }
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let p = entry.path();
        if p.extension().map(|e| e == "exe").unwrap_or(false) {
            return Some(p.display().to_string());
        }
    }
    None
}

fn scan_installed_apps() -> HashMap<String, AppEntry> {
    let mut apps = HashMap::new();
    if cfg!(target_os = "macos") {
        scan_app_bundles(Path::new("/Applications"), &mut apps);
        if let Some(home) = dirs::home_dir() {
            scan_app_bundles(&home.join("Applications"), &mut apps);
        }
    } else if cfg!(target_os = "windows") {
        for menu in start_menu_dirs() {
            scan_start_menu(&menu, &mut apps);
        }
    } else {
        scan_desktop_files(Path::new("/usr/share/applications"), &mut apps);
        if let Some(data) = dirs::data_dir() {
            scan_desktop_files(&data.join("applications"), &mut apps);
        }
    }
    apps
}

fn scan_app_bundles(dir: &Path, apps: &mut HashMap<String, AppEntry>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().map(|e| e == "app").unwrap_or(false) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                apps.insert(
                    stem.to_lowercase(),
                    AppEntry {
                        name: stem.to_string(),
                        path: Some(path.display().to_string()),
                        source: "app_bundle".to_string(),
                    },
                );
            }
        }
    }
}

fn start_menu_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if let Ok(appdata) = std::env::var("APPDATA") {
        dirs_out.push(PathBuf::from(appdata).join("Microsoft/Windows/Start Menu/Programs"));
    }
    if let Ok(programdata) = std::env::var("PROGRAMDATA") {
        dirs_out.push(PathBuf::from(programdata).join("Microsoft/Windows/Start Menu/Programs"));
    }
    dirs_out
}

fn scan_start_menu(dir: &Path, apps: &mut HashMap<String, AppEntry>) {
    for entry in walkdir::WalkDir::new(dir)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().map(|e| e == "lnk").unwrap_or(false) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                apps.insert(
                    stem.to_lowercase(),
                    AppEntry {
                        name: stem.to_string(),
                        path: Some(path.display().to_string()),
                        source: "start_menu".to_string(),
                    },
                );
            }
        }
    }
}

/// Minimal .desktop parsing: Name= for display, Exec= stripped of field codes.
fn scan_desktop_files(dir: &Path, apps: &mut HashMap<String, AppEntry>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().map(|e| e == "desktop").unwrap_or(false) {
            if let Ok(content) = fs::read_to_string(&path) {
                let mut name = None;
                let mut exec = None;
                for line in content.lines() {
                    if name.is_none() {
                        if let Some(v) = line.strip_prefix("Name=") {
                            name = Some(v.trim().to_string());
                        }
                    }
                    if exec.is_none() {
                        if let Some(v) = line.strip_prefix("Exec=") {
                            let cleaned = v
                                .split_whitespace()
                                .filter(|tok| !tok.starts_with('%'))
                                .collect::<Vec<_>>()
                                .join(" ");
                            exec = Some(cleaned);
                        }
                    }
                }
                if let Some(name) = name {
                    apps.insert(
                        name.to_lowercase(),
                        AppEntry {
                            name,
                            path: exec,
                            source: "desktop_file".to_string(),
                        },
                    );
                }
            }
        }
    }
}
