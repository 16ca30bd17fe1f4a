//! Runtime configuration: reads the environment variables from spec.md
//! §6.6 exactly once at startup and turns them into explicit parameters
//! (`cache_root`, `search_paths`) passed to the registry and resolver,
//! rather than read from global state (spec.md §9, "Global mutable state").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Search path entry tagged with its priority tier.
#[derive(Debug, Clone)]
pub struct SearchPath {
    pub dir: PathBuf,
    pub tier: jn_core::Tier,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub project_root: PathBuf,
    pub user_data_home: PathBuf,
    pub bundled_root: PathBuf,
    pub extra_plugin_paths: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub strict_discovery: bool,
    pub env: HashMap<String, String>,
}

/// Project-level overrides read from `.jn/jn.toml`, applied on top of the
/// environment (SPEC_FULL.md §12, a supplemented project config file).
/// Every field is optional; an absent or unreadable file leaves the
/// environment-derived configuration untouched.
#[derive(Debug, Default, serde::Deserialize)]
struct ProjectOverrides {
    cache_dir: Option<PathBuf>,
    strict_discovery: Option<bool>,
    plugin_path: Option<Vec<PathBuf>>,
}

impl RuntimeConfig {
    /// Build from the process environment, `.jn/jn.toml` if present, and the
    /// current directory — the way `bins/gauss-server`'s `main` reads
    /// `GAUSS_CONFIG` once up front, except JN layers a project file on top
    /// of the environment instead of replacing it.
    pub fn from_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::from_map(env, cwd);
        config.apply_project_overrides();
        config
    }

    fn apply_project_overrides(&mut self) {
        let path = self.project_root.join(".jn/jn.toml");
        let Ok(text) = std::fs::read_to_string(&path) else {
            return;
        };
        match toml::from_str::<ProjectOverrides>(&text) {
            Ok(overrides) => {
                if let Some(cache_dir) = overrides.cache_dir {
                    self.cache_dir = cache_dir;
                }
                if let Some(strict) = overrides.strict_discovery {
                    self.strict_discovery = strict;
                }
                if let Some(extra) = overrides.plugin_path {
                    self.extra_plugin_paths.extend(extra);
                }
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring malformed jn.toml"),
        }
    }

    pub fn from_map(env: HashMap<String, String>, cwd: PathBuf) -> Self {
        let home = env.get("HOME").cloned();

        let bundled_root = env
            .get("JN_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/usr/local/share/jn"));

        let xdg_data_home = env
            .get("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|h| Path::new(h).join(".local/share")))
            .unwrap_or_else(|| PathBuf::from(".local/share"));
        let user_data_home = env
            .get("XDG_DATA_HOME")
            .map(|_| xdg_data_home.join("jn"))
            .unwrap_or_else(|| home.as_ref().map(|h| Path::new(h).join(".local/jn")).unwrap_or_else(|| PathBuf::from(".local/jn")));

        let cache_dir = env
            .get("JN_CACHE_DIR")
            .map(PathBuf::from)
            .or_else(|| env.get("XDG_CACHE_HOME").map(|d| Path::new(d).join("jn")))
            .or_else(|| home.as_ref().map(|h| Path::new(h).join(".cache/jn")))
            .unwrap_or_else(|| PathBuf::from(".cache/jn"));

        let extra_plugin_paths = env
            .get("JN_PLUGIN_PATH")
            .map(|s| s.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();

        let strict_discovery = env
            .get("JN_STRICT_DISCOVERY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            project_root: cwd,
            user_data_home,
            bundled_root,
            extra_plugin_paths,
            cache_dir,
            strict_discovery,
            env,
        }
    }

    /// Plugin search directories, project > user > bundled > `JN_PLUGIN_PATH`
    /// entries appended last (spec.md §6.6).
    pub fn plugin_search_paths(&self) -> Vec<SearchPath> {
        let mut paths = vec![
            SearchPath { dir: self.project_root.join(".jn/plugins"), tier: jn_core::Tier::Project },
            SearchPath { dir: self.user_data_home.join("plugins"), tier: jn_core::Tier::User },
            SearchPath { dir: self.bundled_root.join("plugins"), tier: jn_core::Tier::Bundled },
        ];
        for extra in &self.extra_plugin_paths {
            paths.push(SearchPath { dir: extra.clone(), tier: jn_core::Tier::Bundled });
        }
        paths
    }

    /// Profile search directories, project > user > bundled (spec.md §4.2).
    pub fn profile_search_paths(&self) -> Vec<SearchPath> {
        vec![
            SearchPath { dir: self.project_root.join(".jn/profiles"), tier: jn_core::Tier::Project },
            SearchPath { dir: self.user_data_home.join("profiles"), tier: jn_core::Tier::User },
            SearchPath { dir: self.bundled_root.join("profiles"), tier: jn_core::Tier::Bundled },
        ]
    }

    pub fn plugin_cache_file(&self) -> PathBuf {
        self.cache_dir.join("plugins.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jn_home_overrides_bundled_root() {
        let mut env = HashMap::new();
        env.insert("JN_HOME".to_string(), "/opt/jn".to_string());
        let cfg = RuntimeConfig::from_map(env, PathBuf::from("/work"));
        assert_eq!(cfg.bundled_root, PathBuf::from("/opt/jn"));
    }

    #[test]
    fn plugin_path_entries_appended_after_tiers() {
        let mut env = HashMap::new();
        env.insert("JN_PLUGIN_PATH".to_string(), "/a:/b".to_string());
        let cfg = RuntimeConfig::from_map(env, PathBuf::from("/work"));
        let paths = cfg.plugin_search_paths();
        assert_eq!(paths.len(), 5);
        assert_eq!(paths[3].dir, PathBuf::from("/a"));
        assert_eq!(paths[4].dir, PathBuf::from("/b"));
    }
}
