//! Plugin Registry infrastructure (C3): walks the configured search paths,
//! resolves each candidate's metadata either from an embedded manifest or by
//! self-describe, and persists the result to a disk cache keyed by
//! `(path, mtime, size)` so a second invocation in the same second doesn't
//! re-spawn every plugin on the machine. Modeled on the teacher's
//! `gauss_engine::plugin_host` discovery pass, adapted from `dlopen` probing
//! to subprocess probing.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use jn_core::plugin::compile_matches;
use jn_core::{PluginDescriptor, PluginMetadata, Registry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RuntimeConfig, SearchPath};
use crate::contract;
use crate::error::EngineError;

/// Bumped whenever the on-disk cache schema or discovery semantics change,
/// so a stale cache from an older build is ignored rather than misread.
const CACHE_VERSION: u32 = 1;

/// Fence lines delimiting an embedded manifest inside a plugin executable or
/// wrapper script (spec.md §4.3, "Embedded manifest"): a comment block
/// beginning with a line matching `/^# \/\/\/ script$/` and ending with
/// `# ///`, each body line itself prefixed with `# `.
const MANIFEST_FENCE_START: &str = "# /// script";
const MANIFEST_FENCE_END: &str = "# ///";

/// How many leading bytes of a candidate file are scanned for an embedded
/// manifest before giving up and falling back to self-describe.
const MANIFEST_SCAN_LIMIT: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CachedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    path: String,
    mtime: u64,
    size: u64,
    tier: jn_core::Tier,
    metadata: PluginMetadata,
}

/// Run the full discovery pass and build a [`Registry`] (spec.md §4.3,
/// "Discovery algorithm"). `search_paths` is expected to already be ordered
/// Project > User > Bundled > extras; later inserts lose specificity ties to
/// earlier ones only via the tier bonus, never via insertion order.
pub async fn discover(config: &RuntimeConfig) -> Result<Registry, EngineError> {
    let search_paths = config.plugin_search_paths();
    let cache_path = config.plugin_cache_file();
    let mut cache = load_cache(&cache_path).unwrap_or_default();
    let mut fresh: HashMap<String, CachedEntry> = HashMap::new();
    let mut registry = Registry::new();

    for sp in &search_paths {
        let Ok(read_dir) = std::fs::read_dir(&sp.dir) else {
            debug!(dir = %sp.dir.display(), "plugin search path missing, skipping");
            continue;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !is_candidate(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let size = meta.len();
            let key = path.to_string_lossy().into_owned();

            let cached_hit = cache
                .remove(&key)
                .filter(|c| c.mtime == mtime && c.size == size);

            let metadata = match cached_hit {
                Some(hit) => hit.metadata,
                None => match resolve_metadata(&path, config.strict_discovery).await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping plugin candidate");
                        continue;
                    }
                },
            };

            fresh.insert(
                key,
                CachedEntry {
                    path: path.to_string_lossy().into_owned(),
                    mtime,
                    size,
                    tier: sp.tier,
                    metadata: metadata.clone(),
                },
            );

            let (matches, failed) = compile_matches(&metadata.matches, sp.tier);
            for pattern in &failed {
                warn!(plugin = %metadata.name, pattern, "PATTERN_COMPILE_FAILED, skipping pattern");
            }
            registry.insert(PluginDescriptor {
                name: metadata.name,
                version: metadata.version,
                role: metadata.role,
                modes: metadata.modes,
                matches,
                config_params: metadata.config_params,
                executable_path: path.to_string_lossy().into_owned(),
                launch_prefix: Vec::new(),
                tier: sp.tier,
                source_mtime: mtime,
            });
        }
    }

    if let Err(e) = write_cache(&cache_path, &fresh) {
        warn!(error = %e, "failed to persist plugin discovery cache");
    }

    Ok(registry)
}

fn is_candidate(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let Ok(meta) = path.metadata() else { return false };
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Resolve one candidate's metadata: embedded manifest first (no process
/// spawn required), self-describe second unless `--strict-discovery`
/// forbids running untrusted executables just to ask what they are.
async fn resolve_metadata(path: &Path, strict: bool) -> Result<PluginMetadata, EngineError> {
    if let Some(meta) = read_embedded_manifest(path)? {
        return Ok(meta);
    }
    if strict {
        return Err(EngineError::Config(format!(
            "{}: no embedded manifest and --strict-discovery forbids self-describe",
            path.display()
        )));
    }
    contract::self_describe(path).await
}

/// Scan for a `# /// script` ... `# ///` fenced comment block and parse its
/// (`# `-prefix-stripped) body as a TOML document with a `[tool.jn]` table
/// (spec.md §4.3/§6.3).
fn read_embedded_manifest(path: &Path) -> Result<Option<PluginMetadata>, EngineError> {
    let bytes = std::fs::read(path)?;
    let scan_end = bytes.len().min(MANIFEST_SCAN_LIMIT);
    let text = String::from_utf8_lossy(&bytes[..scan_end]);

    let mut in_block = false;
    let mut body = String::new();
    for line in text.lines() {
        if !in_block {
            if line.trim_end() == MANIFEST_FENCE_START {
                in_block = true;
            }
            continue;
        }
        if line.trim_end() == MANIFEST_FENCE_END {
            return parse_manifest_body(path, &body).map(Some);
        }
        let content = line.strip_prefix("# ").or_else(|| line.strip_prefix('#')).unwrap_or(line);
        body.push_str(content);
        body.push('\n');
    }
    Ok(None)
}

/// `[tool.jn]`'s shape is exactly [`PluginMetadata`]'s, the same document
/// `--jn-meta` prints as JSON (spec.md §6.3).
#[derive(Deserialize)]
struct ManifestDocument {
    tool: ManifestTool,
}

#[derive(Deserialize)]
struct ManifestTool {
    jn: PluginMetadata,
}

fn parse_manifest_body(path: &Path, body: &str) -> Result<PluginMetadata, EngineError> {
    let doc: ManifestDocument = toml::from_str(body)
        .map_err(|e| EngineError::Config(format!("{}: malformed embedded manifest: {e}", path.display())))?;
    Ok(doc.tool.jn)
}

fn load_cache(path: &Path) -> Option<HashMap<String, CachedEntry>> {
    let text = std::fs::read_to_string(path).ok()?;
    let cache: CacheFile = serde_json::from_str(&text).ok()?;
    if cache.version != CACHE_VERSION {
        return None;
    }
    Some(cache.entries.into_iter().map(|e| (e.path.clone(), e)).collect())
}

fn write_cache(path: &Path, entries: &HashMap<String, CachedEntry>) -> Result<(), EngineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let cache = CacheFile {
        version: CACHE_VERSION,
        entries: entries.values().cloned().collect(),
    };
    let body = serde_json::to_vec_pretty(&cache)
        .map_err(|e| EngineError::Config(format!("failed to serialize plugin cache: {e}")))?;
    crate::atomic::write_atomic(path, &body)?;
    Ok(())
}

/// Force a rescan by discarding the on-disk cache (`jn plugins rescan`).
pub fn invalidate_cache(config: &RuntimeConfig) -> Result<(), EngineError> {
    let path = config.plugin_cache_file();
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Re-export for callers that only need the search path type.
pub type SearchPathEntry = SearchPath;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture");
        let body = concat!(
            "#!/bin/sh\n",
            "# /// script\n",
            "# [tool.jn]\n",
            "# name = \"csv\"\n",
            "# version = \"1.0\"\n",
            "# role = \"format\"\n",
            "# modes = [\"read\"]\n",
            "# matches = [\"\\\\.csv$\"]\n",
            "# ///\n",
            "exec /usr/bin/env python3 \"$0\" \"$@\"\n",
        );
        std::fs::write(&path, body).unwrap();
        let meta = read_embedded_manifest(&path).unwrap().unwrap();
        assert_eq!(meta.name, "csv");
        assert_eq!(meta.matches, vec![r"\.csv$".to_string()]);
    }

    #[test]
    fn no_manifest_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture");
        std::fs::write(&path, b"#!/bin/sh\necho hi\n").unwrap();
        assert!(read_embedded_manifest(&path).unwrap().is_none());
    }
}
