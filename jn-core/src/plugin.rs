//! Plugin Registry domain types (C3): the self-description a plugin process
//! publishes, the compiled match patterns, specificity scoring, and the
//! read-only index built from discovery. Discovery itself (spawning
//! processes, reading files, caching to disk) is infrastructure and lives in
//! `jn-engine::discovery`.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One of the roles a plugin can declare (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Format,
    Protocol,
    Filter,
    Compression,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Protocol => "protocol",
            Self::Filter => "filter",
            Self::Compression => "compression",
        }
    }
}

/// One of the operational modes a plugin can be invoked in (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Read,
    Write,
    Raw,
    Filter,
    Profiles,
    Inspect,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Raw => "raw",
            Self::Filter => "filter",
            Self::Profiles => "profiles",
            Self::Inspect => "inspect",
        }
    }
}

/// Priority tier a plugin was discovered under (spec.md §3.1, §4.3).
/// `Ord` is derived in declaration order so that `Project > User > Bundled`
/// compares the way discovery priority reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bundled,
    User,
    Project,
}

impl Tier {
    fn bonus(self) -> i64 {
        match self {
            Self::Project => 10,
            Self::User => 5,
            Self::Bundled => 0,
        }
    }
}

/// The JSON shape a plugin returns from `--jn-meta` or declares in an
/// embedded manifest (spec.md §6.3). `config_params` absent means every
/// address parameter becomes a downstream filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub role: Role,
    pub modes: Vec<Mode>,
    pub matches: Vec<String>,
    #[serde(default)]
    pub config_params: Vec<String>,
}

/// A compiled match pattern plus its specificity score.
#[derive(Debug, Clone)]
pub struct CompiledMatch {
    pub pattern: String,
    pub regex: Regex,
    pub specificity: i64,
}

/// Self-description of a plugin executable, fully resolved and immutable
/// after discovery (spec.md §3.1).
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub role: Role,
    pub modes: Vec<Mode>,
    pub matches: Vec<CompiledMatch>,
    pub config_params: Vec<String>,
    pub executable_path: String,
    pub launch_prefix: Vec<String>,
    pub tier: Tier,
    pub source_mtime: u64,
}

impl PluginDescriptor {
    pub fn supports(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Best (highest) specificity across all of this descriptor's patterns
    /// that match `subject`, or `None` if nothing matches.
    pub fn best_match_score(&self, subject: &str) -> Option<i64> {
        self.matches
            .iter()
            .filter(|m| m.regex.is_match(subject))
            .map(|m| m.specificity)
            .max()
    }
}

/// Compute a pattern's specificity score (spec.md §4.3, "Specificity
/// scoring"). Higher is more specific; used only as a tie-breaker between
/// overlapping patterns.
pub fn specificity(pattern: &str, tier: Tier) -> i64 {
    let mut score: i64 = 0;
    let mut literal_chars: i64 = 0;
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '^' | '$' if !in_class => score += 5,
            '.' | '*' | '+' | '?' if !in_class => score -= 2,
            '|' if !in_class => score -= 2,
            '[' => {
                in_class = true;
                score -= 2;
            }
            ']' => in_class = false,
            '\\' if i + 1 < chars.len() => {
                // An escaped metacharacter is literal content.
                literal_chars += 1;
                i += 1;
            }
            _ if !in_class && c.is_alphanumeric() => literal_chars += 1,
            _ if in_class => {}
            _ => {}
        }
        i += 1;
    }
    score += literal_chars * 10;
    score += tier.bonus();
    score
}

/// Compile a plugin's `matches` patterns into scored `CompiledMatch`
/// entries. A pattern that fails to compile is dropped (spec.md §4.3,
/// `PATTERN_COMPILE_FAILED`); the caller is expected to log the failure —
/// this function just reports which ones were skipped.
pub fn compile_matches(patterns: &[String], tier: Tier) -> (Vec<CompiledMatch>, Vec<String>) {
    let mut compiled = Vec::new();
    let mut failed = Vec::new();
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(regex) => compiled.push(CompiledMatch {
                pattern: pattern.clone(),
                specificity: specificity(pattern, tier),
                regex,
            }),
            Err(_) => failed.push(pattern.clone()),
        }
    }
    (compiled, failed)
}

/// Read-only index of discovered plugins, keyed by role (spec.md §3.1,
/// "Registry"). Built once during discovery and never mutated during
/// pipeline execution.
#[derive(Debug, Default)]
pub struct Registry {
    by_role: HashMap<Role, Vec<PluginDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, keeping each role's list sorted by descending
    /// specificity (computed against its best pattern) and, within equal
    /// specificity, by tier then name for determinism.
    pub fn insert(&mut self, descriptor: PluginDescriptor) {
        self.by_role.entry(descriptor.role).or_default().push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.by_role.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self, role: Role) -> &[PluginDescriptor] {
        self.by_role.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.by_role.keys().copied()
    }

    /// All plugins in `role` whose patterns match `subject`, sorted by
    /// descending specificity, tier, then name (spec.md §4.3, "match").
    pub fn matching(&self, role: Role, subject: &str) -> Vec<(&PluginDescriptor, i64)> {
        let mut hits: Vec<(&PluginDescriptor, i64)> = self
            .all(role)
            .iter()
            .filter_map(|d| d.best_match_score(subject).map(|s| (d, s)))
            .collect();
        hits.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.0.tier.cmp(&a.0.tier))
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        hits
    }

    /// Head of `matching`, or `None` (spec.md §4.3, "best").
    pub fn best(&self, role: Role, subject: &str) -> Option<&PluginDescriptor> {
        self.matching(role, subject).into_iter().next().map(|(d, _)| d)
    }

    pub fn find_by_name(&self, role: Role, name: &str) -> Option<&PluginDescriptor> {
        self.all(role).iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longer_literal_pattern_scores_higher_same_tier() {
        let s1 = specificity(r"^report\.csv$", Tier::Bundled);
        let s2 = specificity(r"\.csv$", Tier::Bundled);
        assert!(s1 > s2, "{s1} should be > {s2}");
    }

    #[test]
    fn project_tier_bonus_applies() {
        let bundled = specificity(r"\.csv$", Tier::Bundled);
        let project = specificity(r"\.csv$", Tier::Project);
        assert_eq!(project, bundled + 10);
    }

    #[test]
    fn registry_orders_by_specificity_descending() {
        let mut reg = Registry::new();
        for (name, pattern, tier) in [
            ("loose", r"\.csv$", Tier::Bundled),
            ("tight", r"^report\.csv$", Tier::Bundled),
        ] {
            let (matches, _) = compile_matches(&[pattern.to_string()], tier);
            reg.insert(PluginDescriptor {
                name: name.to_string(),
                version: "1.0".into(),
                role: Role::Format,
                modes: vec![Mode::Read],
                matches,
                config_params: vec![],
                executable_path: format!("/bin/{name}"),
                launch_prefix: vec![],
                tier,
                source_mtime: 0,
            });
        }
        let hits = reg.matching(Role::Format, "report.csv");
        assert_eq!(hits[0].0.name, "tight");
        assert_eq!(hits[1].0.name, "loose");
    }
}
