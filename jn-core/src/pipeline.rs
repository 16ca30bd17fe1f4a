//! Pipeline value types (assembled by C5, executed by C6) and the filter
//! expression builder used when splitting address parameters into plugin
//! configuration vs. downstream record filters (spec.md §4.5, "Parameter
//! split").

use std::path::PathBuf;

use crate::address::{Op, Parameter};
use crate::plugin::{Mode, PluginDescriptor, Role};

/// Where a stage's stdin/stdout is wired. Pure description; `jn-engine`
/// turns this into real file descriptors and OS pipes when spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEndpoint {
    /// The caller's own stdin/stdout.
    Inherit,
    /// An OS pipe shared with the adjacent stage.
    Pipe,
    /// A concrete file path (read or write end depends on stage position).
    File(PathBuf),
}

/// One node in an assembled pipeline (spec.md §3.1, "Stage").
#[derive(Debug, Clone)]
pub struct Stage {
    pub descriptor: PluginDescriptor,
    pub mode: Mode,
    pub argv_extras: Vec<String>,
    pub env_extras: Vec<(String, String)>,
    pub stdin_source: StreamEndpoint,
    pub stdout_sink: StreamEndpoint,
}

impl Stage {
    pub fn new(descriptor: PluginDescriptor, mode: Mode) -> Self {
        Self {
            descriptor,
            mode,
            argv_extras: Vec::new(),
            env_extras: Vec::new(),
            stdin_source: StreamEndpoint::Pipe,
            stdout_sink: StreamEndpoint::Pipe,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.descriptor.supports(self.mode)
    }
}

/// Ordered, non-empty sequence of stages (spec.md §3.1, "Pipeline").
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn is_valid(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(Stage::is_valid)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Outcome of waiting on one spawned stage (spec.md §3.1, "StageResult").
#[derive(Debug, Clone)]
pub struct StageResult {
    pub plugin_name: String,
    pub role: Role,
    pub exit_code: Option<i32>,
    pub captured_stderr: String,
    pub signal: Option<i32>,
}

impl StageResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Split address parameters into `(config_params, filter_params)` for the
/// chosen plugin (spec.md §4.5, "Parameter split"): names the plugin
/// declares in `config_params` are configuration; everything else is a
/// filter.
pub fn split_parameters<'a>(
    parameters: &'a [Parameter],
    config_params: &[String],
) -> (Vec<&'a Parameter>, Vec<&'a Parameter>) {
    let mut config = Vec::new();
    let mut filters = Vec::new();
    for p in parameters {
        if config_params.iter().any(|c| c == &p.key) {
            config.push(p);
        } else {
            filters.push(p);
        }
    }
    (config, filters)
}

/// Build a filter-engine expression string from filter parameters: same key
/// repeated joins with OR, different keys join with AND, operator suffixes
/// are honored (spec.md §4.5, "Grouping"; §9, "Filter building").
///
/// Returns `None` if there are no filter parameters (no filter stage is
/// needed in that case).
pub fn build_filter_expression(filter_params: &[&Parameter]) -> Option<String> {
    if filter_params.is_empty() {
        return None;
    }

    // Group by key, preserving first-seen key order.
    let mut order: Vec<&str> = Vec::new();
    let mut groups: Vec<(&str, Vec<&Parameter>)> = Vec::new();
    for p in filter_params {
        if let Some(existing) = groups.iter_mut().find(|(k, _)| *k == p.key.as_str()) {
            existing.1.push(p);
        } else {
            order.push(&p.key);
            groups.push((&p.key, vec![p]));
        }
    }

    let mut clauses = Vec::new();
    for key in &order {
        let (_, params) = groups.iter().find(|(k, _)| k == key).unwrap();
        let mut ors: Vec<String> = params.iter().map(|p| render_clause(p)).collect();
        let joined = if ors.len() == 1 {
            ors.pop().unwrap()
        } else {
            format!("({})", ors.join(" or "))
        };
        clauses.push(joined);
    }

    Some(clauses.join(" and "))
}

fn render_clause(p: &Parameter) -> String {
    format!(".{} {} {}", p.key, op_token(p.op), quote(&p.value))
}

fn op_token(op: Op) -> &'static str {
    match op {
        Op::Eq => "==",
        Op::Gt => ">",
        Op::Lt => "<",
        Op::Ge => ">=",
        Op::Le => "<=",
        Op::Ne => "!=",
    }
}

fn quote(value: &str) -> String {
    // Numeric-looking values render unquoted so operator comparisons work
    // numerically in the filter engine; everything else is a quoted string.
    if value.parse::<f64>().is_ok() && !value.is_empty() {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse;

    #[test]
    fn and_across_distinct_keys_or_within_repeated_key() {
        let addr = parse("t.csv?role=admin&role=editor&active=true").unwrap();
        let config_params: Vec<String> = vec![];
        let (_config, filters) = split_parameters(&addr.parameters, &config_params);
        let expr = build_filter_expression(&filters).unwrap();
        assert_eq!(expr, "(.role == \"admin\" or .role == \"editor\") and .active == true");
    }

    #[test]
    fn operator_suffix_rendered() {
        let addr = parse("t.csv?size>=10").unwrap();
        let (_c, filters) = split_parameters(&addr.parameters, &[]);
        let expr = build_filter_expression(&filters).unwrap();
        assert_eq!(expr, ".size >= 10");
    }

    #[test]
    fn config_params_excluded_from_filter() {
        let addr = parse("t.csv?limit=10&role=admin").unwrap();
        let (config, filters) = split_parameters(&addr.parameters, &["limit".to_string()]);
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].key, "limit");
        let expr = build_filter_expression(&filters).unwrap();
        assert_eq!(expr, ".role == \"admin\"");
    }

    #[test]
    fn no_filter_params_yields_none() {
        let addr = parse("t.csv?limit=10").unwrap();
        let (_c, filters) = split_parameters(&addr.parameters, &["limit".to_string()]);
        assert!(build_filter_expression(&filters).is_none());
    }
}
