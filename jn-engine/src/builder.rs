//! Pipeline Builder (C5): turns a parsed `Address` plus the plugin registry
//! into an ordered `Pipeline` of stages, wiring protocol, decompression,
//! format, and filter stages the way spec.md §4.5 describes stage assembly.
//! Parallels the teacher's `gauss_engine::topic` assembly of processor ->
//! storage chains from a topic definition, generalized to JN's five stage
//! kinds and to two directions (read assembly vs. write assembly).

use std::path::PathBuf;

use jn_core::address::{Address, AddressKind, Op, Parameter};
use jn_core::pipeline::{build_filter_expression, split_parameters, Pipeline, Stage, StreamEndpoint};
use jn_core::plugin::{Mode, Role};
use jn_core::{CoreError, Profile, Registry};

use crate::contract::mode_flag;
use crate::error::EngineError;

/// Result of building a write pipeline: the pipeline itself, plus the
/// temp-path/final-path pair the executor renames into place only after
/// every stage exits successfully (spec.md §4.6, "Atomic writes").
pub struct WritePlan {
    pub pipeline: Pipeline,
    pub atomic_rename: Option<(PathBuf, PathBuf)>,
}

pub struct Builder<'a> {
    registry: &'a Registry,
}

impl<'a> Builder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Merge a resolved profile's `defaults` into an address's own
    /// parameters. The address's own value for a key always wins outright
    /// over the profile's default for that same key — no field-level
    /// combining (resolves the spec's "defaults vs. address param
    /// collision" open question).
    pub fn effective_parameters(address: &Address, profile: Option<&Profile>) -> Vec<Parameter> {
        let mut params = address.parameters.clone();
        if let Some(profile) = profile {
            let present: std::collections::HashSet<String> =
                params.iter().map(|p| p.key.clone()).collect();
            for (key, value) in profile.defaults() {
                if !present.contains(key.as_str()) {
                    params.push(Parameter { key, op: Op::Eq, value });
                }
            }
        }
        params
    }

    /// Assemble the read-direction pipeline (source -> NDJSON on this
    /// process's stdout). `profile`, if the address resolved one, is passed
    /// to the protocol stage as `JN_PROFILE_JSON` (spec.md §6.4).
    pub fn build_read(&self, address: &Address, params: &[Parameter], profile: Option<&Profile>) -> Result<Pipeline, EngineError> {
        let mut stages = Vec::new();

        if self.protocol_subject(address).is_some() {
            stages.push(self.protocol_stage(address, Mode::Read, profile)?);
        }

        for compression in &address.compression {
            stages.push(self.stage_for(Role::Compression, compression.token(), Mode::Read, address)?);
        }

        let format_subject = self.format_subject(address);
        let format_stage_index = stages.len();
        stages.push(self.stage_for(Role::Format, &format_subject, Mode::Read, address)?);

        let config_params: Vec<String> = stages[format_stage_index].descriptor.config_params.clone();
        let (config, filters) = split_parameters(params, &config_params);
        for p in &config {
            stages[format_stage_index].argv_extras.push(format!("--{}={}", p.key, p.value));
        }
        if let Some(expr) = build_filter_expression(&filters) {
            stages.push(self.stage_for(Role::Filter, "filter", Mode::Filter, address)?);
            stages.last_mut().unwrap().argv_extras.push(format!("--expr={expr}"));
        }

        if address.is_stdio() {
            stages[0].stdin_source = StreamEndpoint::Inherit;
        } else {
            stages[0].argv_extras.insert(0, address.path.clone());
        }
        let last = stages.len() - 1;
        stages[last].stdout_sink = StreamEndpoint::Inherit;
        wire_adjacent_pipes(&mut stages);

        let pipeline = Pipeline::new(stages);
        validate(&pipeline, address)?;
        Ok(pipeline)
    }

    /// Assemble the write-direction pipeline (NDJSON on this process's
    /// stdin -> sink). Filtering runs before encoding (resolves the spec's
    /// "filter before or after encode on write" open question): a filter
    /// stage, if any, is the first stage, operating on NDJSON directly.
    /// `profile`, if the address resolved one, is passed to the protocol
    /// stage as `JN_PROFILE_JSON` (spec.md §6.4).
    pub fn build_write(&self, address: &Address, params: &[Parameter], profile: Option<&Profile>) -> Result<WritePlan, EngineError> {
        let mut stages = Vec::new();

        let format_subject = self.format_subject(address);
        let probe = self.stage_for(Role::Format, &format_subject, Mode::Write, address)?;
        let config_params = probe.descriptor.config_params.clone();
        let (config, filters) = split_parameters(params, &config_params);

        if let Some(expr) = build_filter_expression(&filters) {
            let mut filter_stage = self.stage_for(Role::Filter, "filter", Mode::Filter, address)?;
            filter_stage.argv_extras.push(format!("--expr={expr}"));
            stages.push(filter_stage);
        }

        let mut format_stage = probe;
        for p in &config {
            format_stage.argv_extras.push(format!("--{}={}", p.key, p.value));
        }
        stages.push(format_stage);

        // Compression is applied innermost-first on write: the last entry
        // in `address.compression` (outermost on disk) is encoded last.
        for compression in address.compression.iter().rev() {
            stages.push(self.stage_for(Role::Compression, compression.token(), Mode::Write, address)?);
        }

        let mut atomic_rename = None;
        if self.protocol_subject(address).is_some() {
            stages.push(self.protocol_stage(address, Mode::Write, profile)?);
            stages.last_mut().unwrap().argv_extras.insert(0, address.path.clone());
        } else if address.is_stdio() {
            stages.last_mut().unwrap().stdout_sink = StreamEndpoint::Inherit;
        } else {
            let final_path = PathBuf::from(&address.path);
            let tmp_path = final_path.with_extension(format!(
                "jn-tmp-{}{}",
                std::process::id(),
                final_path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default()
            ));
            stages.last_mut().unwrap().stdout_sink = StreamEndpoint::File(tmp_path.clone());
            atomic_rename = Some((tmp_path, final_path));
        }

        stages[0].stdin_source = StreamEndpoint::Inherit;
        wire_adjacent_pipes(&mut stages);

        let pipeline = Pipeline::new(stages);
        validate(&pipeline, address)?;
        Ok(WritePlan { pipeline, atomic_rename })
    }

    /// Whether `address` needs a protocol stage at all; `None` here means
    /// no protocol plugin is involved (a bare file path, stdio, ...).
    fn protocol_subject(&self, address: &Address) -> Option<String> {
        match address.kind {
            AddressKind::Url => address.protocol.clone(),
            AddressKind::Profile => Some(address.profile_ref.as_ref()?.namespace.clone()),
            _ => None,
        }
    }

    /// Build the protocol stage. Matched against `address.raw` in full
    /// (spec.md §4.5 step 1: "best match on raw"), not the bare scheme —
    /// unlike the compression stage, which matches on its suffix token.
    /// Carries the resolved profile's merged document as `JN_PROFILE_JSON`
    /// (spec.md §6.4) when one was resolved.
    fn protocol_stage(&self, address: &Address, mode: Mode, profile: Option<&Profile>) -> Result<Stage, EngineError> {
        let mut stage = self.stage_for(Role::Protocol, &address.raw, mode, address)?;
        if let Some(profile) = profile {
            let json = serde_json::to_string(&profile.merged)
                .map_err(|e| EngineError::Config(format!("failed to serialize profile for {}/{}: {e}", profile.namespace, profile.name)))?;
            stage.env_extras.push(("JN_PROFILE_JSON".to_string(), json));
        }
        Ok(stage)
    }

    fn format_subject(&self, address: &Address) -> String {
        match &address.format_hint {
            Some(hint) => format!(".{hint}"),
            None => match &address.residual_extension {
                Some(ext) => format!(".{ext}"),
                None => ".ndjson".to_string(),
            },
        }
    }

    fn stage_for(&self, role: Role, subject: &str, mode: Mode, address: &Address) -> Result<Stage, EngineError> {
        let descriptor = self
            .registry
            .best(role, subject)
            .ok_or_else(|| CoreError::PluginNotFound {
                role: role.as_str().to_string(),
                address: address.raw.clone(),
            })?;
        if !descriptor.supports(mode) {
            return Err(CoreError::ModeUnsupported {
                plugin: descriptor.name.clone(),
                mode: mode.as_str().to_string(),
            }
            .into());
        }
        let mut stage = Stage::new(descriptor.clone(), mode);
        stage.argv_extras.push(mode_flag(mode));
        Ok(stage)
    }
}

fn wire_adjacent_pipes(stages: &mut [Stage]) {
    for i in 0..stages.len().saturating_sub(1) {
        stages[i].stdout_sink = StreamEndpoint::Pipe;
        stages[i + 1].stdin_source = StreamEndpoint::Pipe;
    }
}

fn validate(pipeline: &Pipeline, address: &Address) -> Result<(), EngineError> {
    if !pipeline.is_valid() {
        return Err(CoreError::PipelineValidation(format!("invalid pipeline assembled for {}", address.raw)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jn_core::address::parse;
    use jn_core::plugin::{compile_matches, PluginDescriptor, Tier};

    fn descriptor(name: &str, role: Role, modes: &[Mode], pattern: &str) -> PluginDescriptor {
        let (matches, _) = compile_matches(&[pattern.to_string()], Tier::Bundled);
        PluginDescriptor {
            name: name.to_string(),
            version: "1.0".into(),
            role,
            modes: modes.to_vec(),
            matches,
            config_params: vec!["limit".to_string()],
            executable_path: format!("/bin/{name}"),
            launch_prefix: vec![],
            tier: Tier::Bundled,
            source_mtime: 0,
        }
    }

    #[test]
    fn read_pipeline_assembles_format_and_filter() {
        let mut registry = Registry::new();
        registry.insert(descriptor("csv", Role::Format, &[Mode::Read, Mode::Write], r"\.csv$"));
        registry.insert(descriptor("jnfilter", Role::Filter, &[Mode::Filter], r".*"));

        let address = parse("data.csv?role=admin&limit=5").unwrap();
        let params = Builder::effective_parameters(&address, None);
        let builder = Builder::new(&registry);
        let pipeline = builder.build_read(&address, &params, None).unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.stages[0].descriptor.name, "csv");
        assert!(pipeline.stages[0].argv_extras.contains(&"--limit=5".to_string()));
        assert_eq!(pipeline.stages[1].descriptor.name, "jnfilter");
    }

    #[test]
    fn write_pipeline_orders_filter_before_format() {
        let mut registry = Registry::new();
        registry.insert(descriptor("csv", Role::Format, &[Mode::Read, Mode::Write], r"\.csv$"));
        registry.insert(descriptor("jnfilter", Role::Filter, &[Mode::Filter], r".*"));

        let address = parse("out.csv?role=admin").unwrap();
        let params = Builder::effective_parameters(&address, None);
        let builder = Builder::new(&registry);
        let plan = builder.build_write(&address, &params, None).unwrap();

        assert_eq!(plan.pipeline.stages[0].descriptor.name, "jnfilter");
        assert_eq!(plan.pipeline.stages[1].descriptor.name, "csv");
        assert!(plan.atomic_rename.is_some());
    }

    #[test]
    fn missing_format_plugin_errors() {
        let registry = Registry::new();
        let address = parse("data.csv").unwrap();
        let builder = Builder::new(&registry);
        let err = builder.build_read(&address, &[], None).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::PluginNotFound { .. })));
    }

    #[test]
    fn protocol_stage_matches_on_full_raw_address_and_carries_profile() {
        let mut registry = Registry::new();
        registry.insert(descriptor("http", Role::Protocol, &[Mode::Read], r"^https?://api\.example\.com"));
        registry.insert(descriptor("json", Role::Format, &[Mode::Read], r"\.json$"));

        let address = parse("https://api.example.com/users.json").unwrap();
        let params = Builder::effective_parameters(&address, None);
        let profile = Profile {
            namespace: "myapi".to_string(),
            name: "default".to_string(),
            kind: "http".to_string(),
            merged: serde_json::json!({"base_url": "https://api.example.com", "headers": {"Auth": "Bearer abc"}}),
        };
        let builder = Builder::new(&registry);
        let pipeline = builder.build_read(&address, &params, Some(&profile)).unwrap();

        assert_eq!(pipeline.stages[0].descriptor.name, "http");
        let (key, value) = pipeline.stages[0]
            .env_extras
            .iter()
            .find(|(k, _)| k == "JN_PROFILE_JSON")
            .expect("protocol stage should carry JN_PROFILE_JSON");
        assert_eq!(key, "JN_PROFILE_JSON");
        assert!(value.contains("Bearer abc"));
    }
}
