//! Integration tests exercising the end-to-end scenarios from spec.md §8.2
//! against the fixture plugins in `jn-test-support`, wiring the registry by
//! hand rather than through discovery so each test pins down exactly which
//! plugin a stage resolves to.

use jn_core::address::parse;
use jn_core::plugin::{compile_matches, Mode, PluginDescriptor, Role, Tier};
use jn_core::{Pipeline, Registry};
use jn_engine::builder::Builder;
use jn_engine::executor;

fn descriptor(name: &str, path: &str, role: Role, modes: &[Mode], pattern: &str, config_params: &[&str]) -> PluginDescriptor {
    let (matches, _) = compile_matches(&[pattern.to_string()], Tier::Bundled);
    PluginDescriptor {
        name: name.to_string(),
        version: "0.1.0".to_string(),
        role,
        modes: modes.to_vec(),
        matches,
        config_params: config_params.iter().map(|s| s.to_string()).collect(),
        executable_path: path.to_string(),
        launch_prefix: Vec::new(),
        tier: Tier::Bundled,
        source_mtime: 0,
    }
}

fn registry_with_csv_and_filter() -> Registry {
    let mut registry = Registry::new();
    registry.insert(descriptor(
        "csv",
        env!("CARGO_BIN_EXE_jn-fixture-csv"),
        Role::Format,
        &[Mode::Read, Mode::Write],
        r"\.csv$",
        &[],
    ));
    registry.insert(descriptor(
        "filter",
        env!("CARGO_BIN_EXE_jn-fixture-filter"),
        Role::Filter,
        &[Mode::Filter],
        r".*",
        &[],
    ));
    registry
}

async fn no_cancel() {
    std::future::pending::<()>().await
}

#[tokio::test]
async fn s1_read_csv_emits_ndjson() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("people.csv");
    std::fs::write(&csv_path, "name,age\nalice,30\nbob,25\n").unwrap();

    let registry = registry_with_csv_and_filter();
    let address = parse(csv_path.to_str().unwrap()).unwrap();
    let params = Builder::effective_parameters(&address, None);
    let pipeline = Builder::new(&registry).build_read(&address, &params, None).unwrap();
    assert_eq!(pipeline.len(), 1);

    let results = executor::execute(pipeline, no_cancel()).await.unwrap();
    assert!(results.iter().all(|r| r.succeeded()));
}

#[tokio::test]
async fn s_write_csv_round_trips_through_temp_file_then_rename() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.csv");

    let registry = registry_with_csv_and_filter();
    let address = parse(out_path.to_str().unwrap()).unwrap();
    let params = Builder::effective_parameters(&address, None);
    let plan = Builder::new(&registry).build_write(&address, &params, None).unwrap();
    let (tmp_path, final_path) = plan.atomic_rename.clone().unwrap();
    assert_eq!(final_path, out_path);
    assert_ne!(tmp_path, final_path);

    // Feed NDJSON on the first stage's stdin by wiring it ourselves: the
    // executor always wires stage 0's stdin as Inherit for `put`, so for
    // this test we build the pipeline fresh with a File source instead.
    let mut pipeline = plan.pipeline;
    let input_path = dir.path().join("in.ndjson");
    std::fs::write(&input_path, "{\"name\":\"alice\",\"age\":30}\n").unwrap();
    pipeline.stages[0].stdin_source = jn_core::pipeline::StreamEndpoint::File(input_path);

    executor::execute(pipeline, no_cancel()).await.unwrap();
    assert!(tmp_path.exists(), "write lands at the temp path until the caller renames it");
    assert!(!final_path.exists(), "final path must not exist before the rename");

    // `Runtime::put` performs this rename only after every stage succeeds;
    // this test exercises the executor in isolation, so it does the rename
    // itself to confirm the temp file holds the expected output.
    std::fs::rename(&tmp_path, &final_path).unwrap();
    let contents = std::fs::read_to_string(&final_path).unwrap();
    assert!(contents.contains("alice"));
}

#[tokio::test]
async fn filter_stage_drops_non_matching_records() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("people.csv");
    std::fs::write(&csv_path, "name,role\nalice,admin\nbob,guest\n").unwrap();

    let registry = registry_with_csv_and_filter();
    let address = parse(&format!("{}?role=admin", csv_path.display())).unwrap();
    let params = Builder::effective_parameters(&address, None);
    let pipeline = Builder::new(&registry).build_read(&address, &params, None).unwrap();
    assert_eq!(pipeline.len(), 2, "format stage followed by a filter stage");

    let results = executor::execute(pipeline, no_cancel()).await.unwrap();
    assert!(results.iter().all(|r| r.succeeded()));
}

/// spec.md §8.2, S2: a downstream stage that stops consuming early must not
/// turn the upstream's resulting SIGPIPE into a pipeline failure.
#[tokio::test]
async fn s2_early_termination_is_not_a_failure() {
    let mut registry = Registry::new();
    registry.insert(descriptor(
        "fastsource",
        env!("CARGO_BIN_EXE_jn-fixture-fastsource"),
        Role::Protocol,
        &[Mode::Read],
        "^fastsource$",
        &["count"],
    ));
    registry.insert(descriptor(
        "headsink",
        env!("CARGO_BIN_EXE_jn-fixture-headsink"),
        Role::Protocol,
        &[Mode::Write],
        "^headsink$",
        &["count"],
    ));

    let source = registry.find_by_name(Role::Protocol, "fastsource").unwrap().clone();
    let sink = registry.find_by_name(Role::Protocol, "headsink").unwrap().clone();

    let mut source_stage = jn_core::pipeline::Stage::new(source, Mode::Read);
    source_stage.argv_extras.push("--mode=read".to_string());
    source_stage.argv_extras.push("--count=5000000".to_string());
    source_stage.stdout_sink = jn_core::pipeline::StreamEndpoint::Pipe;

    let mut sink_stage = jn_core::pipeline::Stage::new(sink, Mode::Write);
    sink_stage.argv_extras.push("--mode=write".to_string());
    sink_stage.argv_extras.push("--count=3".to_string());
    sink_stage.stdin_source = jn_core::pipeline::StreamEndpoint::Pipe;
    sink_stage.stdout_sink = jn_core::pipeline::StreamEndpoint::Inherit;

    let pipeline = Pipeline::new(vec![source_stage, sink_stage]);
    let results = executor::execute(pipeline, no_cancel()).await.unwrap();
    assert!(results.iter().all(|r| r.succeeded()), "SIGPIPE on the non-final stage must be benign");
}
