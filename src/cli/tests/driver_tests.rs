use super::args::LoweringArgs;
use super::driver::{PreviousStates, RunReport, enumerate, load_methods, load_previous, lower_all};
use cinder_lowering::{StateMapEntry, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CLEANUP: &str = r#"{
  "name": "Numbers",
  "element_type": "int",
  "kind": "enumerable",
  "body": {"block": [
    {"try": {
      "try_block": {"block": [
        {"yield_return": {"expr": {"literal": 1}, "syntax_offset": 10}},
        {"yield_return": {"expr": {"literal": 2}, "syntax_offset": 20}}
      ]},
      "finally_block": {"block": [
        {"expression": {"call": {"callee": {"host": "Cleanup"}}}}
      ]},
      "syntax_offset": 4
    }}
  ]}
}"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write test file");
    path
}

fn lowered(dir: &TempDir, lowering: &LoweringArgs) -> Vec<cinder_lowering::IteratorStateMachine> {
    let input = write_file(dir.path(), "cleanup.json", CLEANUP);
    let (methods, _) = load_methods(&input).expect("should load");
    lower_all(&methods, lowering).expect("should lower")
}

#[test]
fn load_methods_accepts_object_or_array() {
    let dir = TempDir::new().expect("temp dir");
    let one = write_file(dir.path(), "one.json", CLEANUP);
    let many = write_file(dir.path(), "many.json", &format!("[{CLEANUP}, {CLEANUP}]"));

    let (methods, is_array) = load_methods(&one).expect("should load");
    assert_eq!(methods.len(), 1);
    assert!(!is_array);

    let (methods, is_array) = load_methods(&many).expect("should load");
    assert_eq!(methods.len(), 2);
    assert!(is_array);
}

#[test]
fn load_methods_reports_bad_json() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_file(dir.path(), "bad.json", r#"{"name": 3}"#);
    let err = load_methods(&path).unwrap_err();
    assert!(err.to_string().contains("is not an iterator method file"), "{err}");
}

#[test]
fn enumerate_runs_finally_once() {
    let dir = TempDir::new().expect("temp dir");
    let machines = lowered(&dir, &LoweringArgs::default());

    let report = enumerate(&machines[0], None, true, &[]).expect("should run");
    assert_eq!(
        report,
        RunReport {
            values: vec![Value::Int(1), Value::Int(2)],
            calls: vec!["Cleanup()".to_string()],
            unhandled: None,
        }
    );
}

#[test]
fn enumerate_disposes_early_exit() {
    let dir = TempDir::new().expect("temp dir");
    let machines = lowered(&dir, &LoweringArgs::default());

    let report = enumerate(&machines[0], Some(1), true, &[]).expect("should run");
    assert_eq!(report.values, vec![Value::Int(1)]);
    assert_eq!(report.calls, ["Cleanup()"]);

    let report = enumerate(&machines[0], Some(1), false, &[]).expect("should run");
    assert!(report.calls.is_empty());
}

#[test]
fn enumerate_records_unhandled_exception() {
    let dir = TempDir::new().expect("temp dir");
    let machines = lowered(&dir, &LoweringArgs::default());

    let report =
        enumerate(&machines[0], None, true, &["Cleanup".to_string()]).expect("should run");
    assert_eq!(report.values, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(report.calls, ["Cleanup()"]);
    assert_eq!(report.unhandled.as_deref(), Some("Cleanup failed"));
}

#[test]
fn previous_state_map_is_honoured() {
    let dir = TempDir::new().expect("temp dir");
    let previous = write_file(
        dir.path(),
        "previous.json",
        r#"[{"syntax_offset": 10, "state": 2}, {"syntax_offset": 20, "state": 1}]"#,
    );
    let lowering = LoweringArgs {
        previous: Some(previous),
        no_thread_check: false,
    };
    let machines = lowered(&dir, &lowering);

    let state_of = |offset| {
        machines[0]
            .state_map
            .iter()
            .find(|entry| entry.syntax_offset == offset)
            .map(|entry| entry.state)
    };
    assert_eq!(state_of(10), Some(2));
    assert_eq!(state_of(20), Some(1));

    let report = enumerate(&machines[0], None, true, &[]).expect("should run");
    assert_eq!(report.values, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn previous_machine_applies_to_its_method_only() {
    let dir = TempDir::new().expect("temp dir");
    let machines = lowered(&dir, &LoweringArgs::default());
    let previous = write_file(
        dir.path(),
        "previous.json",
        &serde_json::to_string(&machines[0]).expect("serialize"),
    );

    let previous = load_previous(&previous).expect("should load");
    assert!(matches!(previous, PreviousStates::Machine(_)));
    assert!(previous.states_for("Other").is_empty());

    let mut states = previous.states_for("Numbers");
    states.sort_unstable();
    let mut expected: Vec<(u32, i32)> = machines[0]
        .state_map
        .iter()
        .map(|entry| (entry.syntax_offset, entry.state))
        .collect();
    expected.sort_unstable();
    assert_eq!(states, expected);
}

#[test]
fn previous_machine_list_is_matched_by_method_name() {
    let dir = TempDir::new().expect("temp dir");
    let machines = lowered(&dir, &LoweringArgs::default());
    let previous = write_file(
        dir.path(),
        "previous.json",
        &serde_json::to_string(&machines).expect("serialize"),
    );

    let loaded = load_previous(&previous).expect("should load");
    assert!(matches!(loaded, PreviousStates::Machines(_)));
    assert!(loaded.states_for("Other").is_empty());

    let lowering = LoweringArgs {
        previous: Some(previous),
        no_thread_check: false,
    };
    assert_eq!(lowered(&dir, &lowering), machines);
}

#[test]
fn bare_state_map_applies_to_every_method() {
    let previous = PreviousStates::Map(vec![StateMapEntry {
        syntax_offset: 7,
        state: 3,
    }]);
    assert_eq!(previous.states_for("A"), [(7, 3)]);
    assert_eq!(previous.states_for("B"), [(7, 3)]);
}
