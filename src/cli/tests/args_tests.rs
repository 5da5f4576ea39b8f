use super::args::{CliArgs, Command};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn parses_lower_with_json() {
    let args = CliArgs::try_parse_from(["cinder", "lower", "m.json", "--json"])
        .expect("should parse");
    match args.command {
        Command::Lower {
            input,
            json,
            lowering,
        } => {
            assert_eq!(input, PathBuf::from("m.json"));
            assert!(json);
            assert!(lowering.previous.is_none());
            assert!(!lowering.no_thread_check);
        }
        other => panic!("expected lower, got {other:?}"),
    }
}

#[test]
fn parses_run_options() {
    let args = CliArgs::try_parse_from([
        "cinder",
        "run",
        "m.json",
        "--take",
        "2",
        "--dispose",
        "--fail-on",
        "Cleanup",
        "--fail-on",
        "Log",
        "--previous",
        "old.json",
        "--no-thread-check",
    ])
    .expect("should parse");
    match args.command {
        Command::Run {
            input,
            take,
            dispose,
            fail_on,
            lowering,
        } => {
            assert_eq!(input, PathBuf::from("m.json"));
            assert_eq!(take, Some(2));
            assert!(dispose);
            assert_eq!(fail_on, ["Cleanup", "Log"]);
            assert_eq!(lowering.previous, Some(PathBuf::from("old.json")));
            assert!(lowering.no_thread_check);
        }
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn rejects_missing_input() {
    assert!(CliArgs::try_parse_from(["cinder", "lower"]).is_err());
}

#[test]
fn rejects_non_numeric_take() {
    assert!(CliArgs::try_parse_from(["cinder", "run", "m.json", "--take", "all"]).is_err());
}
