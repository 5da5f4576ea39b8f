//! Subcommand execution. Everything here returns the text to print so the
//! binary stays a thin shell and tests can check output directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

use crate::cli::args::{CliArgs, Command, LoweringArgs};
use cinder_bound::IteratorMethod;
use cinder_lowering::{
    IteratorStateMachine, LoweringOptions, RunError, StateMachineRunner, StateMapEntry,
    StateNumber, Value, lower_iterators, lower_iterators_with,
};

/// Input file: a single method or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum MethodsFile {
    Many(Vec<IteratorMethod>),
    One(Box<IteratorMethod>),
}

/// `--previous` file: a bare state map, or machines from `lower --json`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum PreviousStates {
    Map(Vec<StateMapEntry>),
    Machines(Vec<IteratorStateMachine>),
    Machine(Box<IteratorStateMachine>),
}

impl PreviousStates {
    /// Previous state numbers for `method`. A bare map applies to every
    /// method; machines only to the method they were lowered from.
    pub fn states_for(&self, method: &str) -> Vec<(u32, StateNumber)> {
        let entries: &[StateMapEntry] = match self {
            Self::Map(entries) => entries.as_slice(),
            Self::Machine(machine) if machine.method_name == method => machine.state_map.as_slice(),
            Self::Machine(_) => &[],
            Self::Machines(machines) => machines
                .iter()
                .find(|machine| machine.method_name == method)
                .map_or(&[][..], |machine| machine.state_map.as_slice()),
        };
        entries
            .iter()
            .map(|entry| (entry.syntax_offset, entry.state))
            .collect()
    }
}

/// What enumerating one machine produced.
#[derive(Debug, Default, PartialEq)]
pub struct RunReport {
    pub values: Vec<Value>,
    pub calls: Vec<String>,
    /// Message of an exception that escaped `MoveNext` or `Dispose`.
    pub unhandled: Option<String>,
}

pub fn execute(args: &CliArgs) -> Result<String> {
    match &args.command {
        Command::Lower {
            input,
            json,
            lowering,
        } => lower(input, *json, lowering),
        Command::Run {
            input,
            take,
            dispose,
            fail_on,
            lowering,
        } => run(input, *take, *dispose, fail_on, lowering),
    }
}

/// Read methods from `path`. The flag says whether the file held an array.
pub fn load_methods(path: &Path) -> Result<(Vec<IteratorMethod>, bool)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: MethodsFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not an iterator method file", path.display()))?;
    Ok(match file {
        MethodsFile::Many(methods) => (methods, true),
        MethodsFile::One(method) => (vec![*method], false),
    })
}

pub fn load_previous(path: &Path) -> Result<PreviousStates> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| {
        format!(
            "{} is neither a state map nor a lowered machine",
            path.display()
        )
    })
}

pub fn lower_all(
    methods: &[IteratorMethod],
    lowering: &LoweringArgs,
) -> Result<Vec<IteratorStateMachine>> {
    let options = LoweringOptions {
        track_initial_thread: !lowering.no_thread_check,
        ..LoweringOptions::default()
    };
    let previous = lowering.previous.as_deref().map(load_previous).transpose()?;

    let results = match &previous {
        None => lower_iterators(methods, &options),
        Some(previous) => lower_iterators_with(methods, |method| {
            options
                .clone()
                .with_previous_states(previous.states_for(&method.name))
        }),
    };

    methods
        .iter()
        .zip(results)
        .map(|(method, result)| result.with_context(|| format!("failed to lower '{}'", method.name)))
        .collect()
}

fn lower(input: &Path, json: bool, lowering: &LoweringArgs) -> Result<String> {
    let (methods, many) = load_methods(input)?;
    let machines = lower_all(&methods, lowering)?;
    info!(count = machines.len(), "lowered");

    if json {
        let mut text = match machines.as_slice() {
            [machine] if !many => serde_json::to_string_pretty(machine)?,
            _ => serde_json::to_string_pretty(&machines)?,
        };
        text.push('\n');
        return Ok(text);
    }

    let rendered: Vec<String> = machines.iter().map(IteratorStateMachine::render).collect();
    Ok(rendered.join("\n"))
}

fn run(
    input: &Path,
    take: Option<usize>,
    dispose: bool,
    fail_on: &[String],
    lowering: &LoweringArgs,
) -> Result<String> {
    let (methods, _) = load_methods(input)?;
    let machines = lower_all(&methods, lowering)?;

    let mut out = String::new();
    for machine in &machines {
        let report = enumerate(machine, take, dispose, fail_on)
            .with_context(|| format!("failed to run '{}'", machine.method_name))?;
        writeln!(out, "{}", machine.method_name)?;
        writeln!(out, "  yielded: {}", join_or_none(&report.values))?;
        writeln!(out, "  calls: {}", join_or_none(&report.calls))?;
        if let Some(message) = &report.unhandled {
            writeln!(out, "  unhandled: {message}")?;
        }
    }
    Ok(out)
}

/// Enumerate `machine` the way `foreach` would, stopping at the first
/// unhandled exception. Evaluator failures other than exceptions are errors.
pub fn enumerate(
    machine: &IteratorStateMachine,
    take: Option<usize>,
    dispose: bool,
    fail_on: &[String],
) -> Result<RunReport> {
    let mut runner = fail_on
        .iter()
        .fold(StateMachineRunner::new(machine), |runner, name| {
            runner.fail_on(name.as_str())
        });
    let mut report = RunReport::default();

    match runner.enumerate_into(&mut report.values, take, dispose) {
        Ok(()) => {}
        Err(RunError::Unhandled(message)) => {
            debug!(machine = %machine.name, %message, "enumeration threw");
            report.unhandled = Some(message);
        }
        Err(err) => return Err(err.into()),
    }
    report.calls = runner.take_trace();
    Ok(report)
}

fn join_or_none<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
