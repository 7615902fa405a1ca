use crate::errors::{Result, UtilsError};
use cloud_select_core::solver::unquote;
use cloud_select_core::{FactProgram, SelectError, Solver, SolverModel, SELECTION_RULES};
use log::{debug, trace};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs fact programs through an external `clingo` binary
#[derive(Debug, Clone)]
pub struct ClingoSolver {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ClingoOutput {
    #[serde(rename = "Result")]
    result: String,
    #[serde(rename = "Call", default)]
    calls: Vec<ClingoCall>,
}

#[derive(Debug, Deserialize)]
struct ClingoCall {
    #[serde(rename = "Witnesses", default)]
    witnesses: Vec<ClingoWitness>,
}

#[derive(Debug, Deserialize)]
struct ClingoWitness {
    #[serde(rename = "Value", default)]
    value: Vec<String>,
}

impl ClingoSolver {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Use `explicit` if given, otherwise find `clingo` on the PATH
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path.to_path_buf()));
        }

        let program = which::which("clingo")
            .map_err(|e| UtilsError::Process(format!("clingo not found on PATH: {}", e)))?;
        debug!("Using clingo at {}", program.display());
        Ok(Self::new(program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, input: &str) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .arg("--outf=2")
            .arg("--models=1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            UtilsError::Process(format!(
                "Failed to start {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| UtilsError::Process(format!("Failed to write facts: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| UtilsError::Process(format!("Failed to wait for clingo: {}", e)))?;

        // clingo reports SAT/UNSAT through non-zero exit codes, so only an
        // empty stdout counts as a failure here
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(UtilsError::Process(format!(
                "clingo exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(stdout)
    }
}

/// Parse clingo's JSON output into the set of selected instance names
pub fn parse_clingo_output(stdout: &str) -> Result<SolverModel> {
    let output: ClingoOutput = serde_json::from_str(stdout)?;

    match output.result.as_str() {
        "UNSATISFIABLE" => return Ok(SolverModel::unsatisfiable()),
        "SATISFIABLE" | "OPTIMUM FOUND" => {}
        other => {
            return Err(UtilsError::Process(format!(
                "clingo returned {}",
                other
            )))
        }
    }

    let atoms = output
        .calls
        .last()
        .and_then(|call| call.witnesses.last())
        .map(|witness| witness.value.as_slice())
        .unwrap_or(&[]);

    let mut model = SolverModel::default();
    for atom in atoms {
        let name = atom
            .strip_prefix("selected(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(unquote)
            .ok_or_else(|| UtilsError::Process(format!("Unexpected atom: {}", atom)))?;
        model.selected.insert(name);
    }

    Ok(model)
}

impl Solver for ClingoSolver {
    fn name(&self) -> &'static str {
        "clingo"
    }

    fn solve(&self, program: &FactProgram) -> cloud_select_core::Result<SolverModel> {
        let input = format!("{}\n{}", SELECTION_RULES, program);
        trace!("clingo input:\n{}", input);

        self.run(&input)
            .and_then(|stdout| parse_clingo_output(&stdout))
            .map_err(|e| SelectError::Solver(e.to_string()))
    }
}
