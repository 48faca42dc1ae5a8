//! The boundary to the external solver.
//!
//! The solver is opaque: it receives the text produced by
//! [`crate::serialize::solver_text`] and answers with move codes `0..=3`
//! (right, up, left, down). [`CommandSolver`] talks to a solver program over
//! stdin/stdout.

use std::{
    io::{self, Read, Write},
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};

use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::Direction;

/// Represents a failed solve request. None of these touch session state.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Failed to start solver '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Solver I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Solver did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Solver exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("Solver answered with an invalid move code '{0}'")]
    InvalidResponse(String),
}

/// Anything that can turn a puzzle description into a move sequence.
pub trait SolverClient {
    fn solve(&self, puzzle_text: &str) -> Result<Vec<Direction>, SolverError>;
}

impl<F> SolverClient for F
where
    F: Fn(&str) -> Result<Vec<Direction>, SolverError>,
{
    fn solve(&self, puzzle_text: &str) -> Result<Vec<Direction>, SolverError> {
        self(puzzle_text)
    }
}

/// Parses a solver answer: move codes separated by whitespace and/or commas,
/// optionally wrapped in `[` `]`.
pub fn parse_move_codes(text: &str) -> Result<Vec<Direction>, SolverError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<u8>()
                .ok()
                .and_then(Direction::from_code)
                .ok_or_else(|| SolverError::InvalidResponse(token.to_string()))
        })
        .collect()
}

/// Runs a solver program per request, feeding the puzzle on stdin and reading
/// move codes from stdout.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandSolver {
    /// Feeds the puzzle and waits for the answer. Any error leaves the child
    /// for the caller to reap.
    fn exchange(
        &self,
        child: &mut Child,
        puzzle_text: &str,
    ) -> Result<(ExitStatus, String, String), SolverError> {
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        // Pipes are serviced on their own threads so the timeout covers a
        // solver that never reads its input or floods its output.
        let stdout_handle = thread::spawn(move || read_all(stdout));
        let stderr_handle = thread::spawn(move || read_all(stderr));
        let input = puzzle_text.as_bytes().to_vec();
        let stdin_handle = thread::spawn(move || write_input(stdin, &input));

        let Some(status) = child.wait_timeout(self.timeout)? else {
            warn!("solver timed out, killing");
            return Err(SolverError::Timeout(self.timeout));
        };

        join_thread(stdin_handle)?;
        let stdout = join_thread(stdout_handle)?;
        let stderr = join_thread(stderr_handle)?;
        Ok((status, stdout, stderr))
    }
}

impl SolverClient for CommandSolver {
    #[instrument(skip_all, fields(program = %self.program, timeout_ms = self.timeout.as_millis() as u64))]
    fn solve(&self, puzzle_text: &str) -> Result<Vec<Direction>, SolverError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SolverError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (status, stdout, stderr) = match self.exchange(&mut child, puzzle_text) {
            Ok(output) => output,
            Err(err) => {
                reap(&mut child);
                return Err(err);
            }
        };
        debug!(exit_code = ?status.code(), "solver finished");

        if !status.success() {
            return Err(SolverError::Failed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        parse_move_codes(&stdout)
    }
}

/// Kills the child and waits for it so no solver outlives a failed request.
fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(%err, "failed to kill solver");
    }
    if let Err(err) = child.wait() {
        warn!(%err, "failed to wait for solver");
    }
}

/// A solver may answer without consuming all of its input; the closed pipe
/// that leaves behind is not an error.
fn write_input(mut stdin: ChildStdin, input: &[u8]) -> io::Result<()> {
    match stdin.write_all(input) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

fn missing_pipe(name: &str) -> SolverError {
    SolverError::Io(io::Error::other(format!("{name} was not piped")))
}

fn read_all(mut stream: impl Read) -> io::Result<String> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn join_thread<T>(handle: thread::JoinHandle<io::Result<T>>) -> Result<T, SolverError> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(SolverError::Io(io::Error::other("solver pipe thread panicked"))),
    }
}
