//! External tool invocation
//!
//! Transcoders (texturec, shaderc, the C# compiler) run through the
//! [`ProcessRunner`] capability so tests can substitute a recorder.

use crate::error::{CompileError, CompileResult};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;
use void_asset::atomic_write_file;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
}

impl ProcessOutput {
    /// Stdout and stderr joined by a newline
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// A tool failed if it exited non-zero or printed `error` anywhere
    pub fn is_failure(&self) -> bool {
        self.combined().contains("error") || self.status != Some(0)
    }
}

/// Capability to run an external program
pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput>;
}

/// Runs programs with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

/// Run a tool and turn a failed run into [`CompileError::Process`]
pub fn run_tool(runner: &dyn ProcessRunner, program: &str, args: &[String]) -> CompileResult<ProcessOutput> {
    log::trace!("Running {} {}", program, args.join(" "));
    let output = runner.run(program, args).map_err(|e| CompileError::Process {
        program: program.to_string(),
        output: e.to_string(),
    })?;

    if output.is_failure() {
        return Err(CompileError::Process {
            program: program.to_string(),
            output: output.combined(),
        });
    }
    Ok(output)
}

/// Run a tool that writes `destination` through the atomic writer
///
/// `args` receives the temp path the tool must write to. The temp file is
/// created empty first so tools that refuse to create files still work. On
/// failure the previous content of `destination` is untouched.
pub fn run_tool_to_file(
    runner: &dyn ProcessRunner,
    program: &str,
    destination: &Path,
    args: impl FnOnce(&Path) -> Vec<String>,
) -> CompileResult<ProcessOutput> {
    let mut outcome = None;
    let written = atomic_write_file(destination, |temp| {
        fs::File::create(temp)?;
        let result = run_tool(runner, program, &args(temp));
        let failed = result.is_err();
        outcome = Some(result);
        if failed {
            return Err(io::Error::new(io::ErrorKind::Other, format!("{} failed", program)));
        }
        Ok(())
    });

    match (outcome, written) {
        (Some(Err(err)), _) => Err(err),
        (_, Err(err)) => Err(err.into()),
        (Some(Ok(output)), Ok(())) => Ok(output),
        (None, Ok(())) => Err(CompileError::Process {
            program: program.to_string(),
            output: "tool was not run".into(),
        }),
    }
}

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
}

type Responder = Box<dyn Fn(&str, &[String]) -> io::Result<ProcessOutput> + Send + Sync>;

/// Runner that records calls and answers through a closure
///
/// Used by tests and dry runs. The default responder succeeds silently.
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    responder: Responder,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::with_responder(|_, _| {
            Ok(ProcessOutput {
                status: Some(0),
                ..Default::default()
            })
        })
    }

    pub fn with_responder(
        responder: impl Fn(&str, &[String]) -> io::Result<ProcessOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Calls made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        self.calls.lock().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
        });
        (self.responder)(program, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, status: Option<i32>) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status,
        }
    }

    #[test]
    fn test_failure_detection() {
        assert!(!output("ok", "", Some(0)).is_failure());
        assert!(output("", "", Some(1)).is_failure());
        assert!(output("", "", None).is_failure());
        assert!(output("", "shader.sc(3): error: bad", Some(0)).is_failure());
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(output("a", "b", Some(0)).combined(), "a\nb");
        assert_eq!(output("", "b", Some(0)).combined(), "b");
        assert_eq!(output("a", "", Some(0)).combined(), "a");
    }

    #[test]
    fn test_run_tool_records_and_fails() {
        let runner = RecordingRunner::with_responder(|_, _| Ok(output("error: nope", "", Some(0))));
        let err = run_tool(&runner, "texturec", &["-f".to_string()]).unwrap_err();
        assert!(matches!(err, CompileError::Process { ref program, .. } if program == "texturec"));
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].args, vec!["-f".to_string()]);
    }

    #[test]
    fn test_failed_tool_keeps_previous_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("wall.png.asset");
        fs::write(&out, b"old").unwrap();

        let runner = RecordingRunner::with_responder(|_, _| Ok(output("", "", Some(3))));
        let result = run_tool_to_file(&runner, "texturec", &out, |temp| {
            vec!["-o".to_string(), temp.display().to_string()]
        });

        assert!(matches!(result, Err(CompileError::Process { .. })));
        assert_eq!(fs::read(&out).unwrap(), b"old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_tool_output_is_committed() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("nested/a.asset");

        let runner = RecordingRunner::with_responder(|_, args| {
            fs::write(&args[1], b"compiled")?;
            Ok(output("", "", Some(0)))
        });
        run_tool_to_file(&runner, "shaderc", &out, |temp| {
            vec!["-o".to_string(), temp.display().to_string()]
        })
        .unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"compiled");
    }

    #[test]
    fn test_missing_program_is_process_error() {
        let err = run_tool(&SystemProcessRunner, "/definitely/not/a/tool", &[]).unwrap_err();
        assert!(matches!(err, CompileError::Process { .. }));
    }
}
