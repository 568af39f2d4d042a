use crate::disk::error::{DiskError, DiskResult};
use crate::ui::prelude::*;
use std::time::{Duration, Instant};

pub mod host;
pub mod retry;
pub mod worker;

#[cfg(test)]
pub mod testing;

/// An external tool invocation, kept separate from how it gets executed so
/// parsers and planners can be tested against canned output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Mutating commands are skipped in dry-run mode; probes always run.
    pub mutating: bool,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(10),
            mutating: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// Shell-quoted rendering used in logs and error messages.
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into a `ToolInvocation` error carrying stderr.
    pub fn into_checked(self, command: &ToolCommand) -> DiskResult<ToolOutput> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DiskError::ToolInvocation {
                command: command.display(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run the command to completion. Only spawn failures and timeouts are
    /// errors here; a non-zero exit is reported through `ToolOutput::code`.
    fn run(&self, command: &ToolCommand) -> DiskResult<ToolOutput>;

    fn run_checked(&self, command: &ToolCommand) -> DiskResult<ToolOutput> {
        self.run(command)?.into_checked(command)
    }

    fn dry_run(&self) -> bool {
        false
    }
}

pub struct CommandExecutor {
    pub dry_run: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn print_dry_run(&self, command: &ToolCommand) {
        emit(
            Level::Info,
            "exec.dry_run",
            &format!("[DRY RUN] {}", command.display()),
            None,
        );
    }
}

impl CommandRunner for CommandExecutor {
    fn run(&self, command: &ToolCommand) -> DiskResult<ToolOutput> {
        if self.dry_run && command.mutating {
            self.print_dry_run(command);
            return Ok(ToolOutput::success(""));
        }

        emit(
            Level::Debug,
            "exec.run",
            &format!("> {}", command.display()),
            None,
        );

        let handle = duct::cmd(&command.program, &command.args)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()?;

        let deadline = Instant::now() + command.timeout;
        loop {
            if let Some(output) = handle.try_wait()? {
                return Ok(ToolOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            if Instant::now() >= deadline {
                let _ = handle.kill();
                return Err(DiskError::ToolTimeout {
                    command: command.display(),
                    seconds: command.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }
}
