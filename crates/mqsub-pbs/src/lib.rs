//! # mqsub PBS adapters
//!
//! Thin wrappers around the scheduler's own commands. Nothing here talks to
//! the PBS server directly; every answer comes from parsing command output.
//!
//! - [`Qsub`]: submits with pass-through arguments and extracts the job id
//! - [`Qstat`]: [`StatusSource`](mqsub_core::StatusSource) backed by
//!   `qstat -f` and `tracejob`

pub mod qstat;
pub mod submit;

pub use qstat::Qstat;
pub use submit::{Qsub, Submission, parse_job_id};

/// A configured external command: program plus leading arguments.
///
/// Built from a config string split on whitespace, so wrappers such as
/// `ssh login1 qstat` work as well as a bare `qstat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// A tokio command with the leading arguments already applied.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn shell(script: &str) -> CommandSpec {
    // `sh -c SCRIPT NAME ARGS...`: NAME becomes $0, ARGS become $1..
    CommandSpec::new("sh").arg("-c").arg(script).arg("fake")
}
