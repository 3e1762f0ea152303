//! Runs a child process with stdout and stderr merged into one pipe.
//!
//! KiCad's command line tools interleave progress on stdout with warnings on
//! stderr; reading both from a single pipe keeps them in the order they were
//! written. The captured bytes are optionally mirrored into a log file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub success: bool,
    /// Combined stdout/stderr exactly as the process wrote it.
    pub raw_output: Vec<u8>,
}

impl CommandOutput {
    /// Combined output with ANSI escape sequences removed.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&strip_ansi_escapes::strip(&self.raw_output)).into_owned()
    }
}

/// Builder for a single child process invocation.
#[derive(Debug)]
pub struct CommandRunner {
    program: OsString,
    args: Vec<OsString>,
    envs: BTreeMap<OsString, OsString>,
    current_dir: Option<PathBuf>,
    log_file: Option<File>,
}

impl CommandRunner {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: BTreeMap::new(),
            current_dir: None,
            log_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Mirror everything the process writes into `file`.
    pub fn log_file(mut self, file: File) -> Self {
        self.log_file = Some(file);
        self
    }

    /// Run to completion. A non-zero exit is reported through
    /// [`CommandOutput::success`], not as an error.
    pub fn run(self) -> Result<CommandOutput> {
        let display = self.display();
        log::debug!("Running: {display}");

        let (mut reader, writer) = os_pipe::pipe().context("Failed to create output pipe")?;
        let writer_err = writer
            .try_clone()
            .context("Failed to duplicate output pipe")?;

        let mut child = {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args)
                .envs(&self.envs)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(writer_err);
            if let Some(dir) = &self.current_dir {
                cmd.current_dir(dir);
            }
            cmd.spawn()
                .with_context(|| format!("Failed to spawn {display}"))?
            // `cmd` drops here, closing our copies of the write end
        };

        let mut raw_output = Vec::new();
        reader
            .read_to_end(&mut raw_output)
            .with_context(|| format!("Failed to read output of {display}"))?;

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {display}"))?;

        if let Some(mut log_file) = self.log_file {
            log_file
                .write_all(&raw_output)
                .context("Failed to write command log")?;
        }

        log::debug!("{display} exited with {status}");
        Ok(CommandOutput {
            success: status.success(),
            status,
            raw_output,
        })
    }

    fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Seek;

    #[test]
    fn test_captures_interleaved_output() {
        let output = CommandRunner::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; printf '\\033[31mred\\033[0m'")
            .run()
            .unwrap();
        assert!(output.success);
        assert_eq!(output.output(), "out\nerr\nred");
    }

    #[test]
    fn test_failure_is_not_an_error() {
        let output = CommandRunner::new("sh").args(["-c", "exit 3"]).run().unwrap();
        assert!(!output.success);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_env_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = CommandRunner::new("sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("GREETING", "hi")
            .current_dir(dir.path())
            .run()
            .unwrap();
        let text = output.output();
        assert!(text.starts_with("hi\n"));
        let expected = dir.path().canonicalize().unwrap();
        assert!(text.contains(expected.file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn test_log_file_receives_output() {
        let mut log = tempfile::tempfile().unwrap();
        CommandRunner::new("sh")
            .args(["-c", "echo logged"])
            .log_file(log.try_clone().unwrap())
            .run()
            .unwrap();
        log.rewind().unwrap();
        let mut text = String::new();
        log.read_to_string(&mut text).unwrap();
        assert_eq!(text, "logged\n");
    }

    #[test]
    fn test_missing_program() {
        let err = CommandRunner::new("definitely-not-a-real-program-xyz")
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
