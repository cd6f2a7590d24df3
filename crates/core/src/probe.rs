use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::process::{escalate_kill, wait_timeout, ProcessTable, SystemProcessTable};

pub const AGGREGATE_LABEL: &str = "total";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("`{}` directory does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("runtime error; for detailed information see the log file")]
    Spawn(#[source] io::Error),
    #[error("timeout: the directory is very large; you can increase duTimeout in the config file")]
    Timeout,
    #[error("permission denied; please try again with root access")]
    PermissionDenied { stderr: String },
    #[error("runtime error; for detailed information see the log file")]
    Process { stderr: String },
    #[error("runtime error; for detailed information see the log file")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub size: String,
    pub name: String,
    #[serde(default)]
    pub aggregate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(Vec<SizeEntry>),
    Failure(String),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DuCommand {
    fn default() -> Self {
        Self {
            program: "du".to_string(),
            args: vec!["-h".to_string(), "--max-depth=1".to_string()],
        }
    }
}

impl DuCommand {
    pub fn executable_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.program)
    }

    fn describe(&self, directory: &Path) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(directory.display().to_string());
        parts.join(" ")
    }
}

pub trait Launcher {
    fn spawn(&self, command: &mut Command) -> io::Result<Child>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn spawn(&self, command: &mut Command) -> io::Result<Child> {
        command.spawn()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub du_timeout: Duration,
    pub gen_timeout: Duration,
    pub command: DuCommand,
    pub elevated: bool,
}

impl ProbeSettings {
    pub fn new(du_timeout: Duration, gen_timeout: Duration) -> Self {
        Self {
            du_timeout,
            gen_timeout,
            command: DuCommand::default(),
            elevated: effective_user_is_root(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.du_timeout(), config.gen_timeout())
    }
}

pub fn effective_user_is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub struct SizeProber {
    settings: ProbeSettings,
    launcher: Box<dyn Launcher>,
    table: Box<dyn ProcessTable>,
}

impl SizeProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings,
            launcher: Box::new(SystemLauncher),
            table: Box::new(SystemProcessTable),
        }
    }

    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_process_table(mut self, table: impl ProcessTable + 'static) -> Self {
        self.table = Box::new(table);
        self
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn probe(&self, directory: impl AsRef<Path>) -> ProbeOutcome {
        let directory = directory.as_ref();
        match self.run(directory) {
            Ok(lines) => ProbeOutcome::Success(parse_entries(&lines, directory)),
            Err(err) => ProbeOutcome::Failure(err.to_string()),
        }
    }

    pub fn run(&self, directory: &Path) -> Result<Vec<String>, ProbeError> {
        if !directory.exists() {
            return Err(ProbeError::MissingDirectory(directory.to_path_buf()));
        }

        let du = &self.settings.command;
        let shell = du.describe(directory);
        let mut command = Command::new(&du.program);
        command
            .args(&du.args)
            .arg(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.launcher.spawn(&mut command).map_err(|err| {
            debug!("command `{shell}` failed: {err}");
            ProbeError::Spawn(err)
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match wait_timeout(&mut child, self.settings.du_timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("command execution timeout `{shell}`");
                self.stop(&mut child, &shell);
                return Err(ProbeError::Timeout);
            }
            Err(err) => {
                debug!("waiting on `{shell}` failed: {err}");
                self.stop(&mut child, &shell);
                return Err(ProbeError::Io(err));
            }
        }

        let out = collect(stdout)?;
        let err = collect(stderr)?;

        if !err.is_empty() {
            let stderr = String::from_utf8_lossy(&err).into_owned();
            if !self.settings.elevated {
                return Err(ProbeError::PermissionDenied { stderr });
            }
            debug!("command `{shell}` failed: {stderr}");
            return Err(ProbeError::Process { stderr });
        }

        info!("sized {}", directory.display());
        Ok(String::from_utf8_lossy(&out)
            .split('\n')
            .map(str::to_string)
            .collect())
    }

    fn stop(&self, child: &mut Child, shell: &str) {
        let step = escalate_kill(
            child,
            self.settings.command.executable_name(),
            self.settings.gen_timeout,
            self.table.as_ref(),
        );
        debug!("escalation for `{shell}` ended with {step:?}");
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("pipe reader panicked"))?,
        None => Ok(Vec::new()),
    }
}

pub fn parse_entries<S: AsRef<str>>(lines: &[S], directory: &Path) -> Vec<SizeEntry> {
    let prefix = directory.to_string_lossy();
    let mut entries = lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let line = line.trim();
            let Some((size, path)) = line.split_once(char::is_whitespace) else {
                debug!("skipping du line without a path: {line:?}");
                return None;
            };
            Some(SizeEntry {
                size: size.to_string(),
                name: display_name(path.trim_start(), &prefix),
                aggregate: false,
            })
        })
        .collect::<Vec<_>>();

    if let Some(last) = entries.last_mut() {
        last.name = AGGREGATE_LABEL.to_string();
        last.aggregate = true;
    }
    entries
}

fn display_name(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix)
        .unwrap_or(path)
        .trim_start_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{parse_entries, DuCommand, ProbeError, AGGREGATE_LABEL};

    #[test]
    fn parses_listing_relative_to_root() {
        let lines = ["16K\t/a", "32K\t/b", "48K\t/", ""];
        let entries = parse_entries(&lines, Path::new("/"));

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[0].size, "16K");
        assert_eq!(entries[1].name, "b");
        assert_eq!(entries[2].name, AGGREGATE_LABEL);
        assert!(entries[2].aggregate);
        assert!(!entries[0].aggregate);
    }

    #[test]
    fn strips_nested_prefix_and_keeps_spaces_in_names() {
        let lines = [
            "4.0K\t/srv/data/my files",
            "1.2M\t/srv/data/logs",
            "1.3M\t/srv/data",
        ];
        let entries = parse_entries(&lines, Path::new("/srv/data"));
        assert_eq!(entries[0].name, "my files");
        assert_eq!(entries[1].name, "logs");
        assert_eq!(entries[2].size, "1.3M");
    }

    #[test]
    fn skips_lines_without_path_and_handles_empty_output() {
        let entries = parse_entries(&["garbage", "8K\t/tmp/x", "8K\t/tmp"], Path::new("/tmp"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "x");

        let empty: [&str; 1] = [""];
        assert!(parse_entries(&empty, Path::new("/tmp")).is_empty());
    }

    #[test]
    fn failure_messages_carry_guidance() {
        let missing = ProbeError::MissingDirectory("/nope".into()).to_string();
        assert!(missing.contains("/nope"));
        assert!(ProbeError::Timeout.to_string().contains("duTimeout"));
        let denied = ProbeError::PermissionDenied {
            stderr: String::new(),
        };
        assert!(denied.to_string().contains("root"));
    }

    #[test]
    fn executable_name_ignores_directories() {
        let command = DuCommand {
            program: "/usr/bin/du".to_string(),
            args: Vec::new(),
        };
        assert_eq!(command.executable_name(), "du");
        assert_eq!(DuCommand::default().executable_name(), "du");
    }
}
