use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use size_detector_core::{
    check_package, load_config, Configuration, PackageStatus, ProbeOutcome, ProbeSettings,
    SizeEntry, SizeProber,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum SizingAvailability {
    Enabled,
    PackageNotFound,
    GateFailed(String),
}

impl SizingAvailability {
    pub fn from_gate(result: Result<PackageStatus, size_detector_core::PackageError>) -> Self {
        match result {
            Ok(PackageStatus::Installed) => Self::Enabled,
            Ok(PackageStatus::NotFound) => Self::PackageNotFound,
            Err(err) => Self::GateFailed(err.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeReport {
    pub generated_at: String,
    pub directory: PathBuf,
    pub success: bool,
    #[serde(default)]
    pub entries: Vec<SizeEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn from_outcome(directory: &Path, outcome: ProbeOutcome) -> Self {
        let (success, entries, error) = match outcome {
            ProbeOutcome::Success(entries) => (true, entries, None),
            ProbeOutcome::Failure(message) => (false, Vec::new(), Some(message)),
        };
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            directory: directory.to_path_buf(),
            success,
            entries,
            error,
        }
    }
}

/// Everything one run needs: validated config, gate result and a prober.
pub struct Session {
    config: Configuration,
    availability: SizingAvailability,
    prober: SizeProber,
}

impl Session {
    /// Runs the package gate for `config` and builds a prober from its timeouts.
    pub fn new(config: Configuration) -> Self {
        let gate = check_package(&config.package_manager, &config.du_package);
        let availability = SizingAvailability::from_gate(gate);
        match &availability {
            SizingAvailability::Enabled => {}
            SizingAvailability::PackageNotFound => {
                warn!("package {} not found; sizing disabled", config.du_package)
            }
            SizingAvailability::GateFailed(err) => warn!("package check failed: {err}"),
        }
        let prober = SizeProber::new(ProbeSettings::from_config(&config));
        Self::with_parts(config, availability, prober)
    }

    pub fn with_parts(
        config: Configuration,
        availability: SizingAvailability,
        prober: SizeProber,
    ) -> Self {
        Self {
            config,
            availability,
            prober,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn availability(&self) -> &SizingAvailability {
        &self.availability
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.config.win_size
    }

    /// Sizes `directory`, or reports why sizing is unavailable this session.
    pub fn probe(&self, directory: impl AsRef<Path>) -> ProbeReport {
        let directory = directory.as_ref();
        let outcome = match &self.availability {
            SizingAvailability::Enabled => self.prober.probe(directory),
            SizingAvailability::PackageNotFound => ProbeOutcome::Failure(format!(
                "package `{}` not found; sizing is disabled",
                self.config.du_package
            )),
            SizingAvailability::GateFailed(_) => ProbeOutcome::Failure(
                "runtime error; for detailed information see the log file".to_string(),
            ),
        };
        info!(
            "probe of {} finished: success={}",
            directory.display(),
            outcome.is_success()
        );
        ProbeReport::from_outcome(directory, outcome)
    }
}

pub fn open_session(config_path: impl AsRef<Path>) -> Result<Session> {
    let config_path = config_path.as_ref();
    let config = load_config(config_path).ok_or_else(|| {
        anyhow!(
            "configuration {} is missing or malformed; see the log file",
            config_path.display()
        )
    })?;
    Ok(Session::new(config))
}

pub fn write_report(report: &ProbeReport, output: impl AsRef<Path>) -> Result<()> {
    let path = output.as_ref();
    let payload = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

pub fn load_report(path: impl AsRef<Path>) -> Result<ProbeReport> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    let report: ProbeReport = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}
