use std::io;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const QUERY_FLAG: &str = "-qa";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Query {
        command: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Installed,
    NotFound,
}

impl PackageStatus {
    pub fn is_installed(self) -> bool {
        self == Self::Installed
    }
}

pub fn check_package(package_manager: &str, package: &str) -> Result<PackageStatus, PackageError> {
    let command = format!("{package_manager} {QUERY_FLAG} {package}");
    let output = Command::new(package_manager)
        .arg(QUERY_FLAG)
        .arg(package)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| {
            debug!("command `{command}` failed: {source}");
            PackageError::Spawn {
                command: command.clone(),
                source,
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("command `{command}` failed: {stderr}");
        return Err(PackageError::Query {
            command,
            status: output.status.to_string(),
            stderr,
        });
    }

    let status = classify_query_output(&output.stdout);
    info!("package {package} status: {status:?}");
    Ok(status)
}

fn classify_query_output(stdout: &[u8]) -> PackageStatus {
    if String::from_utf8_lossy(stdout).trim().is_empty() {
        PackageStatus::NotFound
    } else {
        PackageStatus::Installed
    }
}
