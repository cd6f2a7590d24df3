pub mod config;
pub mod package;
pub mod probe;
pub mod process;

pub use config::{load_config, ConfigError, Configuration};
pub use package::{check_package, PackageError, PackageStatus};
pub use probe::{
    effective_user_is_root, parse_entries, DuCommand, Launcher, ProbeError, ProbeOutcome,
    ProbeSettings, SizeEntry, SizeProber, SystemLauncher, AGGREGATE_LABEL,
};
pub use process::{
    escalate_kill, wait_timeout, Escalation, ProcessTable, RunningProcess, SystemProcessTable,
};
