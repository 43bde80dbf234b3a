//! Default configuration values

use std::time::Duration;

/// Default number of parallel build jobs for the local sandbox backend
pub const DEFAULT_LOCAL_JOBS: usize = 3;

/// Default number of parallel build jobs for the remote farm backend
pub const DEFAULT_FARM_JOBS: usize = 5;

/// Interval between remote task/repository state polls
pub const FARM_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Interval between local build log refreshes
pub const LOG_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on enumerated dependency cycles
pub const MAX_ENUMERATED_CYCLES: usize = 25;

/// Number of shortest cycles reported in detail
pub const MAX_REPORTED_CYCLES: usize = 5;

/// Default external sandbox command
pub const DEFAULT_SANDBOX_COMMAND: &str = "mock";

/// Default repository index command
pub const DEFAULT_INDEX_COMMAND: &[&str] = &["createrepo_c", "--general-compress-type=gz"];

/// Default source-tree packaging command
pub const DEFAULT_PACKAGE_COMMAND: &[&str] = &["fedpkg", "srpm"];

/// File suffix of binary artifacts placed into the local repository
pub const ARTIFACT_SUFFIX: &str = ".rpm";
