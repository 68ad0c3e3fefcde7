//! Canonical default values for the scanning pipeline.

pub const DEFAULT_CLAMSCAN_PATH: &str = "/opt/clamav/clamscan";
pub const DEFAULT_FRESHCLAM_PATH: &str = "/opt/clamav/freshclam";
pub const DEFAULT_FRESHCLAM_CONFIG_PATH: &str = "/tmp/freshclam.conf";
pub const DEFAULT_DEFINITIONS_DIR: &str = "/tmp/clamav";
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp/bucketguard";
pub const DEFAULT_SCAN_STATUS_TAG_NAME: &str = "scan-status";
pub const DEFAULT_STORE_DIR_NAME: &str = "store";

/// Lines written to a fresh freshclam.conf when no configuration is supplied.
pub const DEFAULT_FRESHCLAM_CONFIG: &[&str] = &[
    "DatabaseMirror database.clamav.net",
    "CompressLocalDatabase yes",
    "ScriptedUpdates no",
];

/// clamscan exit code for "no virus found".
pub const CLEAN_EXIT_CODE: i32 = 0;
/// clamscan exit code for "virus(es) found".
pub const INFECTED_EXIT_CODE: i32 = 1;

/// Page size used by the local store when the caller does not ask for one.
pub const DEFAULT_MAX_KEYS: usize = 1000;
