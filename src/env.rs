//! Environment variable names read when describing the monitored resource.
//!
//! These are read once at startup by [`ResourceEnv::from_env`]; writers only
//! ever see the resulting struct and never touch the process environment.

/// Tenant identifier, reported as the resource `location` label.
pub const TENANT_ID_ENV: &str = "TENANT_ID";

/// Supervisor program group, reported as the resource `job` label.
pub const SUPERVISOR_GROUP_NAME_ENV: &str = "SUPERVISOR_GROUP_NAME";

/// Supervisor process name, reported as the resource `task_id` label.
pub const SUPERVISOR_PROCESS_NAME_ENV: &str = "SUPERVISOR_PROCESS_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Process-level facts that end up in the monitored resource labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceEnv {
    pub tenant_id: String,
    pub supervisor_group_name: String,
    pub supervisor_process_name: String,
    pub host_name: String,
}

impl ResourceEnv {
    /// Snapshot the supervisor variables and the local host name.
    ///
    /// Missing variables become empty strings.
    pub fn from_env() -> Self {
        ResourceEnv {
            tenant_id: env_or(TENANT_ID_ENV, ""),
            supervisor_group_name: env_or(SUPERVISOR_GROUP_NAME_ENV, ""),
            supervisor_process_name: env_or(SUPERVISOR_PROCESS_NAME_ENV, ""),
            host_name: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}
