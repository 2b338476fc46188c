use crate::env::ResourceEnv;
use serde::Serialize;
use std::collections::BTreeMap;

/// Label mapping attached to every entry written while it is set.
pub type Labels = BTreeMap<String, String>;

/// Resource type reported for every entry.
pub const GENERIC_TASK: &str = "generic_task";

/// Version reported by [`MetadataProvider::version_id`].
pub const VERSION_ID: &str = "1.0";

/// Monitored resource descriptor, see
/// <https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource>.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: BTreeMap<String, String>,
}

/// Identity and resource information the remote client queries when it
/// builds entries. Implemented by the Stackdriver writer.
pub trait MetadataProvider: Send + Sync {
    fn monitored_resource(&self) -> MonitoredResource;

    fn project_id(&self) -> String;

    fn service_id(&self) -> String;

    fn version_id(&self) -> String {
        VERSION_ID.to_string()
    }

    fn labels(&self) -> Labels;
}

/// Build the `generic_task` descriptor for a project from a startup
/// snapshot of the environment.
pub fn generic_task(project_id: &str, env: &ResourceEnv) -> MonitoredResource {
    let labels = [
        ("project_id", project_id),
        ("location", env.tenant_id.as_str()),
        ("namespace", env.host_name.as_str()),
        ("job", env.supervisor_group_name.as_str()),
        ("task_id", env.supervisor_process_name.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    MonitoredResource {
        kind: GENERIC_TASK.to_string(),
        labels,
    }
}
