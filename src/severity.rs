use serde::{Serialize, Serializer};
use std::fmt;

/// Severity names understood by Cloud Logging.
///
/// Only the façade names that differ from Cloud Logging's vocabulary are
/// translated; everything else is passed through verbatim as
/// [`Severity::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Emergency,
    Critical,
    Error,
    Warning,
    Other(String),
}

impl Severity {
    pub fn from_priority_name(name: &str) -> Self {
        match name {
            "EMERG" => Severity::Emergency,
            "CRIT" => Severity::Critical,
            "ERR" => Severity::Error,
            "WARN" => Severity::Warning,
            other => Severity::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Other(name) => name,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_facade_names_to_cloud_logging_names() {
        let cases = [
            ("EMERG", "EMERGENCY"),
            ("CRIT", "CRITICAL"),
            ("ERR", "ERROR"),
            ("WARN", "WARNING"),
        ];
        for (input, expected) in cases {
            assert_eq!(Severity::from_priority_name(input).as_str(), expected);
        }
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(Severity::from_priority_name("INFO"), Severity::Other("INFO".into()));
        assert_eq!(Severity::from_priority_name("ALERT").to_string(), "ALERT");
        assert_eq!(Severity::from_priority_name("custom").as_str(), "custom");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }
}
