//! Build status sent to connected browsers.

use serde::Serialize;

/// Sentinel sent once when a status stream opens.
pub const CONNECTED: &str = "connected";
/// Token telling clients to reload the page.
pub const RELOAD: &str = "reload";
/// Prefix of status messages: `status:{json}`.
pub const STATUS_PREFIX: &str = "status:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Building,
    Success,
    Error,
}

/// The current state of the most recent build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildStatus {
    pub status: Status,
    /// Error text for failed builds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Non-fatal license warning from the Validate stage.
    #[serde(rename = "license_warning", skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl BuildStatus {
    #[must_use]
    pub fn building() -> Self {
        Self {
            status: Status::Building,
            message: None,
            warning: None,
        }
    }

    #[must_use]
    pub fn success(warning: Option<String>) -> Self {
        Self {
            status: Status::Success,
            message: None,
            warning,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>, warning: Option<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            warning,
        }
    }

    /// Encode as a status stream message.
    #[must_use]
    pub fn to_message(&self) -> String {
        // Serializing plain strings and an enum cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{STATUS_PREFIX}{json}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_building_message() {
        assert_eq!(
            BuildStatus::building().to_message(),
            r#"status:{"status":"building"}"#
        );
    }

    #[test]
    fn test_error_message_with_warning() {
        let status = BuildStatus::error("load stage failed", Some("no license".to_owned()));
        assert_eq!(
            status.to_message(),
            r#"status:{"status":"error","message":"load stage failed","license_warning":"no license"}"#
        );
    }
}
