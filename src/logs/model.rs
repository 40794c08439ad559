use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::user_info::UserInfo;
use crate::rum::Attributes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    /// Used for crash reports.
    Emergency,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Debug => "debug",
            LogStatus::Info => "info",
            LogStatus::Warn => "warn",
            LogStatus::Error => "error",
            LogStatus::Critical => "critical",
            LogStatus::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggerInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thread_name: Option<String>,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogErrorInfo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack: Option<String>,
}

/// One persisted log entry. RUM identifiers are copied from the view on screen when the entry
/// was created, so logs and RUM events can be correlated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub date: String,
    pub status: LogStatus,
    pub message: String,
    pub service: String,
    pub ddtags: String,
    pub logger: LoggerInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<LogErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usr: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub view_id: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_are_flattened_and_empty_fields_skipped() {
        let mut attributes = Attributes::new();
        attributes.insert("order_id".into(), json!(42));
        let event = LogEvent {
            date: "2026-01-01T00:00:00.000Z".into(),
            status: LogStatus::Emergency,
            message: "crash".into(),
            service: "shop".into(),
            ddtags: "env:prod".into(),
            logger: LoggerInfo {
                name: "crash".into(),
                thread_name: None,
                version: "0.3.0".into(),
            },
            error: None,
            usr: None,
            application_id: None,
            session_id: None,
            view_id: None,
            attributes,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "emergency");
        assert_eq!(value["order_id"], 42);
        assert!(value.get("error").is_none());
        assert!(value.get("view_id").is_none());
        assert!(value["logger"].get("thread_name").is_none());
    }
}
