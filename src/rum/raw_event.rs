use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::platform::time::Time;

/// Free-form attributes attached to events and to the global RUM context.
pub type Attributes = Map<String, Value>;

/// Identity of a view, chosen by the caller (typically the screen's name or address).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewKey(String);

impl ViewKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ViewKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ViewKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token correlating the start and the stop of one resource load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RumActionType {
    Tap,
    Scroll,
    Swipe,
    Click,
    Back,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RumErrorSource {
    Network,
    Source,
    Console,
    Logger,
    Agent,
    Webview,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RumResourceKind {
    Xhr,
    Fetch,
    Image,
    Js,
    Font,
    Css,
    Media,
    Native,
    Document,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RumResourceMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

/// Network phases of a resource, as offsets from the resource start. All values in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceTiming {
    pub dns_start: u64,
    pub dns_duration: u64,
    pub connect_start: u64,
    pub connect_duration: u64,
    pub ssl_start: u64,
    pub ssl_duration: u64,
    pub first_byte_start: u64,
    pub first_byte_duration: u64,
    pub download_start: u64,
    pub download_duration: u64,
}

/// The vocabulary of the scope tree. Public calls on the monitor become one of these; the
/// `*Sent` and `*Dropped` variants are produced by the tree itself so a view can keep its
/// counters in step with what was actually written.
#[derive(Clone, Debug, PartialEq)]
pub enum RumRawEvent {
    StartView {
        key: ViewKey,
        name: String,
        attributes: Attributes,
        time: Time,
    },
    StopView {
        key: ViewKey,
        attributes: Attributes,
        time: Time,
    },
    StartAction {
        action_type: RumActionType,
        name: String,
        wait_for_stop: bool,
        attributes: Attributes,
        time: Time,
    },
    StopAction {
        action_type: Option<RumActionType>,
        name: Option<String>,
        attributes: Attributes,
        time: Time,
    },
    StartResource {
        key: ResourceKey,
        url: String,
        method: RumResourceMethod,
        attributes: Attributes,
        time: Time,
    },
    AddResourceTiming {
        key: ResourceKey,
        timing: ResourceTiming,
        time: Time,
    },
    StopResource {
        key: ResourceKey,
        status_code: Option<u16>,
        size: Option<u64>,
        kind: RumResourceKind,
        attributes: Attributes,
        time: Time,
    },
    StopResourceWithError {
        key: ResourceKey,
        status_code: Option<u16>,
        message: String,
        source: RumErrorSource,
        stack: Option<String>,
        attributes: Attributes,
        time: Time,
    },
    AddError {
        message: String,
        source: RumErrorSource,
        stack: Option<String>,
        is_fatal: bool,
        attributes: Attributes,
        time: Time,
    },
    AddLongTask {
        duration_nanos: u64,
        target: String,
        time: Time,
    },
    AddCustomTiming {
        name: String,
        time: Time,
    },
    ViewTreeChanged {
        time: Time,
    },
    ResetSession {
        time: Time,
    },
    KeepAlive {
        time: Time,
    },
    SendCustomActionNow {
        time: Time,
    },
    ActionSent {
        view_id: String,
        time: Time,
    },
    ActionDropped {
        view_id: String,
        time: Time,
    },
    ResourceSent {
        view_id: String,
        time: Time,
    },
    ResourceDropped {
        view_id: String,
        time: Time,
    },
    ErrorSent {
        view_id: String,
        time: Time,
    },
    ErrorDropped {
        view_id: String,
        time: Time,
    },
    LongTaskSent {
        view_id: String,
        time: Time,
    },
    LongTaskDropped {
        view_id: String,
        time: Time,
    },
}

impl RumRawEvent {
    pub fn time(&self) -> Time {
        match self {
            RumRawEvent::StartView { time, .. }
            | RumRawEvent::StopView { time, .. }
            | RumRawEvent::StartAction { time, .. }
            | RumRawEvent::StopAction { time, .. }
            | RumRawEvent::StartResource { time, .. }
            | RumRawEvent::AddResourceTiming { time, .. }
            | RumRawEvent::StopResource { time, .. }
            | RumRawEvent::StopResourceWithError { time, .. }
            | RumRawEvent::AddError { time, .. }
            | RumRawEvent::AddLongTask { time, .. }
            | RumRawEvent::AddCustomTiming { time, .. }
            | RumRawEvent::ViewTreeChanged { time }
            | RumRawEvent::ResetSession { time }
            | RumRawEvent::KeepAlive { time }
            | RumRawEvent::SendCustomActionNow { time }
            | RumRawEvent::ActionSent { time, .. }
            | RumRawEvent::ActionDropped { time, .. }
            | RumRawEvent::ResourceSent { time, .. }
            | RumRawEvent::ResourceDropped { time, .. }
            | RumRawEvent::ErrorSent { time, .. }
            | RumRawEvent::ErrorDropped { time, .. }
            | RumRawEvent::LongTaskSent { time, .. }
            | RumRawEvent::LongTaskDropped { time, .. } => *time,
        }
    }

    /// Resource the event refers to, if any.
    pub fn resource_key(&self) -> Option<&ResourceKey> {
        match self {
            RumRawEvent::StartResource { key, .. }
            | RumRawEvent::AddResourceTiming { key, .. }
            | RumRawEvent::StopResource { key, .. }
            | RumRawEvent::StopResourceWithError { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Bookkeeping produced by the tree in reaction to a write.
    pub fn is_follow_up(&self) -> bool {
        matches!(
            self,
            RumRawEvent::ActionSent { .. }
                | RumRawEvent::ActionDropped { .. }
                | RumRawEvent::ResourceSent { .. }
                | RumRawEvent::ResourceDropped { .. }
                | RumRawEvent::ErrorSent { .. }
                | RumRawEvent::ErrorDropped { .. }
                | RumRawEvent::LongTaskSent { .. }
                | RumRawEvent::LongTaskDropped { .. }
                | RumRawEvent::SendCustomActionNow { .. }
        )
    }

    /// Whether the event may open a new session when none is active.
    pub fn starts_session(&self) -> bool {
        !self.is_follow_up() && !matches!(self, RumRawEvent::KeepAlive { .. })
    }

    /// Events that count as the user interacting with the application.
    pub fn is_user_interaction(&self) -> bool {
        matches!(
            self,
            RumRawEvent::StartView { .. } | RumRawEvent::StartAction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_session_relevance() {
        let time = Time::new(0, 0);
        assert!(RumRawEvent::ResetSession { time }.starts_session());
        assert!(!RumRawEvent::KeepAlive { time }.starts_session());
        assert!(!RumRawEvent::ActionSent {
            view_id: "v".into(),
            time
        }
        .starts_session());
        assert!(RumRawEvent::StartAction {
            action_type: RumActionType::Tap,
            name: "tap".into(),
            wait_for_stop: false,
            attributes: Attributes::new(),
            time,
        }
        .is_user_interaction());
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(
            serde_json::to_value(RumActionType::Custom).unwrap(),
            serde_json::json!("custom")
        );
        assert_eq!(
            serde_json::to_value(RumResourceMethod::Post).unwrap(),
            serde_json::json!("POST")
        );
        assert_eq!(
            serde_json::to_value(RumErrorSource::Network).unwrap(),
            serde_json::json!("network")
        );
    }
}
