//! Events written by the scope tree, in their serialized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::user_info::UserInfo;
use crate::rum::raw_event::{
    Attributes, RumActionType, RumErrorSource, RumResourceKind, RumResourceMethod,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RumEvent {
    View(ViewEvent),
    Action(ActionEvent),
    Resource(ResourceEvent),
    Error(ErrorEvent),
    LongTask(LongTaskEvent),
}

impl RumEvent {
    pub fn common(&self) -> &EventCommon {
        match self {
            RumEvent::View(event) => &event.common,
            RumEvent::Action(event) => &event.common,
            RumEvent::Resource(event) => &event.common,
            RumEvent::Error(event) => &event.common,
            RumEvent::LongTask(event) => &event.common,
        }
    }

    pub fn view_id(&self) -> &str {
        match self {
            RumEvent::View(event) => &event.view.id,
            RumEvent::Action(event) => &event.view.id,
            RumEvent::Resource(event) => &event.view.id,
            RumEvent::Error(event) => &event.view.id,
            RumEvent::LongTask(event) => &event.view.id,
        }
    }
}

/// Fields shared by every event kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventCommon {
    /// Wall-clock start of the event, in milliseconds since the epoch.
    pub date: i64,
    pub application: ApplicationRef,
    pub session: SessionRef,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usr: Option<UserInfo>,
    #[serde(skip_serializing_if = "Attributes::is_empty", default)]
    pub context: Attributes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub count: u64,
}

impl From<u64> for Count {
    fn from(count: u64) -> Self {
        Self { count }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub view: ViewDetails,
    #[serde(rename = "_dd")]
    pub meta: DocumentMeta,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewDetails {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Nanoseconds between the view start and its stop, or the latest update while active.
    pub time_spent: u64,
    pub is_active: bool,
    pub action: Count,
    pub resource: Count,
    pub error: Count,
    pub crash: Count,
    pub long_task: Count,
    pub frozen_frame: Count,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub custom_timings: BTreeMap<String, u64>,
}

/// Lets the intake keep only the latest snapshot of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub document_version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub view: ViewRef,
    pub action: ActionDetails,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDetails {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: RumActionType,
    pub target: ActionTarget,
    /// Nanoseconds, at least 1.
    pub loading_time: u64,
    pub resource: Count,
    pub error: Count,
    pub crash: Count,
    pub long_task: Count,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<ActionRef>,
    pub resource: ResourceDetails,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDetails {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RumResourceKind,
    pub url: String,
    pub method: RumResourceMethod,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u64>,
    /// Nanoseconds, at least 1.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dns: Option<TimingSpan>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connect: Option<TimingSpan>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssl: Option<TimingSpan>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_byte: Option<TimingSpan>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub download: Option<TimingSpan>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<ResourceProvider>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSpan {
    pub start: u64,
    pub duration: u64,
}

impl TimingSpan {
    /// `None` for phases that did not happen.
    pub fn from_parts(start: u64, duration: u64) -> Option<Self> {
        (duration > 0).then_some(Self { start, duration })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub domain: String,
    #[serde(rename = "type")]
    pub provider_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<ActionRef>,
    pub error: ErrorDetails,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub id: String,
    pub message: String,
    pub source: RumErrorSource,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack: Option<String>,
    pub is_crash: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resource: Option<ErrorResource>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResource {
    pub url: String,
    pub method: RumResourceMethod,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<ResourceProvider>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongTaskEvent {
    #[serde(flatten)]
    pub common: EventCommon,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<ActionRef>,
    pub long_task: LongTaskDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTaskDetails {
    pub id: String,
    pub duration: u64,
    pub is_frozen_frame: bool,
    pub target: String,
}
