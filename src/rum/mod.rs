//! Real user monitoring.
//!
//! Public calls on [`RumMonitor`] become [`RumRawEvent`]s processed by a tree of scopes
//! (application, session, view, action, resource). Each scope aggregates what happens while it
//! is alive and writes [`RumEvent`]s through the RUM feature writer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rum_rs_sdk::core::{Configuration, SdkContext, TrackingConsent};
//! use rum_rs_sdk::core::config::RumConfiguration;
//! use rum_rs_sdk::rum::{Attributes, RumActionType};
//!
//! let config = Configuration::new("pub-client-token", "prod")
//!     .with_rum(RumConfiguration::new("my-application-id"));
//! let sdk = Arc::new(SdkContext::initialize(config, TrackingConsent::Granted).unwrap());
//! if let Some(monitor) = sdk.rum_monitor() {
//!     monitor.start_view("checkout", "Checkout", Attributes::new());
//!     monitor.add_action(RumActionType::Tap, "pay", Attributes::new());
//! }
//! ```

pub mod constants;
mod context;
mod model;
mod monitor;
mod raw_event;
pub mod scope;

#[doc(inline)]
pub use context::RumContext;

#[doc(inline)]
pub use model::{
    ActionDetails, ActionEvent, ActionRef, ActionTarget, ApplicationRef, Count, DocumentMeta,
    ErrorDetails, ErrorEvent, ErrorResource, EventCommon, LongTaskDetails, LongTaskEvent,
    ResourceDetails, ResourceEvent, ResourceProvider, RumEvent, SessionRef, TimingSpan,
    ViewDetails, ViewEvent, ViewRef,
};

#[doc(inline)]
pub use monitor::RumMonitor;

#[doc(inline)]
pub use raw_event::{
    Attributes, ResourceKey, ResourceTiming, RumActionType, RumErrorSource, RumRawEvent,
    RumResourceKind, RumResourceMethod, ViewKey,
};
