//! SDK-wide state: configuration, consent, user identity and the [`SdkContext`] that wires the
//! features together.

pub mod config;
mod context;
pub mod consent;
pub mod error;
pub mod feature;
pub mod first_party;
pub mod user_info;

pub static SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[doc(inline)]
pub use config::{Configuration, RumConfiguration};

#[doc(inline)]
pub use consent::{TrackingConsent, TrackingConsentProvider};

#[doc(inline)]
pub use context::{FeaturePipeline, SdkContext};

#[doc(inline)]
pub use error::{SdkError, SdkErrorCode, SdkResult};

#[doc(inline)]
pub use feature::Feature;

#[doc(inline)]
pub use user_info::{UserInfo, UserInfoProvider};
