//! Client-side observability SDK.
//!
//! Collects real user monitoring events, logs, spans and crash reports, persists them in
//! consent-aware batch files and uploads them in the background. Start with
//! [`core::SdkContext::initialize`].

pub mod core;
pub mod crash;
pub mod logger;
pub mod logs;
pub mod persistence;
pub mod platform;
pub mod rum;
pub mod upload;
pub mod util;

#[cfg(test)]
pub mod test_support;
