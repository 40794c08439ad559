use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::core::error::{invalid_configuration, SdkError};

/// Whether the end user agreed to have telemetry collected.
///
/// `Pending` data is kept on disk but never uploaded until the consent is granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TrackingConsent {
    Pending = 0,
    Granted = 1,
    NotGranted = 2,
}

impl TrackingConsent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingConsent::Pending => "pending",
            TrackingConsent::Granted => "granted",
            TrackingConsent::NotGranted => "not_granted",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TrackingConsent::Granted,
            2 => TrackingConsent::NotGranted,
            _ => TrackingConsent::Pending,
        }
    }
}

impl fmt::Display for TrackingConsent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingConsent {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TrackingConsent::Pending),
            "granted" => Ok(TrackingConsent::Granted),
            "not_granted" | "not-granted" => Ok(TrackingConsent::NotGranted),
            other => Err(invalid_configuration(format!(
                "Unknown tracking consent \"{other}\""
            ))),
        }
    }
}

/// Process-wide consent state. Read from any thread; written only through [`set_consent`].
///
/// [`set_consent`]: TrackingConsentProvider::set_consent
#[derive(Debug)]
pub struct TrackingConsentProvider {
    state: AtomicU8,
}

impl TrackingConsentProvider {
    pub fn new(initial: TrackingConsent) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub fn consent(&self) -> TrackingConsent {
        TrackingConsent::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Stores `consent` and returns the previous value.
    pub fn set_consent(&self, consent: TrackingConsent) -> TrackingConsent {
        TrackingConsent::from_u8(self.state.swap(consent as u8, Ordering::SeqCst))
    }
}

impl Default for TrackingConsentProvider {
    fn default() -> Self {
        Self::new(TrackingConsent::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_consent_returns_previous_value() {
        let provider = TrackingConsentProvider::default();
        assert_eq!(provider.consent(), TrackingConsent::Pending);
        assert_eq!(
            provider.set_consent(TrackingConsent::Granted),
            TrackingConsent::Pending
        );
        assert_eq!(provider.consent(), TrackingConsent::Granted);
    }

    #[test]
    fn parses_consent_names() {
        assert_eq!(
            "NOT_GRANTED".parse::<TrackingConsent>().unwrap(),
            TrackingConsent::NotGranted
        );
        assert!("maybe".parse::<TrackingConsent>().is_err());
    }
}
