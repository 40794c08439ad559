use url::Url;

use crate::platform::time::Time;
use crate::rum::constants::FIRST_PARTY_PROVIDER;
use crate::rum::context::RumContext;
use crate::rum::model::{
    ActionRef, ErrorDetails, ErrorEvent, ErrorResource, ResourceDetails, ResourceEvent,
    ResourceProvider, RumEvent, TimingSpan,
};
use crate::rum::raw_event::{
    Attributes, ResourceKey, ResourceTiming, RumErrorSource, RumRawEvent, RumResourceKind,
    RumResourceMethod,
};
use crate::rum::scope::{view_ref, RumScope, ScopeIo};

/// One resource load, alive between its start and its stop.
#[derive(Debug)]
pub struct ResourceScope {
    context: RumContext,
    key: ResourceKey,
    resource_id: String,
    url: String,
    method: RumResourceMethod,
    attributes: Attributes,
    start: Time,
    timing: Option<ResourceTiming>,
}

impl ResourceScope {
    pub fn new(
        parent: &RumContext,
        key: ResourceKey,
        url: impl Into<String>,
        method: RumResourceMethod,
        attributes: Attributes,
        start: Time,
    ) -> Self {
        Self {
            context: parent.clone(),
            key,
            resource_id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            method,
            attributes,
            start,
            timing: None,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn provider(&self, io: &ScopeIo<'_>) -> Option<ResourceProvider> {
        if !io.first_party.is_first_party(&self.url) {
            return None;
        }
        let domain = Url::parse(&self.url).ok()?.host_str()?.to_string();
        Some(ResourceProvider {
            domain,
            provider_type: FIRST_PARTY_PROVIDER.to_string(),
        })
    }

    fn action_ref(&self) -> Option<ActionRef> {
        self.context
            .action_id
            .clone()
            .map(|id| ActionRef { id })
    }

    fn merged_attributes(&self, extra: &Attributes) -> Attributes {
        let mut merged = self.attributes.clone();
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn send_resource(
        &self,
        status_code: Option<u16>,
        size: Option<u64>,
        kind: RumResourceKind,
        attributes: &Attributes,
        time: Time,
        io: &mut ScopeIo<'_>,
    ) {
        let timing = self.timing.unwrap_or_default();
        let event = ResourceEvent {
            common: io.common(
                &self.context,
                self.start.timestamp_ms,
                &self.merged_attributes(attributes),
            ),
            view: view_ref(&self.context),
            action: self.action_ref(),
            resource: ResourceDetails {
                id: self.resource_id.clone(),
                kind,
                url: self.url.clone(),
                method: self.method,
                status_code,
                size,
                duration: time.nanos_since(&self.start).max(1),
                dns: TimingSpan::from_parts(timing.dns_start, timing.dns_duration),
                connect: TimingSpan::from_parts(timing.connect_start, timing.connect_duration),
                ssl: TimingSpan::from_parts(timing.ssl_start, timing.ssl_duration),
                first_byte: TimingSpan::from_parts(
                    timing.first_byte_start,
                    timing.first_byte_duration,
                ),
                download: TimingSpan::from_parts(timing.download_start, timing.download_duration),
                provider: self.provider(io),
            },
        };
        io.writer.write(RumEvent::Resource(event));
        io.emit(RumRawEvent::ResourceSent {
            view_id: self.context.view_id.clone().unwrap_or_default(),
            time,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn send_error(
        &self,
        status_code: Option<u16>,
        message: &str,
        source: RumErrorSource,
        stack: Option<&str>,
        attributes: &Attributes,
        time: Time,
        io: &mut ScopeIo<'_>,
    ) {
        let event = ErrorEvent {
            common: io.common(
                &self.context,
                time.timestamp_ms,
                &self.merged_attributes(attributes),
            ),
            view: view_ref(&self.context),
            action: self.action_ref(),
            error: ErrorDetails {
                id: uuid::Uuid::new_v4().to_string(),
                message: message.to_string(),
                source,
                stack: stack.map(str::to_string),
                is_crash: false,
                resource: Some(ErrorResource {
                    url: self.url.clone(),
                    method: self.method,
                    status_code,
                    provider: self.provider(io),
                }),
            },
        };
        io.writer.write(RumEvent::Error(event));
        io.emit(RumRawEvent::ErrorSent {
            view_id: self.context.view_id.clone().unwrap_or_default(),
            time,
        });
    }
}

impl RumScope for ResourceScope {
    fn handle_event(mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self> {
        if event.resource_key() != Some(&self.key) {
            return Some(self);
        }
        match event {
            RumRawEvent::AddResourceTiming { timing, .. } => {
                self.timing = Some(*timing);
                Some(self)
            }
            RumRawEvent::StopResource {
                status_code,
                size,
                kind,
                attributes,
                time,
                ..
            } => {
                self.send_resource(*status_code, *size, *kind, attributes, *time, io);
                None
            }
            RumRawEvent::StopResourceWithError {
                status_code,
                message,
                source,
                stack,
                attributes,
                time,
                ..
            } => {
                self.send_error(
                    *status_code,
                    message,
                    *source,
                    stack.as_deref(),
                    attributes,
                    *time,
                    io,
                );
                None
            }
            _ => Some(self),
        }
    }

    fn rum_context(&self) -> RumContext {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RumConfiguration;
    use crate::rum::scope::testing::{at, drain, Harness};
    use serde_json::json;

    fn scope(url: &str) -> ResourceScope {
        let context = RumContext::new("app")
            .with_session("s-1")
            .with_view("v-1", "Home", "home")
            .with_action("a-1");
        ResourceScope::new(
            &context,
            "r-1".into(),
            url,
            RumResourceMethod::Get,
            Attributes::new(),
            at(0),
        )
    }

    fn stop(key: &str, ms: u64) -> RumRawEvent {
        RumRawEvent::StopResource {
            key: key.into(),
            status_code: Some(200),
            size: Some(512),
            kind: RumResourceKind::Image,
            attributes: Attributes::new(),
            time: at(ms),
        }
    }

    #[test]
    fn stop_writes_resource_with_timing_and_provider() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let resource = scope("https://cdn.example.com/logo.png");

        let resource = resource.handle_event(&stop("other", 10), &mut io).unwrap();
        let timing = RumRawEvent::AddResourceTiming {
            key: "r-1".into(),
            timing: ResourceTiming {
                dns_start: 1,
                dns_duration: 2,
                download_start: 5,
                download_duration: 7,
                ..ResourceTiming::default()
            },
            time: at(20),
        };
        let resource = resource.handle_event(&timing, &mut io).unwrap();
        assert!(resource.handle_event(&stop("r-1", 80), &mut io).is_none());

        let written = h.written_of("resource");
        assert_eq!(written.len(), 1);
        let details = &written[0]["resource"];
        assert_eq!(details["type"], "image");
        assert_eq!(details["duration"], 80_000_000u64);
        assert_eq!(details["dns"], json!({"start": 1, "duration": 2}));
        assert!(details.get("ssl").is_none());
        assert_eq!(details["provider"]["domain"], "cdn.example.com");
        assert_eq!(written[0]["action"]["id"], "a-1");
        assert!(matches!(
            drain(&mut io).as_slice(),
            [RumRawEvent::ResourceSent { .. }]
        ));
    }

    #[test]
    fn stop_with_error_writes_error_instead() {
        let h = Harness::new(RumConfiguration::new("app"));
        let mut io = h.io();
        let resource = scope("https://third-party.io/api");

        let failure = RumRawEvent::StopResourceWithError {
            key: "r-1".into(),
            status_code: None,
            message: "connection reset".into(),
            source: RumErrorSource::Network,
            stack: None,
            attributes: Attributes::new(),
            time: at(30),
        };
        assert!(resource.handle_event(&failure, &mut io).is_none());

        assert!(h.written_of("resource").is_empty());
        let errors = h.written_of("error");
        assert_eq!(errors[0]["error"]["source"], "network");
        assert_eq!(errors[0]["error"]["resource"]["url"], "https://third-party.io/api");
        assert!(errors[0]["error"]["resource"].get("provider").is_none());
        assert!(matches!(
            drain(&mut io).as_slice(),
            [RumRawEvent::ErrorSent { .. }]
        ));
    }
}
