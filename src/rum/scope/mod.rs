//! The RUM scope tree.
//!
//! Each node consumes itself to handle an event and hands itself back to stay alive; a parent
//! drops every child that returns `None`. Children are owned by value, so the only shared state
//! is what travels in [`ScopeIo`].

mod action;
mod application;
mod resource;
mod session;
mod view;

use std::collections::VecDeque;

use rand::Rng;

use crate::core::config::RumConfiguration;
use crate::core::first_party::FirstPartyHostDetector;
use crate::core::user_info::UserInfo;
use crate::persistence::DataWriter;
use crate::rum::constants::SESSION_TYPE_USER;
use crate::rum::context::RumContext;
use crate::rum::model::{ApplicationRef, EventCommon, RumEvent, SessionRef, ViewRef};
use crate::rum::raw_event::{Attributes, RumRawEvent};

pub use action::ActionScope;
pub use application::ApplicationScope;
pub use resource::ResourceScope;
pub use session::{SessionScope, SessionState};
pub use view::ViewScope;

pub trait RumScope: Sized {
    /// Handles `event` and returns the scope if it is still alive.
    fn handle_event(self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self>;

    fn rum_context(&self) -> RumContext;
}

/// Everything a scope may read or produce while handling one event.
pub struct ScopeIo<'a> {
    pub writer: &'a dyn DataWriter<RumEvent>,
    pub config: &'a RumConfiguration,
    pub user_info: Option<UserInfo>,
    pub global_attributes: &'a Attributes,
    pub first_party: &'a FirstPartyHostDetector,
    outbox: VecDeque<RumRawEvent>,
}

impl<'a> ScopeIo<'a> {
    pub fn new(
        writer: &'a dyn DataWriter<RumEvent>,
        config: &'a RumConfiguration,
        user_info: Option<UserInfo>,
        global_attributes: &'a Attributes,
        first_party: &'a FirstPartyHostDetector,
    ) -> Self {
        Self {
            writer,
            config,
            user_info,
            global_attributes,
            first_party,
            outbox: VecDeque::new(),
        }
    }

    /// Queues a follow-up event, handled by the tree once the current event is done.
    pub fn emit(&mut self, event: RumRawEvent) {
        self.outbox.push_back(event);
    }

    pub(crate) fn next_follow_up(&mut self) -> Option<RumRawEvent> {
        self.outbox.pop_front()
    }

    pub(crate) fn follow_up_mark(&self) -> usize {
        self.outbox.len()
    }

    /// Removes the follow-ups queued after `mark`, in order.
    pub(crate) fn take_follow_ups_since(&mut self, mark: usize) -> VecDeque<RumRawEvent> {
        self.outbox.split_off(mark.min(self.outbox.len()))
    }

    pub(crate) fn common(
        &self,
        context: &RumContext,
        date: i64,
        attributes: &Attributes,
    ) -> EventCommon {
        let mut merged = self.global_attributes.clone();
        merged.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        EventCommon {
            date,
            application: ApplicationRef {
                id: context.application_id.clone(),
            },
            session: SessionRef {
                id: context.session_id.clone().unwrap_or_default(),
                session_type: SESSION_TYPE_USER.to_string(),
            },
            usr: self.user_info.clone(),
            context: merged,
        }
    }
}

pub(crate) fn view_ref(context: &RumContext) -> ViewRef {
    ViewRef {
        id: context.view_id.clone().unwrap_or_default(),
        name: context.view_name.clone().unwrap_or_default(),
        url: context.view_url.clone().unwrap_or_default(),
    }
}

/// Session sampling decision, taken once per new session.
pub trait Sampler: Send {
    fn sample(&mut self) -> bool;
}

impl<F> Sampler for F
where
    F: FnMut() -> bool + Send,
{
    fn sample(&mut self) -> bool {
        self()
    }
}

/// Keeps `rate` percent of the sessions.
#[derive(Clone, Copy, Debug)]
pub struct RateBasedSampler {
    rate: f32,
}

impl RateBasedSampler {
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 100.0),
        }
    }
}

impl Sampler for RateBasedSampler {
    fn sample(&mut self) -> bool {
        if self.rate >= 100.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.rate
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::platform::time::Time;
    use crate::test_support::RecordingWriter;
    use serde_json::Value;

    pub struct Harness {
        pub writer: RecordingWriter<RumEvent>,
        pub config: RumConfiguration,
        pub attributes: Attributes,
        pub first_party: FirstPartyHostDetector,
    }

    impl Harness {
        pub fn new(config: RumConfiguration) -> Self {
            Self {
                writer: RecordingWriter::default(),
                config,
                attributes: Attributes::new(),
                first_party: FirstPartyHostDetector::new(["example.com"]),
            }
        }

        pub fn io(&self) -> ScopeIo<'_> {
            ScopeIo::new(
                &self.writer,
                &self.config,
                None,
                &self.attributes,
                &self.first_party,
            )
        }

        pub fn written(&self) -> Vec<RumEvent> {
            self.writer.written()
        }

        pub fn written_of(&self, kind: &str) -> Vec<Value> {
            self.written()
                .iter()
                .map(|event| serde_json::to_value(event).unwrap())
                .filter(|value| value["type"] == kind)
                .collect()
        }
    }

    pub fn at(ms: u64) -> Time {
        Time::new(1_700_000_000_000 + ms as i64, 1_000_000_000 + ms * 1_000_000)
    }

    pub fn drain(io: &mut ScopeIo<'_>) -> Vec<RumRawEvent> {
        std::iter::from_fn(|| io.next_follow_up()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_sampler_honours_bounds() {
        let mut never = RateBasedSampler::new(0.0);
        let mut always = RateBasedSampler::new(100.0);
        for _ in 0..100 {
            assert!(!never.sample());
            assert!(always.sample());
        }
    }

    #[test]
    fn closures_are_samplers() {
        let mut flips = [true, false].into_iter().cycle();
        let mut sampler = move || flips.next().unwrap_or(true);
        assert!(Sampler::sample(&mut sampler));
        assert!(!Sampler::sample(&mut sampler));
    }
}
