use crate::core::config::RumConfiguration;
use crate::rum::context::RumContext;
use crate::rum::raw_event::{Attributes, RumRawEvent, ViewKey};
use crate::rum::scope::{RateBasedSampler, RumScope, Sampler, ScopeIo, SessionScope};

#[derive(Clone, Debug)]
struct LastView {
    key: ViewKey,
    name: String,
    attributes: Attributes,
}

/// Root of the tree. Never ends: it samples each new session, replaces the session when it
/// ends, and reopens the last view in the new session when the event that started it was not
/// a view start.
pub struct ApplicationScope {
    context: RumContext,
    sampler: Box<dyn Sampler>,
    session: Option<SessionScope>,
    last_view: Option<LastView>,
}

impl std::fmt::Debug for ApplicationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationScope")
            .field("context", &self.context)
            .field("session", &self.session)
            .finish()
    }
}

impl ApplicationScope {
    pub fn new(application_id: impl Into<String>, sampler: Box<dyn Sampler>) -> Self {
        Self {
            context: RumContext::new(application_id),
            sampler,
            session: None,
            last_view: None,
        }
    }

    pub fn from_config(config: &RumConfiguration) -> Self {
        Self::new(
            config.application_id.clone(),
            Box::new(RateBasedSampler::new(config.sample_rate)),
        )
    }

    pub fn session(&self) -> Option<&SessionScope> {
        self.session.as_ref()
    }

    /// Context of the view on screen, down to the session when no view is active.
    pub fn current_context(&self) -> RumContext {
        match &self.session {
            Some(session) => match session.active_view() {
                Some(view) if session.is_tracked() => view.rum_context(),
                _ => session.rum_context(),
            },
            None => self.context.clone(),
        }
    }

    /// Handles `event` and every follow-up event it causes.
    pub fn process(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.dispatch(event, io);
        while let Some(follow_up) = io.next_follow_up() {
            self.dispatch(&follow_up, io);
        }
    }

    fn remember_view(&mut self, event: &RumRawEvent) {
        match event {
            RumRawEvent::StartView {
                key,
                name,
                attributes,
                ..
            } => {
                self.last_view = Some(LastView {
                    key: key.clone(),
                    name: name.clone(),
                    attributes: attributes.clone(),
                });
            }
            RumRawEvent::StopView { key, .. } => {
                if self.last_view.as_ref().is_some_and(|last| &last.key == key) {
                    self.last_view = None;
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.remember_view(event);
        let mut session = self
            .session
            .take()
            .and_then(|session| session.handle_event(event, io));

        if session.is_none() && event.starts_session() {
            session = Some(self.start_session(event, io));
        }
        self.session = session;
    }

    fn start_session(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> SessionScope {
        let time = event.time();
        let tracked = self.sampler.sample();
        let mut session = SessionScope::new(&self.context, tracked, time, io.config);
        log::debug!(
            "RUM session {} started (tracked: {tracked})",
            session.session_id()
        );

        if !matches!(event, RumRawEvent::StartView { .. }) {
            if let Some(last) = self.last_view.clone() {
                let restart = RumRawEvent::StartView {
                    key: last.key,
                    name: last.name,
                    attributes: last.attributes,
                    time,
                };
                match session.handle_event(&restart, io) {
                    Some(restarted) => session = restarted,
                    None => return SessionScope::new(&self.context, tracked, time, io.config),
                }
            }
        }

        if matches!(event, RumRawEvent::ResetSession { .. }) {
            return session;
        }
        match session.handle_event(event, io) {
            Some(session) => session,
            None => SessionScope::new(&self.context, tracked, time, io.config),
        }
    }
}

impl RumScope for ApplicationScope {
    fn handle_event(mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self> {
        self.process(event, io);
        Some(self)
    }

    fn rum_context(&self) -> RumContext {
        self.context.clone()
    }
}
