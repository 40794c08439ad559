use crate::core::config::RumConfiguration;
use crate::platform::time::{duration_nanos, Time};
use crate::rum::context::RumContext;
use crate::rum::raw_event::RumRawEvent;
use crate::rum::scope::{RumScope, ScopeIo, ViewScope};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Sampled in: events are forwarded to views and written.
    Tracked,
    /// Sampled out: events are ignored but expiry still applies.
    NotTracked,
}

/// One session. Ends after `session_inactivity` without a user interaction or once it is
/// older than `session_max_duration`, closing every view it still holds.
#[derive(Debug)]
pub struct SessionScope {
    context: RumContext,
    state: SessionState,
    start_nanos: u64,
    last_interaction_nanos: u64,
    inactivity_nanos: u64,
    max_duration_nanos: u64,
    views: Vec<ViewScope>,
}

impl SessionScope {
    pub fn new(parent: &RumContext, tracked: bool, start: Time, config: &RumConfiguration) -> Self {
        Self {
            context: parent.with_session(uuid::Uuid::new_v4().to_string()),
            state: if tracked {
                SessionState::Tracked
            } else {
                SessionState::NotTracked
            },
            start_nanos: start.nanos,
            last_interaction_nanos: start.nanos,
            inactivity_nanos: duration_nanos(config.session_inactivity),
            max_duration_nanos: duration_nanos(config.session_max_duration),
            views: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id.as_deref().unwrap_or_default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracked(&self) -> bool {
        self.state == SessionState::Tracked
    }

    /// The view currently on screen, if any.
    pub fn active_view(&self) -> Option<&ViewScope> {
        self.views.iter().rev().find(|view| !view.is_stopped())
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    fn is_expired(&self, now: u64) -> bool {
        let inactive = now.saturating_sub(self.last_interaction_nanos) >= self.inactivity_nanos;
        let too_old = now.saturating_sub(self.start_nanos) >= self.max_duration_nanos;
        inactive || too_old
    }

    fn close(self, time: Time, io: &mut ScopeIo<'_>) {
        log::debug!("RUM session {} ended", self.session_id());
        for view in self.views {
            view.force_close(time, io);
        }
    }

    fn forward_to_views(&mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) {
        self.views = std::mem::take(&mut self.views)
            .into_iter()
            .filter_map(|view| view.handle_event(event, io))
            .collect();
    }
}

impl RumScope for SessionScope {
    fn handle_event(mut self, event: &RumRawEvent, io: &mut ScopeIo<'_>) -> Option<Self> {
        let time = event.time();
        if !event.is_follow_up() {
            if self.is_expired(time.nanos) || matches!(event, RumRawEvent::ResetSession { .. }) {
                self.close(time, io);
                return None;
            }
            if event.is_user_interaction() {
                self.last_interaction_nanos = time.nanos;
            }
        }

        if self.state == SessionState::NotTracked {
            return Some(self);
        }

        self.forward_to_views(event, io);
        if let RumRawEvent::StartView {
            key,
            name,
            attributes,
            ..
        } = event
        {
            let view = ViewScope::start(
                &self.context,
                key.clone(),
                name.clone(),
                attributes.clone(),
                time,
                io,
            );
            self.views.push(view);
        }
        Some(self)
    }

    fn rum_context(&self) -> RumContext {
        self.context.clone()
    }
}
