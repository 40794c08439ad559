use serde::{Deserialize, Serialize};

/// Identifiers shared by every event emitted under a scope. Children derive theirs from the
/// parent's with the `with_*` methods and never mutate the parent's copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RumContext {
    pub application_id: String,
    pub session_id: Option<String>,
    pub view_id: Option<String>,
    pub view_name: Option<String>,
    pub view_url: Option<String>,
    pub action_id: Option<String>,
}

impl RumContext {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            ..Self::default()
        }
    }

    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            application_id: self.application_id.clone(),
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_view(
        &self,
        view_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            view_id: Some(view_id.into()),
            view_name: Some(name.into()),
            view_url: Some(url.into()),
            action_id: None,
            ..self.clone()
        }
    }

    pub fn with_action(&self, action_id: impl Into<String>) -> Self {
        Self {
            action_id: Some(action_id.into()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_contexts_keep_parent_untouched() {
        let app = RumContext::new("app");
        let session = app.with_session("s-1");
        let view = session.with_view("v-1", "Home", "app/home");
        let action = view.with_action("a-1");

        assert!(app.session_id.is_none());
        assert!(session.view_id.is_none());
        assert!(view.action_id.is_none());
        assert_eq!(action.session_id.as_deref(), Some("s-1"));
        assert_eq!(action.view_url.as_deref(), Some("app/home"));

        let other_view = action.with_view("v-2", "Cart", "app/cart");
        assert!(other_view.action_id.is_none());
    }
}
