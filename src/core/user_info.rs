use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserInfo {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.email.is_none() && self.extra.is_empty()
    }
}

/// Holds the current user. Events copy a snapshot when they are emitted.
#[derive(Debug, Default)]
pub struct UserInfoProvider {
    current: RwLock<UserInfo>,
}

impl UserInfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_info(&self) -> UserInfo {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_user_info(&self, info: UserInfo) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Snapshot for event payloads; `None` when no user was ever set.
    pub fn snapshot(&self) -> Option<UserInfo> {
        let info = self.user_info();
        (!info.is_empty()).then_some(info)
    }
}
