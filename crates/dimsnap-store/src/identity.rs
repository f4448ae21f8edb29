use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Environment variable read by [`EnvIdentity`].
pub const USER_ENV_VAR: &str = "DIMSNAP_USER";

/// Opaque, non-empty user identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StoreError::EmptyUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answers "who is calling?". `None` means anonymous.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Fixed identity, e.g. from a CLI flag.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn user(user: UserId) -> Self {
        Self(Some(user))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// Identity taken from an environment variable at call time.
#[derive(Clone, Debug)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvIdentity {
    fn default() -> Self {
        Self::new(USER_ENV_VAR)
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_user(&self) -> Option<UserId> {
        std::env::var(&self.var)
            .ok()
            .and_then(|v| UserId::new(v).ok())
    }
}
