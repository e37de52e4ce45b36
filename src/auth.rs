use std::fmt;

use crate::error::SdcError;

pub const USERNAME_ENV: &str = "MMS_SDC_USERNAME";
pub const PASSWORD_ENV: &str = "MMS_SDC_PASSWORD";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies SDC team-site credentials when a request comes back 401.
///
/// `attempt` starts at 1. Returning `Ok(None)` gives up immediately.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self, attempt: usize) -> Result<Option<Credentials>, SdcError>;
}

/// Reads `MMS_SDC_USERNAME` / `MMS_SDC_PASSWORD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self, _attempt: usize) -> Result<Option<Credentials>, SdcError> {
        let username = std::env::var(USERNAME_ENV).ok();
        let password = std::env::var(PASSWORD_ENV).ok();
        match (username, password) {
            (Some(username), Some(password)) if !username.trim().is_empty() => {
                Ok(Some(Credentials::new(username.trim(), password)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self, _attempt: usize) -> Result<Option<Credentials>, SdcError> {
        Ok(Some(self.0.clone()))
    }
}

/// For public-site only use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn credentials(&self, _attempt: usize) -> Result<Option<Credentials>, SdcError> {
        Ok(None)
    }
}
