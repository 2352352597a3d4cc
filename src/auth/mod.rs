//! Selection between password and key authentication.

use std::fmt;

use crate::config::{AuthParameters, RemoteConfig};
use crate::error::RemoteError;

/// Credential chosen for a single invocation.
#[derive(Clone, Eq, PartialEq)]
pub enum ResolvedAuth {
    /// Authenticate through `sshpass` with this password.
    Password(String),
    /// Authenticate with this private key material.
    Key(String),
}

impl ResolvedAuth {
    /// Returns the secret to write into the credential file.
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::Password(secret) | Self::Key(secret) => secret,
        }
    }

    /// Returns `true` for password authentication.
    #[must_use]
    pub const fn is_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Key(_) => f.write_str("Key(<redacted>)"),
        }
    }
}

/// Resolves the credential for a call.
///
/// A password supplied with the call wins over the stored one, and any
/// password wins over key material. Keys are only ever supplied per call.
///
/// # Errors
///
/// Returns [`RemoteError::InvalidConfiguration`] when the parameters carry
/// both a password and a key, or when no credential is available at all.
pub fn resolve(
    config: &RemoteConfig,
    parameters: &AuthParameters,
) -> Result<ResolvedAuth, RemoteError> {
    if parameters.password.is_some() && parameters.key.is_some() {
        return Err(RemoteError::invalid(
            "only one of password or key can be specified",
        ));
    }

    if let Some(password) = parameters
        .password
        .as_ref()
        .or(config.password.as_ref())
    {
        return Ok(ResolvedAuth::Password(password.clone()));
    }

    parameters
        .key
        .as_ref()
        .map(|key| ResolvedAuth::Key(key.clone()))
        .ok_or_else(|| RemoteError::invalid("one of password or key must be specified"))
}
