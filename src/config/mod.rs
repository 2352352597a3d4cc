//! Validation of remote connection descriptors and per-call parameters.
//!
//! Both inputs arrive as loosely typed JSON mappings from the host
//! application. Validation rejects unknown keys, coerces values to their
//! string form, and produces strongly typed [`RemoteConfig`] and
//! [`AuthParameters`] values for the rest of the crate.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::error::RemoteError;

/// Raw, untyped mapping as handed over by the host application.
pub type RawMap = Map<String, Value>;

const REQUIRED_REMOTE_KEYS: [&str; 3] = ["username", "address", "path"];
const OPTIONAL_REMOTE_KEYS: [&str; 3] = ["password", "port", "keyFile"];
const PARAMETER_KEYS: [&str; 2] = ["password", "key"];

const REDACTED: &str = "<redacted>";

/// Validated connection descriptor for an SSH remote.
#[derive(Clone, Eq, PartialEq)]
pub struct RemoteConfig {
    /// Remote user to connect as.
    pub username: String,
    /// Host name or address of the remote.
    pub address: String,
    /// Base directory holding one subdirectory per commit.
    pub path: String,
    /// Stored password, if any.
    pub password: Option<String>,
    /// SSH port override.
    pub port: Option<u16>,
    /// Path to a private key on the local machine. The key is loaded by the
    /// caller and passed as [`AuthParameters::key`]; it is never read here.
    pub key_file: Option<String>,
}

impl RemoteConfig {
    /// Creates a configuration with only the required fields populated.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        address: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            address: address.into(),
            path: path.into(),
            password: None,
            port: None,
            key_file: None,
        }
    }

    /// Returns the `user@host` login target.
    #[must_use]
    pub fn login(&self) -> String {
        format!("{}@{}", self.username, self.address)
    }

    /// Renders the configuration back into the raw mapping shape.
    #[must_use]
    pub fn to_raw(&self) -> RawMap {
        let mut raw = RawMap::new();
        raw.insert(String::from("username"), Value::from(self.username.clone()));
        raw.insert(String::from("address"), Value::from(self.address.clone()));
        raw.insert(String::from("path"), Value::from(self.path.clone()));
        if let Some(ref password) = self.password {
            raw.insert(String::from("password"), Value::from(password.clone()));
        }
        if let Some(port) = self.port {
            raw.insert(String::from("port"), Value::from(port));
        }
        if let Some(ref key_file) = self.key_file {
            raw.insert(String::from("keyFile"), Value::from(key_file.clone()));
        }
        raw
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("port", &self.port)
            .field("key_file", &self.key_file)
            .finish()
    }
}

/// Per-call authentication material.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct AuthParameters {
    /// Password overriding any stored one.
    pub password: Option<String>,
    /// Raw private key material.
    pub key: Option<String>,
}

impl AuthParameters {
    /// Parameters carrying a password.
    #[must_use]
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            key: None,
        }
    }

    /// Parameters carrying raw key material.
    #[must_use]
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            password: None,
            key: Some(key.into()),
        }
    }
}

impl fmt::Debug for AuthParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthParameters")
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("key", &self.key.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Validates a raw remote mapping.
///
/// # Errors
///
/// Returns [`RemoteError::InvalidConfiguration`] when a required key is
/// missing, a key is not recognised, or `port` is not numeric.
pub fn validate_remote(raw: &RawMap) -> Result<RemoteConfig, RemoteError> {
    let username = required_string(raw, "username")?;
    let address = required_string(raw, "address")?;
    let path = required_string(raw, "path")?;

    for key in raw.keys() {
        let known = REQUIRED_REMOTE_KEYS
            .iter()
            .chain(OPTIONAL_REMOTE_KEYS.iter())
            .any(|candidate| candidate == key);
        if !known {
            return Err(RemoteError::invalid(format!(
                "invalid remote configuration key '{key}'"
            )));
        }
    }

    Ok(RemoteConfig {
        username,
        address,
        path,
        password: raw.get("password").and_then(coerce_string),
        port: raw.get("port").map(coerce_port).transpose()?.flatten(),
        key_file: raw.get("keyFile").and_then(coerce_string),
    })
}

/// Validates a raw per-call parameter mapping.
///
/// # Errors
///
/// Returns [`RemoteError::InvalidConfiguration`] for any key other than
/// `password` or `key`.
pub fn validate_parameters(raw: &RawMap) -> Result<AuthParameters, RemoteError> {
    if let Some(key) = raw.keys().find(|key| !PARAMETER_KEYS.contains(&key.as_str())) {
        return Err(RemoteError::invalid(format!(
            "invalid remote parameter '{key}'"
        )));
    }

    Ok(AuthParameters {
        password: raw.get("password").and_then(coerce_string),
        key: raw.get("key").and_then(coerce_string),
    })
}

fn required_string(raw: &RawMap, key: &str) -> Result<String, RemoteError> {
    raw.get(key)
        .and_then(coerce_string)
        .ok_or_else(|| RemoteError::invalid(format!("missing required remote key '{key}'")))
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn coerce_port(value: &Value) -> Result<Option<u16>, RemoteError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => port_from_number(number).map(Some),
        other => Err(RemoteError::invalid(format!(
            "port must be an integer, got {}",
            json_type(other)
        ))),
    }
}

fn port_from_number(number: &Number) -> Result<u16, RemoteError> {
    let out_of_range = || RemoteError::invalid(format!("port {number} is out of range"));

    if let Some(whole) = number.as_u64() {
        return u16::try_from(whole).map_err(|_| out_of_range());
    }
    if number.is_i64() {
        return Err(out_of_range());
    }

    // Fractional ports are truncated; formatting the truncated value keeps
    // the range check in one place.
    let truncated = number.as_f64().map(f64::trunc).ok_or_else(out_of_range)?;
    format!("{truncated:.0}")
        .parse::<u16>()
        .map_err(|_| out_of_range())
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
