//! Load configuration from files.
use std::collections::HashSet;
use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;

use crate::Conf;

/// Minimum length, in bytes, of the session cookies signing secret.
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Errors handling Portal Proxy configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unable to decode configuration from file at the given path.
    #[error("unable to decode configuration from file at '{0}'")]
    // (path,)
    Decode(String),

    /// A configuration value is not valid.
    #[error("invalid configuration value for '{0}': {1}")]
    // (option, reason)
    Invalid(String, String),

    /// Unable to read configuration file at the given path.
    #[error("unable to read configuration file at '{0}'")]
    // (path,)
    Open(String),

    /// Configuration file not found at the given path.
    #[error("configuration file not found at '{0}'")]
    // (path,)
    PathNotFound(String),
}

impl Error {
    fn invalid<S: Into<String>>(option: &str, reason: S) -> Self {
        Self::Invalid(option.to_string(), reason.into())
    }
}

/// Load process configuration from the specified path.
pub fn load(path: &str) -> Result<Conf> {
    if !PathBuf::from(path).exists() {
        let error = Error::PathNotFound(path.to_string());
        let error = anyhow::anyhow!(error);
        return Err(error);
    }

    let file = File::open(path).with_context(|| Error::Open(path.into()))?;
    let conf: Conf = serde_yaml::from_reader(file).with_context(|| Error::Decode(path.into()))?;
    validate(&conf)?;
    Ok(conf)
}

/// Check configuration values that can't be expressed by the types alone.
pub(crate) fn validate(conf: &Conf) -> Result<()> {
    if conf.sessions.secret.len() < MIN_SESSION_SECRET_LEN {
        let reason = format!("must be at least {} bytes long", MIN_SESSION_SECRET_LEN);
        anyhow::bail!(Error::invalid("sessions.secret", reason));
    }
    if conf.sessions.cleanup_interval_sec == 0 {
        anyhow::bail!(Error::invalid("sessions.cleanup_interval_sec", "must not be 0"));
    }
    if conf.sessions.ttl_sec == 0 {
        anyhow::bail!(Error::invalid("sessions.ttl_sec", "must not be 0"));
    }
    if conf.store.readiness_interval_ms == 0 {
        anyhow::bail!(Error::invalid("store.readiness_interval_ms", "must not be 0"));
    }

    let inline_key = conf
        .encryption
        .key
        .as_deref()
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    if !inline_key && conf.encryption.volume.is_none() {
        anyhow::bail!(Error::invalid(
            "encryption",
            "one of encryption.key or encryption.volume must be set"
        ));
    }

    for origin in &conf.http.allowed_origins {
        let scheme = origin.starts_with("http://") || origin.starts_with("https://");
        if origin != "*" && (!scheme || origin.ends_with('/')) {
            let reason = format!("origin '{}' must be '*' or a scheme://host[:port] value", origin);
            anyhow::bail!(Error::invalid("http.allowed_origins", reason));
        }
    }

    let mut providers = HashSet::new();
    for provider in &conf.vcs {
        if !providers.insert(provider.id.as_str()) {
            let reason = format!("provider '{}' is configured more than once", provider.id);
            anyhow::bail!(Error::invalid("vcs", reason));
        }
    }
    Ok(())
}
