//! Data object storing the Portal Proxy configuration.
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::RuntimeConf;

/// Placeholder for secret values in redacted configuration objects.
const REDACTED: &str = "<redacted>";

/// Global configuration for the Portal Proxy process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Configuration of requests to registered clusters.
    #[serde(default)]
    pub clusters: ClustersConf,

    /// Source of the key used to encrypt stored credentials.
    pub encryption: EncryptionConf,

    /// HTTP Server configuration.
    #[serde(default)]
    pub http: HttpConf,

    /// Process logging configuration.
    #[serde(default)]
    pub logging: LoggingConf,

    /// Process runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConf,

    /// Web sessions configuration.
    pub sessions: SessionsConf,

    /// Identity provider used for single sign-on.
    pub sso: SsoConf,

    /// Persistent Store configuration.
    #[serde(default)]
    pub store: StoreConf,

    /// Post-upgrade guard configuration.
    #[serde(default)]
    pub upgrade: UpgradeConf,

    /// Version control providers users can link their accounts with.
    #[serde(default)]
    pub vcs: Vec<VcsProviderConf>,
}

impl Conf {
    /// Return a copy of the configuration with all secrets replaced by a placeholder.
    pub fn redacted(&self) -> Conf {
        let mut conf = self.clone();
        conf.clusters.client_secret = redact(&conf.clusters.client_secret);
        conf.encryption.key = conf.encryption.key.as_deref().map(redact);
        conf.sessions.secret = redact(&conf.sessions.secret);
        conf.sso.client_secret = redact(&conf.sso.client_secret);
        for provider in conf.vcs.iter_mut() {
            provider.client_secret = redact(&provider.client_secret);
        }
        conf
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Conf {
    /// Configuration object for unit tests.
    ///
    /// Uses an in-memory store, short session TTL and a single `github` VCS provider.
    pub fn fixture() -> Conf {
        Conf {
            clusters: ClustersConf::default(),
            encryption: EncryptionConf {
                key: Some("07".repeat(32)),
                filename: EncryptionConf::default_filename(),
                volume: None,
            },
            http: HttpConf::default(),
            logging: LoggingConf::default(),
            runtime: RuntimeConf::default(),
            sessions: SessionsConf {
                cleanup_interval_sec: SessionsConf::default_cleanup_interval(),
                cookie_name: SessionsConf::default_cookie_name(),
                cookie_secure: false,
                secret: "fixture-secret-to-sign-session-cookies-in-unit-tests".into(),
                ttl_sec: 600,
            },
            sso: SsoConf {
                admin_scope: SsoConf::default_admin_scope(),
                client_id: "portal".into(),
                client_secret: "portal-secret".into(),
                skip_ssl_validation: false,
                timeout_sec: SsoConf::default_timeout(),
                token_url: "https://uaa.example.com/oauth/token".into(),
            },
            store: StoreConf {
                path: ":memory:".into(),
                ..StoreConf::default()
            },
            upgrade: UpgradeConf::default(),
            vcs: vec![VcsProviderConf {
                api_url: "https://api.github.com".into(),
                authorize_url: "https://github.com/login/oauth/authorize".into(),
                callback_url: "https://portal.example.com/v1/vcs/oauth/callback".into(),
                client_id: "github-client".into(),
                client_secret: "github-secret".into(),
                id: "github".into(),
                label: "GitHub".into(),
                scopes: vec!["repo".into()],
                skip_ssl_validation: false,
                token_url: "https://github.com/login/oauth/access_token".into(),
            }],
        }
    }
}

fn redact(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}

/// Configuration of requests to registered clusters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClustersConf {
    /// OAuth client ID presented to cluster authentication endpoints.
    #[serde(default = "ClustersConf::default_client_id")]
    pub client_id: String,

    /// OAuth client secret presented to cluster authentication endpoints.
    #[serde(default)]
    pub client_secret: String,

    /// Timeout, in seconds, to establish connections to clusters.
    #[serde(default = "ClustersConf::default_connect_timeout")]
    pub connect_timeout_sec: u64,

    /// Timeout, in seconds, for proxied requests and cluster logins.
    #[serde(default = "ClustersConf::default_request_timeout")]
    pub request_timeout_sec: u64,

    /// Timeout, in seconds, for long lived streaming requests.
    #[serde(default = "ClustersConf::default_stream_timeout")]
    pub stream_timeout_sec: u64,
}

impl ClustersConf {
    fn default_client_id() -> String {
        "cf".to_string()
    }

    fn default_connect_timeout() -> u64 {
        10
    }

    fn default_request_timeout() -> u64 {
        30
    }

    fn default_stream_timeout() -> u64 {
        3600
    }
}

impl Default for ClustersConf {
    fn default() -> Self {
        ClustersConf {
            client_id: Self::default_client_id(),
            client_secret: String::new(),
            connect_timeout_sec: Self::default_connect_timeout(),
            request_timeout_sec: Self::default_request_timeout(),
            stream_timeout_sec: Self::default_stream_timeout(),
        }
    }
}

/// Source of the key used to encrypt stored credentials.
///
/// An inline `key` takes precedence over the shared volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConf {
    /// Hex encoded encryption key.
    #[serde(default)]
    pub key: Option<String>,

    /// Name of the key file within the shared volume.
    #[serde(default = "EncryptionConf::default_filename")]
    pub filename: String,

    /// Path to an operator provisioned volume holding the key file.
    #[serde(default)]
    pub volume: Option<PathBuf>,
}

impl EncryptionConf {
    fn default_filename() -> String {
        "key".to_string()
    }

    /// Path to the key file on the shared volume, if a volume is configured.
    pub fn key_file(&self) -> Option<PathBuf> {
        self.volume
            .as_ref()
            .map(|volume| volume.join(&self.filename))
    }
}

/// HTTP Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConf {
    /// Browser origins allowed to make credentialed cross-origin requests.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Address to bind the HTTP server to.
    #[serde(default = "HttpConf::default_bind")]
    pub bind: String,

    /// Number of HTTP worker threads, defaults to the number of CPUs.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl HttpConf {
    fn default_bind() -> String {
        "0.0.0.0:3003".to_string()
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        HttpConf {
            allowed_origins: Vec::new(),
            bind: Self::default_bind(),
            workers: None,
        }
    }
}

/// Process logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConf {
    /// Flush logs asynchronously.
    #[serde(default = "LoggingConf::default_async", rename = "async")]
    pub async_flush: bool,

    /// The drain to send logs to.
    #[serde(default)]
    pub drain: LoggingDrain,

    /// Minimum level of log events to emit.
    #[serde(default)]
    pub level: LoggingLevel,
}

impl LoggingConf {
    fn default_async() -> bool {
        true
    }
}

impl Default for LoggingConf {
    fn default() -> Self {
        LoggingConf {
            async_flush: Self::default_async(),
            drain: LoggingDrain::default(),
            level: LoggingLevel::default(),
        }
    }
}

/// List of supported logging drains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingDrain {
    /// Log JSON objects to standard output.
    #[default]
    Json,
}

/// Minimum level of log events to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Web sessions configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsConf {
    /// Interval, in seconds, between expired sessions cleanups.
    #[serde(default = "SessionsConf::default_cleanup_interval")]
    pub cleanup_interval_sec: u64,

    /// Name of the session cookie.
    #[serde(default = "SessionsConf::default_cookie_name")]
    pub cookie_name: String,

    /// Set the `Secure` attribute on the session cookie.
    #[serde(default = "SessionsConf::default_cookie_secure")]
    pub cookie_secure: bool,

    /// Secret used to sign session cookies (at least 32 bytes).
    pub secret: String,

    /// Time, in seconds, a session can be idle before it expires.
    #[serde(default = "SessionsConf::default_ttl")]
    pub ttl_sec: u64,
}

impl SessionsConf {
    fn default_cleanup_interval() -> u64 {
        300
    }

    fn default_cookie_name() -> String {
        "portal-session".to_string()
    }

    fn default_cookie_secure() -> bool {
        true
    }

    fn default_ttl() -> u64 {
        1800
    }
}

/// Identity provider used for single sign-on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoConf {
    /// OAuth scope that grants administrative rights.
    #[serde(default = "SsoConf::default_admin_scope")]
    pub admin_scope: String,

    /// OAuth client ID of the proxy.
    pub client_id: String,

    /// OAuth client secret of the proxy.
    #[serde(default)]
    pub client_secret: String,

    /// Skip TLS certificate validation of the identity provider.
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Timeout, in seconds, for requests to the identity provider.
    #[serde(default = "SsoConf::default_timeout")]
    pub timeout_sec: u64,

    /// URL of the identity provider token endpoint.
    pub token_url: String,
}

impl SsoConf {
    fn default_admin_scope() -> String {
        "stackato.admin".to_string()
    }

    fn default_timeout() -> u64 {
        30
    }
}

/// Persistent Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConf {
    /// Path to the SQLite database file.
    #[serde(default = "StoreConf::default_path")]
    pub path: String,

    /// Interval, in milliseconds, between store liveness checks during startup.
    #[serde(default = "StoreConf::default_readiness_interval")]
    pub readiness_interval_ms: u64,

    /// Time, in seconds, to wait for the store to become available during startup.
    #[serde(default = "StoreConf::default_readiness_timeout")]
    pub readiness_timeout_sec: u64,
}

impl StoreConf {
    fn default_path() -> String {
        "portal-proxy.db".to_string()
    }

    fn default_readiness_interval() -> u64 {
        1000
    }

    fn default_readiness_timeout() -> u64 {
        600
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        StoreConf {
            path: Self::default_path(),
            readiness_interval_ms: Self::default_readiness_interval(),
            readiness_timeout_sec: Self::default_readiness_timeout(),
        }
    }
}

/// Post-upgrade guard configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConf {
    /// Path of the lock file present while an upgrade is in progress.
    #[serde(default)]
    pub lock_file: Option<PathBuf>,

    /// Value of the `Retry-After` header, in seconds, while an upgrade is in progress.
    #[serde(default = "UpgradeConf::default_retry_after")]
    pub retry_after_sec: u64,
}

impl UpgradeConf {
    fn default_retry_after() -> u64 {
        60
    }
}

impl Default for UpgradeConf {
    fn default() -> Self {
        UpgradeConf {
            lock_file: None,
            retry_after_sec: Self::default_retry_after(),
        }
    }
}

/// Version control provider users can link their accounts with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsProviderConf {
    /// Base URL of the provider REST API requests are proxied to.
    pub api_url: String,

    /// URL of the provider OAuth authorisation page.
    pub authorize_url: String,

    /// URL the provider redirects users to after authorisation.
    pub callback_url: String,

    /// OAuth client ID registered with the provider.
    pub client_id: String,

    /// OAuth client secret registered with the provider.
    pub client_secret: String,

    /// Unique identifier of the provider.
    pub id: String,

    /// Human readable name of the provider.
    pub label: String,

    /// OAuth scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Skip TLS certificate validation of the provider.
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// URL of the provider OAuth token endpoint.
    pub token_url: String,
}
