//! Container for the complete process runtime configuration.
use serde::Deserialize;
use serde::Serialize;

/// Default time, in seconds, allowed for in-flight requests to complete on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_TIMEOUT: u64 = 30;

/// Container for the complete process runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConf {
    /// Allowed time, in seconds, for running operations to complete once process shutdown begins.
    #[serde(default = "RuntimeConf::default_shutdown_grace")]
    pub shutdown_grace_sec: u64,

    /// Number of tokio worker threads, defaults to the number of CPUs.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl RuntimeConf {
    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_TIMEOUT
    }

    /// Build a multi-threaded tokio runtime according to the configuration.
    pub fn into_runtime(self) -> std::io::Result<tokio::runtime::Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        if let Some(threads) = self.worker_threads {
            builder.worker_threads(threads);
        }
        builder.build()
    }
}

impl Default for RuntimeConf {
    fn default() -> Self {
        RuntimeConf {
            shutdown_grace_sec: Self::default_shutdown_grace(),
            worker_threads: None,
        }
    }
}
