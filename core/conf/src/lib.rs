//! Portal Proxy configuration object and helpers.
mod loading;
mod object;
mod runtime;

pub use self::loading::load;
pub use self::loading::Error;
pub use self::object::ClustersConf;
pub use self::object::Conf;
pub use self::object::EncryptionConf;
pub use self::object::HttpConf;
pub use self::object::LoggingConf;
pub use self::object::LoggingDrain;
pub use self::object::LoggingLevel;
pub use self::object::SessionsConf;
pub use self::object::SsoConf;
pub use self::object::StoreConf;
pub use self::object::UpgradeConf;
pub use self::object::VcsProviderConf;
pub use self::runtime::RuntimeConf;
