//! Registered backend clusters (Connected Service Instances).
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// Supported kinds of backend clusters.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    /// Cloud Foundry style application platform.
    Hcf,

    /// Code Engine style continuous delivery service.
    Hce,
}

impl ClusterKind {
    /// Identifier of the kind used in APIs and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterKind::Hcf => "hcf",
            ClusterKind::Hce => "hce",
        }
    }
}

impl std::fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterKind {
    type Err = UnknownClusterKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hcf" => Ok(ClusterKind::Hcf),
            "hce" => Ok(ClusterKind::Hce),
            other => Err(UnknownClusterKind(other.to_string())),
        }
    }
}

/// The cluster kind is not one of the supported kinds.
#[derive(Debug)]
pub struct UnknownClusterKind(pub String);

impl std::fmt::Display for UnknownClusterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown cluster kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownClusterKind {}

/// A backend cluster registered with the proxy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterRegistration {
    /// Base URL of the cluster API.
    pub api_endpoint: String,

    /// Time the cluster was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// ID of the admin user that registered the cluster.
    pub created_by: String,

    /// Unique ID of the registration.
    pub guid: String,

    /// Kind of cluster behind the endpoint.
    pub kind: ClusterKind,

    /// Display name of the cluster.
    pub name: String,

    /// Skip TLS certificate verification when talking to the cluster.
    pub skip_ssl_validation: bool,
}

/// A registered cluster along with the caller's credentials state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterConnection {
    /// The cluster registration record.
    #[serde(flatten)]
    pub cluster: ClusterRegistration,

    /// Expiry of the session's token for the cluster, if one is stored.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub token_expiry: Option<OffsetDateTime>,
}

/// Request to register a new cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCluster {
    /// Base URL of the cluster API.
    pub api_endpoint: String,

    /// ID of the admin user registering the cluster.
    pub created_by: String,

    /// Kind of cluster behind the endpoint.
    pub kind: ClusterKind,

    /// Display name of the cluster.
    pub name: String,

    /// Skip TLS certificate verification when talking to the cluster.
    pub skip_ssl_validation: bool,
}

#[cfg(test)]
mod tests {
    use super::ClusterKind;

    #[test]
    fn kind_from_str() {
        assert_eq!("hcf".parse::<ClusterKind>().unwrap(), ClusterKind::Hcf);
        assert_eq!("hce".parse::<ClusterKind>().unwrap(), ClusterKind::Hce);
        assert!("k8s".parse::<ClusterKind>().is_err());
    }

    #[test]
    fn kind_to_json() {
        let actual = serde_json::to_string(&ClusterKind::Hce).unwrap();
        assert_eq!(actual, r#""hce""#);
    }
}
