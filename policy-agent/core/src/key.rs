use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

/// Identifies a security policy within its tier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct PolicyKey {
    #[serde(default = "PolicyKey::default_tier")]
    pub tier: String,
    pub name: String,
}

/// Names a profile. Profiles are referenced by endpoints by this name rather than selected by
/// labels.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ProfileId(String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadEndpointKey {
    pub hostname: String,
    pub orchestrator_id: String,
    pub workload_id: String,
    pub endpoint_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEndpointKey {
    pub hostname: String,
    pub endpoint_id: String,
}

/// Identifies either kind of endpoint.
///
/// Most of the calculation graph treats both kinds interchangeably; the variant is kept so that
/// consumers can still tell them apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKey {
    Workload(WorkloadEndpointKey),
    Host(HostEndpointKey),
}

// === impl PolicyKey ===

impl PolicyKey {
    pub const DEFAULT_TIER: &'static str = "default";

    pub fn new(tier: impl ToString, name: impl ToString) -> Self {
        Self {
            tier: tier.to_string(),
            name: name.to_string(),
        }
    }

    /// Creates a key for a policy in the default tier.
    pub fn named(name: impl ToString) -> Self {
        Self::new(Self::DEFAULT_TIER, name)
    }

    fn default_tier() -> String {
        Self::DEFAULT_TIER.to_string()
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tier, self.name)
    }
}

// === impl ProfileId ===

impl ProfileId {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for ProfileId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl WorkloadEndpointKey ===

impl WorkloadEndpointKey {
    pub fn new(
        hostname: impl ToString,
        orchestrator_id: impl ToString,
        workload_id: impl ToString,
        endpoint_id: impl ToString,
    ) -> Self {
        Self {
            hostname: hostname.to_string(),
            orchestrator_id: orchestrator_id.to_string(),
            workload_id: workload_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
        }
    }
}

impl fmt::Display for WorkloadEndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.hostname, self.orchestrator_id, self.workload_id, self.endpoint_id
        )
    }
}

// === impl HostEndpointKey ===

impl HostEndpointKey {
    pub fn new(hostname: impl ToString, endpoint_id: impl ToString) -> Self {
        Self {
            hostname: hostname.to_string(),
            endpoint_id: endpoint_id.to_string(),
        }
    }
}

impl fmt::Display for HostEndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hostname, self.endpoint_id)
    }
}

// === impl EndpointKey ===

impl EndpointKey {
    /// The host on which the endpoint lives.
    pub fn hostname(&self) -> &str {
        match self {
            Self::Workload(k) => &k.hostname,
            Self::Host(k) => &k.hostname,
        }
    }
}

impl From<WorkloadEndpointKey> for EndpointKey {
    fn from(key: WorkloadEndpointKey) -> Self {
        Self::Workload(key)
    }
}

impl From<HostEndpointKey> for EndpointKey {
    fn from(key: HostEndpointKey) -> Self {
        Self::Host(key)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload(k) => write!(f, "workload:{}", k),
            Self::Host(k) => write!(f, "host:{}", k),
        }
    }
}
