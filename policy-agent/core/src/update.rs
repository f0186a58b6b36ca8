use crate::{
    EndpointKey, HostEndpoint, HostEndpointKey, Policy, PolicyKey, ProfileId, ProfileRules,
    WorkloadEndpoint, WorkloadEndpointKey,
};
use policy_agent_labels::Map;
use serde::Deserialize;

/// A change to a single resource in the datastore.
///
/// A present `value` creates or replaces the resource; an absent one deletes it.
///
/// Updates are decoded from objects tagged by `kind`, e.g.
/// `{"kind": "policy", "key": {"name": "allow-web"}, "value": {"selector": "role == 'web'"}}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Update {
    WorkloadEndpoint {
        key: WorkloadEndpointKey,
        #[serde(default)]
        value: Option<WorkloadEndpoint>,
    },
    HostEndpoint {
        key: HostEndpointKey,
        #[serde(default)]
        value: Option<HostEndpoint>,
    },
    Policy {
        key: PolicyKey,
        #[serde(default)]
        value: Option<Policy>,
    },
    ProfileRules {
        key: ProfileId,
        #[serde(default)]
        value: Option<ProfileRules>,
    },
    ProfileLabels {
        key: ProfileId,
        #[serde(default)]
        value: Option<Map>,
    },
    ProfileTags {
        key: ProfileId,
        #[serde(default)]
        value: Option<Vec<String>>,
    },

    /// A resource kind that nothing in the calculation graph consumes.
    #[serde(other)]
    Unknown,
}

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkloadEndpoint { .. } => "workload-endpoint",
            Self::HostEndpoint { .. } => "host-endpoint",
            Self::Policy { .. } => "policy",
            Self::ProfileRules { .. } => "profile-rules",
            Self::ProfileLabels { .. } => "profile-labels",
            Self::ProfileTags { .. } => "profile-tags",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the key of the endpoint this update describes, if any.
    pub fn endpoint_key(&self) -> Option<EndpointKey> {
        match self {
            Self::WorkloadEndpoint { key, .. } => Some(key.clone().into()),
            Self::HostEndpoint { key, .. } => Some(key.clone().into()),
            _ => None,
        }
    }

    /// Returns true if this update removes its resource.
    pub fn is_delete(&self) -> bool {
        match self {
            Self::WorkloadEndpoint { value, .. } => value.is_none(),
            Self::HostEndpoint { value, .. } => value.is_none(),
            Self::Policy { value, .. } => value.is_none(),
            Self::ProfileRules { value, .. } => value.is_none(),
            Self::ProfileLabels { value, .. } => value.is_none(),
            Self::ProfileTags { value, .. } => value.is_none(),
            Self::Unknown => false,
        }
    }
}
