use crate::core::{
    EndpointKey, Policy, PolicyKey, PolicyMatchListener, ProfileId, ProfileRules, RuleScanner,
};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

/// The policies and profiles currently active on this node, with their content.
///
/// Clones share the same state so that the admin server can read what the calculator writes.
#[derive(Clone, Debug, Default)]
pub struct ActiveSet(Arc<RwLock<Active>>);

#[derive(Debug, Default)]
struct Active {
    policies: BTreeMap<PolicyKey, Policy>,
    profiles: BTreeMap<ProfileId, ProfileRules>,
}

/// Counts the policies that match each local endpoint.
#[derive(Clone, Debug, Default)]
pub struct EndpointMatchCounts(Arc<RwLock<HashMap<EndpointKey, usize>>>);

// === impl ActiveSet ===

impl ActiveSet {
    pub fn policy(&self, key: &PolicyKey) -> Option<Policy> {
        self.0.read().policies.get(key).cloned()
    }

    pub fn profile(&self, id: &ProfileId) -> Option<ProfileRules> {
        self.0.read().profiles.get(id).cloned()
    }

    pub fn policy_keys(&self) -> Vec<PolicyKey> {
        self.0.read().policies.keys().cloned().collect()
    }

    pub fn profile_ids(&self) -> Vec<ProfileId> {
        self.0.read().profiles.keys().cloned().collect()
    }

    /// Renders the active set as a JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        let active = self.0.read();
        let policies = active
            .policies
            .iter()
            .map(|(key, policy)| (key.to_string(), serde_json::json!(policy)))
            .collect::<serde_json::Map<_, _>>();
        let profiles = active
            .profiles
            .iter()
            .map(|(id, rules)| (id.to_string(), serde_json::json!(rules)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::json!({
            "policies": policies,
            "profiles": profiles,
        })
    }
}

impl RuleScanner for ActiveSet {
    fn on_policy_active(&mut self, key: &PolicyKey, policy: &Policy) {
        let prior = self.0.write().policies.insert(key.clone(), policy.clone());
        match prior {
            None => info!(policy = %key, "Policy active"),
            Some(prior) if prior != *policy => info!(policy = %key, "Active policy updated"),
            Some(_) => debug!(policy = %key, "Policy already active"),
        }
    }

    fn on_policy_inactive(&mut self, key: &PolicyKey) {
        if self.0.write().policies.remove(key).is_some() {
            info!(policy = %key, "Policy inactive");
        } else {
            debug!(policy = %key, "Policy already inactive");
        }
    }

    fn on_profile_active(&mut self, id: &ProfileId, rules: &ProfileRules) {
        let prior = self.0.write().profiles.insert(id.clone(), rules.clone());
        match prior {
            None => info!(profile = %id, "Profile active"),
            Some(prior) if prior != *rules => info!(profile = %id, "Active profile updated"),
            Some(_) => debug!(profile = %id, "Profile already active"),
        }
    }

    fn on_profile_inactive(&mut self, id: &ProfileId) {
        if self.0.write().profiles.remove(id).is_some() {
            info!(profile = %id, "Profile inactive");
        } else {
            debug!(profile = %id, "Profile already inactive");
        }
    }
}

// === impl EndpointMatchCounts ===

impl EndpointMatchCounts {
    /// Returns the number of policies that match the endpoint.
    pub fn get(&self, endpoint: &EndpointKey) -> usize {
        self.0.read().get(endpoint).copied().unwrap_or(0)
    }

    /// The number of endpoints matched by at least one policy.
    pub fn endpoints(&self) -> usize {
        self.0.read().len()
    }
}

impl PolicyMatchListener for EndpointMatchCounts {
    fn on_policy_match(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        let mut counts = self.0.write();
        let count = counts.entry(endpoint.clone()).or_default();
        *count += 1;
        debug!(%policy, %endpoint, matches = *count, "Policy matches endpoint");
    }

    fn on_policy_match_stopped(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        let mut counts = self.0.write();
        let Some(count) = counts.get_mut(endpoint) else {
            tracing::error!(%policy, %endpoint, "Match stopped for an endpoint without matches");
            return;
        };
        *count -= 1;
        debug!(%policy, %endpoint, matches = *count, "Policy no longer matches endpoint");
        if *count == 0 {
            counts.remove(endpoint);
        }
    }
}
