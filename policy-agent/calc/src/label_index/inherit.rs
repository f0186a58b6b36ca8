use super::{LabelIndex, MatchObserver};
use crate::relation::Relation;
use ahash::AHashMap as HashMap;
use policy_agent_core::{EndpointKey, PolicyKey, ProfileId, Update};
use policy_agent_labels::{Labels, Map, Selector};
use std::collections::BTreeMap;

/// A label index in which endpoints inherit labels from their profiles.
///
/// An endpoint's effective labels are its own labels plus those of each of its profiles, in
/// profile order. The endpoint's own labels take precedence, then earlier profiles over later
/// ones. A profile's tags are inherited as labels with an empty value.
#[derive(Debug, Default)]
pub struct InheritIndex {
    selectors: BTreeMap<PolicyKey, Selector>,
    endpoints: BTreeMap<EndpointKey, Endpoint>,
    profiles: HashMap<ProfileId, Profile>,

    /// Profile IDs to the endpoints that inherit from them.
    profile_endpoints: Relation<ProfileId, EndpointKey>,

    /// Policies to the endpoints their selectors currently match.
    matches: Relation<PolicyKey, EndpointKey>,
}

#[derive(Debug)]
struct Endpoint {
    labels: Map,
    profile_ids: Vec<ProfileId>,

    /// `labels` combined with everything inherited from the profiles.
    effective: Labels,
}

#[derive(Debug, Default)]
struct Profile {
    labels: Map,
    tags: Vec<String>,
}

// === impl InheritIndex ===

impl InheritIndex {
    /// Returns true if the policy's selector currently matches the endpoint.
    pub fn is_match(&self, policy: &PolicyKey, endpoint: &EndpointKey) -> bool {
        self.matches.contains(policy, endpoint)
    }

    /// Returns the effective labels of an endpoint.
    pub fn endpoint_labels(&self, endpoint: &EndpointKey) -> Option<&Labels> {
        self.endpoints.get(endpoint).map(|ep| &ep.effective)
    }

    fn update_endpoint(
        &mut self,
        key: EndpointKey,
        labels: Map,
        profile_ids: Vec<ProfileId>,
        observer: &mut dyn MatchObserver,
    ) {
        if let Some(prior) = self.endpoints.get(&key) {
            if prior.labels == labels && prior.profile_ids == profile_ids {
                tracing::trace!(endpoint = %key, "Endpoint unchanged");
                return;
            }
            for id in &prior.profile_ids {
                self.profile_endpoints.remove(id, &key);
            }
        }
        for id in &profile_ids {
            self.profile_endpoints.insert(id.clone(), key.clone());
        }

        let effective = self.effective_labels(&labels, &profile_ids);
        self.endpoints.insert(
            key.clone(),
            Endpoint {
                labels,
                profile_ids,
                effective,
            },
        );
        self.scan_endpoint(&key, observer);
    }

    fn delete_endpoint(&mut self, key: &EndpointKey, observer: &mut dyn MatchObserver) {
        let Some(prior) = self.endpoints.remove(key) else {
            return;
        };
        for id in &prior.profile_ids {
            self.profile_endpoints.remove(id, key);
        }

        let mut policies = self.matches.keys_for(key).cloned().collect::<Vec<_>>();
        policies.sort();
        for policy in policies {
            self.matches.remove(&policy, key);
            observer.match_stopped(&policy, key);
        }
    }

    fn update_profile(
        &mut self,
        id: &ProfileId,
        update: impl FnOnce(&mut Profile),
        observer: &mut dyn MatchObserver,
    ) {
        let profile = self.profiles.entry(id.clone()).or_default();
        update(profile);
        if profile.labels.is_empty() && profile.tags.is_empty() {
            self.profiles.remove(id);
        }

        let mut endpoints = self
            .profile_endpoints
            .values(id)
            .cloned()
            .collect::<Vec<_>>();
        endpoints.sort();
        for key in endpoints {
            let Some(ep) = self.endpoints.get(&key) else {
                continue;
            };
            let effective = self.effective_labels(&ep.labels, &ep.profile_ids);
            if effective == ep.effective {
                continue;
            }
            if let Some(ep) = self.endpoints.get_mut(&key) {
                ep.effective = effective;
            }
            self.scan_endpoint(&key, observer);
        }
    }

    fn effective_labels(&self, labels: &Map, profile_ids: &[ProfileId]) -> Labels {
        let mut effective = labels.clone();
        for profile in profile_ids.iter().filter_map(|id| self.profiles.get(id)) {
            for (k, v) in &profile.labels {
                effective.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for tag in &profile.tags {
                effective.entry(tag.clone()).or_default();
            }
        }
        Labels::from(effective)
    }

    /// Re-evaluates every selector against a single endpoint.
    fn scan_endpoint(&mut self, key: &EndpointKey, observer: &mut dyn MatchObserver) {
        let Some(ep) = self.endpoints.get(key) else {
            return;
        };
        for (policy, selector) in &self.selectors {
            let matches = selector.matches(&ep.effective);
            let matched = self.matches.contains(policy, key);
            if matches && !matched {
                self.matches.insert(policy.clone(), key.clone());
                observer.match_started(policy, key);
            } else if !matches && matched {
                self.matches.remove(policy, key);
                observer.match_stopped(policy, key);
            }
        }
    }
}

impl LabelIndex for InheritIndex {
    fn update_selector(
        &mut self,
        policy: PolicyKey,
        selector: Selector,
        observer: &mut dyn MatchObserver,
    ) {
        if self.selectors.get(&policy) == Some(&selector) {
            tracing::trace!(%policy, "Selector unchanged");
            return;
        }
        tracing::debug!(%policy, %selector, "Updating selector");

        self.selectors.insert(policy.clone(), selector);
        let selector = &self.selectors[&policy];
        for (key, ep) in &self.endpoints {
            let matches = selector.matches(&ep.effective);
            let matched = self.matches.contains(&policy, key);
            if matches && !matched {
                self.matches.insert(policy.clone(), key.clone());
                observer.match_started(&policy, key);
            } else if !matches && matched {
                self.matches.remove(&policy, key);
                observer.match_stopped(&policy, key);
            }
        }
    }

    fn delete_selector(&mut self, policy: &PolicyKey, observer: &mut dyn MatchObserver) {
        if self.selectors.remove(policy).is_none() {
            return;
        }
        tracing::debug!(%policy, "Deleting selector");

        let mut endpoints = self.matches.values(policy).cloned().collect::<Vec<_>>();
        endpoints.sort();
        for key in endpoints {
            self.matches.remove(policy, &key);
            observer.match_stopped(policy, &key);
        }
    }

    fn on_update(&mut self, update: &Update, observer: &mut dyn MatchObserver) {
        match update {
            Update::WorkloadEndpoint {
                key,
                value: Some(ep),
            } => self.update_endpoint(
                key.clone().into(),
                ep.labels.clone(),
                ep.profile_ids.clone(),
                observer,
            ),
            Update::WorkloadEndpoint { key, value: None } => {
                self.delete_endpoint(&key.clone().into(), observer)
            }
            Update::HostEndpoint {
                key,
                value: Some(ep),
            } => self.update_endpoint(
                key.clone().into(),
                ep.labels.clone(),
                ep.profile_ids.clone(),
                observer,
            ),
            Update::HostEndpoint { key, value: None } => {
                self.delete_endpoint(&key.clone().into(), observer)
            }
            Update::ProfileLabels { key, value } => {
                let labels = value.clone().unwrap_or_default();
                self.update_profile(key, |p| p.labels = labels, observer)
            }
            Update::ProfileTags { key, value } => {
                let tags = value.clone().unwrap_or_default();
                self.update_profile(key, |p| p.tags = tags, observer)
            }
            Update::Policy { .. } | Update::ProfileRules { .. } | Update::Unknown => {}
        }
    }
}
