use crate::{
    endpoint_profiles::{EndpointProfiles, ProfileDiff},
    label_index::{InheritIndex, LabelIndex, MatchObserver},
    relation::Relation,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use policy_agent_core::{
    EndpointKey, Policy, PolicyKey, PolicyMatchListener, ProfileId, ProfileRules, RuleScanner,
    Update,
};
use policy_agent_labels::{ParseError, Selector};
use tracing::{debug, info};

/// Tracks which policies and profiles apply to at least one local endpoint.
///
/// A policy is active while it is known and its selector matches a local endpoint; a profile is
/// active while its rules are known and a local endpoint names it. Each change in activity is
/// reported to the [`RuleScanner`], and every individual policy match is reported to the
/// [`PolicyMatchListener`].
#[derive(Debug)]
pub struct ActiveRulesCalculator<S, L, I = InheritIndex> {
    label_index: I,
    state: State<S, L>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The policy was treated as deleted because its selector could not be parsed.
    #[error("policy {policy} has an invalid selector: {source}")]
    InvalidSelector {
        policy: PolicyKey,
        #[source]
        source: ParseError,
    },
}

/// Everything the label index's match callbacks may mutate.
///
/// Kept apart from the label index so that the index can call back into it while it is itself
/// being updated.
#[derive(Debug)]
struct State<S, L> {
    /// All known policies and profile rules.
    policies: HashMap<PolicyKey, Policy>,
    profile_rules: HashMap<ProfileId, ProfileRules>,

    /// Policies whose most recent update carried a selector that could not be parsed.
    invalid_policies: HashSet<PolicyKey>,

    /// Policies to the local endpoints their selectors match.
    policy_endpoints: Relation<PolicyKey, EndpointKey>,

    /// Profiles to the local endpoints that name them.
    profile_endpoints: Relation<ProfileId, EndpointKey>,
    endpoint_profiles: EndpointProfiles,

    /// What the scanner was most recently told is active.
    active_policies: HashSet<PolicyKey>,
    active_profiles: HashSet<ProfileId>,

    rule_scanner: S,
    match_listener: L,
}

// === impl ActiveRulesCalculator ===

impl<S, L> ActiveRulesCalculator<S, L> {
    pub fn new(rule_scanner: S, match_listener: L) -> Self {
        Self::with_label_index(InheritIndex::default(), rule_scanner, match_listener)
    }
}

impl<S, L, I> ActiveRulesCalculator<S, L, I> {
    pub fn with_label_index(label_index: I, rule_scanner: S, match_listener: L) -> Self {
        Self {
            label_index,
            state: State {
                policies: HashMap::default(),
                profile_rules: HashMap::default(),
                invalid_policies: HashSet::default(),
                policy_endpoints: Relation::default(),
                profile_endpoints: Relation::default(),
                endpoint_profiles: EndpointProfiles::default(),
                active_policies: HashSet::default(),
                active_profiles: HashSet::default(),
                rule_scanner,
                match_listener,
            },
        }
    }

    pub fn rule_scanner(&self) -> &S {
        &self.state.rule_scanner
    }

    pub fn match_listener(&self) -> &L {
        &self.state.match_listener
    }

    pub fn label_index(&self) -> &I {
        &self.label_index
    }

    /// Returns true if the policy is known and matches at least one local endpoint.
    pub fn is_policy_active(&self, key: &PolicyKey) -> bool {
        self.state.policies.contains_key(key) && self.state.policy_endpoints.contains_key(key)
    }

    /// Returns true if the profile's rules are known and at least one local endpoint names it.
    pub fn is_profile_active(&self, id: &ProfileId) -> bool {
        self.state.profile_rules.contains_key(id) && self.state.profile_endpoints.contains_key(id)
    }

    pub fn active_policy_count(&self) -> usize {
        self.state.active_policies.len()
    }

    pub fn active_profile_count(&self) -> usize {
        self.state.active_profiles.len()
    }

    /// The number of policy-to-endpoint matches.
    pub fn policy_match_count(&self) -> usize {
        self.state.policy_endpoints.len()
    }

    /// Returns the local endpoints that the policy's selector currently matches.
    pub fn policy_endpoints(&self, key: &PolicyKey) -> impl Iterator<Item = &EndpointKey> {
        self.state.policy_endpoints.values(key)
    }

    /// Returns the profile IDs most recently assigned to a local endpoint.
    pub fn endpoint_profile_ids(&self, endpoint: &EndpointKey) -> &[ProfileId] {
        self.state
            .endpoint_profiles
            .get(endpoint)
            .unwrap_or_default()
    }

    /// Iterates over the policies that are currently ignored because of an invalid selector.
    pub fn invalid_policies(&self) -> impl Iterator<Item = &PolicyKey> {
        self.state.invalid_policies.iter()
    }
}

impl<S, L, I> ActiveRulesCalculator<S, L, I>
where
    S: RuleScanner,
    L: PolicyMatchListener,
    I: LabelIndex,
{
    /// Processes a single update, including every notification it triggers, before returning.
    ///
    /// An error describes a policy that could not be applied; the calculator remains consistent
    /// and may continue to process updates.
    pub fn on_update(&mut self, update: &Update) -> Result<(), UpdateError> {
        match update {
            Update::WorkloadEndpoint { key, value } => {
                let key = EndpointKey::from(key.clone());
                match value {
                    Some(_) => debug!(endpoint = %key, "Updating endpoint"),
                    None => debug!(endpoint = %key, "Deleting endpoint"),
                }
                let profile_ids = value
                    .as_ref()
                    .map(|ep| ep.profile_ids.as_slice())
                    .unwrap_or_default();
                self.state.update_endpoint_profile_ids(&key, profile_ids);
                self.label_index.on_update(update, &mut self.state);
            }

            Update::HostEndpoint { key, value } => {
                let key = EndpointKey::from(key.clone());
                match value {
                    Some(_) => debug!(endpoint = %key, "Updating host endpoint"),
                    None => debug!(endpoint = %key, "Deleting host endpoint"),
                }
                let profile_ids = value
                    .as_ref()
                    .map(|ep| ep.profile_ids.as_slice())
                    .unwrap_or_default();
                self.state.update_endpoint_profile_ids(&key, profile_ids);
                self.label_index.on_update(update, &mut self.state);
            }

            Update::ProfileLabels { .. } | Update::ProfileTags { .. } => {
                self.label_index.on_update(update, &mut self.state);
            }

            Update::ProfileRules { key, value } => {
                match value {
                    Some(rules) => {
                        self.state.profile_rules.insert(key.clone(), rules.clone());
                    }
                    None => {
                        self.state.profile_rules.remove(key);
                    }
                }
                if self.state.profile_endpoints.contains_key(key) {
                    debug!(profile = %key, deleted = value.is_none(), "Profile rules updated while active");
                    self.state.send_profile_update(key);
                } else {
                    debug!(profile = %key, deleted = value.is_none(), "Profile rules updated while inactive");
                }
            }

            Update::Policy {
                key,
                value: Some(policy),
            } => {
                debug!(policy = %key, "Updating policy");
                let selector = match policy.selector.parse::<Selector>() {
                    Ok(selector) => selector,
                    Err(source) => {
                        self.invalidate_policy(key);
                        return Err(UpdateError::InvalidSelector {
                            policy: key.clone(),
                            source,
                        });
                    }
                };
                self.state.invalid_policies.remove(key);
                self.state.policies.insert(key.clone(), policy.clone());

                // The index calls back for every endpoint that starts or stops matching, so by
                // the time it returns the relation reflects the new selector.
                self.label_index
                    .update_selector(key.clone(), selector, &mut self.state);
                if self.state.policy_endpoints.contains_key(key) {
                    debug!(policy = %key, "Policy updated while active");
                    self.state.send_policy_update(key);
                }
            }

            Update::Policy { key, value: None } => {
                debug!(policy = %key, "Deleting policy");
                self.state.invalid_policies.remove(key);
                self.state.policies.remove(key);
                // Each stopped match notifies the scanner once the policy has no matches left.
                self.label_index.delete_selector(key, &mut self.state);
            }

            Update::Unknown => {
                info!(kind = update.kind(), "Ignoring unexpected update");
            }
        }

        Ok(())
    }

    /// Removes a policy whose selector can't be parsed, as if it had been deleted.
    fn invalidate_policy(&mut self, key: &PolicyKey) {
        debug!(policy = %key, "Marking policy invalid");
        self.state.invalid_policies.insert(key.clone());
        self.state.policies.remove(key);
        self.label_index.delete_selector(key, &mut self.state);
    }
}

// === impl State ===

impl<S, L> State<S, L>
where
    S: RuleScanner,
{
    fn update_endpoint_profile_ids(&mut self, endpoint: &EndpointKey, profile_ids: &[ProfileId]) {
        debug!(%endpoint, ?profile_ids, "Endpoint profile IDs updated");
        let ProfileDiff { removed, added } = self.endpoint_profiles.update(endpoint, profile_ids);

        // Profiles that no endpoint refers to any more become inactive.
        for id in removed {
            if !self.profile_endpoints.discard(&id, endpoint) {
                continue;
            }
            if !self.profile_endpoints.contains_key(&id) {
                debug!(profile = %id, "Profile no longer referenced by a local endpoint");
                self.send_profile_update(&id);
            }
        }

        for id in added {
            let was_active = self.profile_endpoints.contains_key(&id);
            self.profile_endpoints.insert(id.clone(), endpoint.clone());
            if was_active {
                continue;
            }
            // A profile without rules has never been reported active, so there's nothing to
            // tell the scanner until its rules arrive.
            if self.profile_rules.contains_key(&id) {
                debug!(profile = %id, "Profile now referenced by a local endpoint");
                self.send_profile_update(&id);
            } else {
                debug!(profile = %id, "Profile referenced before its rules are known");
            }
        }
    }

    fn send_profile_update(&mut self, id: &ProfileId) {
        let active = self.profile_endpoints.contains_key(id);
        let rules = self.profile_rules.get(id);
        debug!(profile = %id, known = rules.is_some(), active, "Sending profile update");
        match rules {
            Some(rules) if active => {
                self.active_profiles.insert(id.clone());
                self.rule_scanner.on_profile_active(id, rules);
            }
            _ => {
                self.active_profiles.remove(id);
                self.rule_scanner.on_profile_inactive(id);
            }
        }
    }

    fn send_policy_update(&mut self, key: &PolicyKey) {
        let active = self.policy_endpoints.contains_key(key);
        let policy = self.policies.get(key);
        debug!(policy = %key, known = policy.is_some(), active, "Sending policy update");
        match policy {
            Some(policy) if active => {
                self.active_policies.insert(key.clone());
                self.rule_scanner.on_policy_active(key, policy);
            }
            _ => {
                self.active_policies.remove(key);
                self.rule_scanner.on_policy_inactive(key);
            }
        }
    }
}

impl<S, L> MatchObserver for State<S, L>
where
    S: RuleScanner,
    L: PolicyMatchListener,
{
    fn match_started(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        let was_active = self.policy_endpoints.contains_key(policy);
        self.policy_endpoints
            .insert(policy.clone(), endpoint.clone());
        if !was_active {
            debug!(%policy, "Policy now matches a local endpoint");
            self.send_policy_update(policy);
        }
        self.match_listener.on_policy_match(policy, endpoint);
    }

    fn match_stopped(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        if !self.policy_endpoints.discard(policy, endpoint) {
            return;
        }
        if !self.policy_endpoints.contains_key(policy) {
            debug!(%policy, "Policy no longer matches a local endpoint");
            self.send_policy_update(policy);
        }
        self.match_listener.on_policy_match_stopped(policy, endpoint);
    }
}
