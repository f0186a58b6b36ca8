#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod key;
mod model;
mod update;

pub use self::{
    key::{EndpointKey, HostEndpointKey, PolicyKey, ProfileId, WorkloadEndpointKey},
    model::{Action, HostEndpoint, Policy, ProfileRules, Rule, WorkloadEndpoint},
    update::Update,
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Receives the policies and profiles that must be compiled into the rule program.
///
/// A notification reflects the state at the time it is sent, so a receiver may see the same
/// notification more than once for a single logical transition and must treat repeats as no-ops.
pub trait RuleScanner {
    fn on_policy_active(&mut self, key: &PolicyKey, policy: &Policy);
    fn on_policy_inactive(&mut self, key: &PolicyKey);
    fn on_profile_active(&mut self, id: &ProfileId, rules: &ProfileRules);
    fn on_profile_inactive(&mut self, id: &ProfileId);
}

/// Observes every individual policy-to-endpoint match, not only activation transitions.
pub trait PolicyMatchListener {
    fn on_policy_match(&mut self, policy: &PolicyKey, endpoint: &EndpointKey);
    fn on_policy_match_stopped(&mut self, policy: &PolicyKey, endpoint: &EndpointKey);
}
