mod endpoints;

use super::*;
use policy_agent_core::{
    Action, EndpointKey, HostEndpoint, HostEndpointKey, Policy, PolicyKey, PolicyMatchListener,
    ProfileId, ProfileRules, Rule, RuleScanner, Update, WorkloadEndpoint, WorkloadEndpointKey,
};
use std::{cell::RefCell, rc::Rc};

/// A notification observed by either the rule scanner or the match listener.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    PolicyActive(PolicyKey, Policy),
    PolicyInactive(PolicyKey),
    ProfileActive(ProfileId, ProfileRules),
    ProfileInactive(ProfileId),
    Match(PolicyKey, EndpointKey),
    MatchStopped(PolicyKey, EndpointKey),
}

/// Records notifications into a log shared by all of its clones, so the order of rule-scanner
/// and match-listener notifications can be checked together.
#[derive(Clone, Debug, Default)]
pub(crate) struct Recorder(Rc<RefCell<Vec<Event>>>);

struct TestConfig {
    calc: ActiveRulesCalculator<Recorder, Recorder>,
    events: Recorder,
    _tracing: tracing::subscriber::DefaultGuard,
}

// === impl Recorder ===

impl Recorder {
    pub(crate) fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl RuleScanner for Recorder {
    fn on_policy_active(&mut self, key: &PolicyKey, policy: &Policy) {
        self.0
            .borrow_mut()
            .push(Event::PolicyActive(key.clone(), policy.clone()));
    }

    fn on_policy_inactive(&mut self, key: &PolicyKey) {
        self.0.borrow_mut().push(Event::PolicyInactive(key.clone()));
    }

    fn on_profile_active(&mut self, id: &ProfileId, rules: &ProfileRules) {
        self.0
            .borrow_mut()
            .push(Event::ProfileActive(id.clone(), rules.clone()));
    }

    fn on_profile_inactive(&mut self, id: &ProfileId) {
        self.0.borrow_mut().push(Event::ProfileInactive(id.clone()));
    }
}

impl PolicyMatchListener for Recorder {
    fn on_policy_match(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        self.0
            .borrow_mut()
            .push(Event::Match(policy.clone(), endpoint.clone()));
    }

    fn on_policy_match_stopped(&mut self, policy: &PolicyKey, endpoint: &EndpointKey) {
        self.0
            .borrow_mut()
            .push(Event::MatchStopped(policy.clone(), endpoint.clone()));
    }
}

// === impl TestConfig ===

impl TestConfig {
    fn apply(&mut self, update: Update) {
        self.calc
            .on_update(&update)
            .expect("update must be valid");
    }

    /// Returns the notifications observed since the last call.
    fn take(&self) -> Vec<Event> {
        self.events.take()
    }

    /// Returns only the rule-scanner notifications observed since the last call.
    fn take_activations(&self) -> Vec<Event> {
        self.take()
            .into_iter()
            .filter(|ev| !matches!(ev, Event::Match(..) | Event::MatchStopped(..)))
            .collect()
    }

    fn init_tracing() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        )
    }
}

impl Default for TestConfig {
    fn default() -> TestConfig {
        let _tracing = Self::init_tracing();
        let events = Recorder::default();
        Self {
            calc: ActiveRulesCalculator::new(events.clone(), events.clone()),
            events,
            _tracing,
        }
    }
}

// === fixtures ===

pub(crate) fn workload_key(name: &str) -> EndpointKey {
    WorkloadEndpointKey::new("node-0", "k8s", name, "eth0").into()
}

pub(crate) fn host_key(name: &str) -> EndpointKey {
    HostEndpointKey::new("node-0", name).into()
}

pub(crate) fn mk_workload(name: &str, labels: &[(&str, &str)], profiles: &[&str]) -> Update {
    Update::WorkloadEndpoint {
        key: WorkloadEndpointKey::new("node-0", "k8s", name, "eth0"),
        value: Some(WorkloadEndpoint {
            state: "active".to_string(),
            name: format!("cali-{}", name),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            profile_ids: profiles.iter().map(|&id| id.into()).collect(),
            ..Default::default()
        }),
    }
}

pub(crate) fn delete_workload(name: &str) -> Update {
    Update::WorkloadEndpoint {
        key: WorkloadEndpointKey::new("node-0", "k8s", name, "eth0"),
        value: None,
    }
}

pub(crate) fn mk_host(name: &str, labels: &[(&str, &str)], profiles: &[&str]) -> Update {
    Update::HostEndpoint {
        key: HostEndpointKey::new("node-0", name),
        value: Some(HostEndpoint {
            name: Some(name.to_string()),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            profile_ids: profiles.iter().map(|&id| id.into()).collect(),
            ..Default::default()
        }),
    }
}

pub(crate) fn delete_host(name: &str) -> Update {
    Update::HostEndpoint {
        key: HostEndpointKey::new("node-0", name),
        value: None,
    }
}

pub(crate) fn mk_policy_value(selector: &str) -> Policy {
    Policy {
        order: Some(10.0),
        selector: selector.to_string(),
        inbound_rules: vec![Rule {
            action: Action::Allow,
            protocol: Some("tcp".to_string()),
            dst_ports: vec![80],
            ..Default::default()
        }],
        outbound_rules: vec![Rule::default()],
    }
}

pub(crate) fn mk_policy(name: &str, selector: &str) -> Update {
    Update::Policy {
        key: PolicyKey::named(name),
        value: Some(mk_policy_value(selector)),
    }
}

pub(crate) fn delete_policy(name: &str) -> Update {
    Update::Policy {
        key: PolicyKey::named(name),
        value: None,
    }
}

pub(crate) fn mk_rules_value(action: Action) -> ProfileRules {
    ProfileRules {
        inbound_rules: vec![Rule {
            action,
            src_selector: Some("has(trusted)".to_string()),
            ..Default::default()
        }],
        outbound_rules: vec![Rule::default()],
    }
}

pub(crate) fn mk_profile_rules(id: &str) -> Update {
    Update::ProfileRules {
        key: id.into(),
        value: Some(mk_rules_value(Action::Allow)),
    }
}

pub(crate) fn delete_profile_rules(id: &str) -> Update {
    Update::ProfileRules {
        key: id.into(),
        value: None,
    }
}

pub(crate) fn policy_active(name: &str, selector: &str) -> Event {
    Event::PolicyActive(PolicyKey::named(name), mk_policy_value(selector))
}

pub(crate) fn policy_inactive(name: &str) -> Event {
    Event::PolicyInactive(PolicyKey::named(name))
}

pub(crate) fn profile_active(id: &str) -> Event {
    Event::ProfileActive(id.into(), mk_rules_value(Action::Allow))
}

pub(crate) fn profile_inactive(id: &str) -> Event {
    Event::ProfileInactive(id.into())
}

pub(crate) fn matched(policy: &str, endpoint: EndpointKey) -> Event {
    Event::Match(PolicyKey::named(policy), endpoint)
}

pub(crate) fn match_stopped(policy: &str, endpoint: EndpointKey) -> Event {
    Event::MatchStopped(PolicyKey::named(policy), endpoint)
}
