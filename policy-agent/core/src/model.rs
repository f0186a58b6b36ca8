use crate::ProfileId;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use policy_agent_labels::Map;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// What to do with a packet that matches a rule.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    #[default]
    Allow,
    Deny,
    Log,
    /// Skips the remaining policies in the current tier.
    NextTier,
}

/// A single match-and-act entry of a policy or profile.
///
/// Selectors in rules are kept as text. They are compiled by the rule-program generator rather
/// than by the activation calculation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    pub action: Action,
    pub protocol: Option<String>,

    pub src_nets: Vec<IpNet>,
    pub src_selector: Option<String>,
    pub src_ports: Vec<u16>,

    pub dst_nets: Vec<IpNet>,
    pub dst_selector: Option<String>,
    pub dst_ports: Vec<u16>,
}

/// The content of a known policy.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Policies with a lower order are applied first. Unordered policies are applied last.
    #[serde(default)]
    pub order: Option<f64>,

    /// Selects the endpoints to which this policy applies.
    #[serde(default)]
    pub selector: String,

    #[serde(default)]
    pub inbound_rules: Vec<Rule>,

    #[serde(default)]
    pub outbound_rules: Vec<Rule>,
}

/// The rules of a known profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRules {
    pub inbound_rules: Vec<Rule>,
    pub outbound_rules: Vec<Rule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadEndpoint {
    pub state: String,
    /// The name of the endpoint's interface on the host.
    pub name: String,
    pub mac: Option<String>,
    pub profile_ids: Vec<ProfileId>,
    pub ipv4_nets: Vec<Ipv4Net>,
    pub ipv6_nets: Vec<Ipv6Net>,
    pub labels: Map,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostEndpoint {
    /// The name of the host interface, if the endpoint is bound to one.
    pub name: Option<String>,
    pub expected_ipv4_addrs: Vec<Ipv4Addr>,
    pub expected_ipv6_addrs: Vec<Ipv6Addr>,
    pub profile_ids: Vec<ProfileId>,
    pub labels: Map,
}
