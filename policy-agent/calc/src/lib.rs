//! Policy Activation Calculation
//!
//! Determines which policies and profiles apply to the endpoints hosted on this node, so that
//! only those need to be compiled into the local rule program. It consumes updates for the
//! following resources:
//!
//! - Each local `WorkloadEndpoint` or `HostEndpoint` carries a set of labels and an ordered list
//!   of profile IDs.
//! - Each `Policy` selects over endpoints by label. A policy is active while it matches at least
//!   one local endpoint.
//! - Each profile's rules apply to the endpoints that name it. A profile is active while at least
//!   one local endpoint names it. A profile's labels and tags are inherited by those endpoints and
//!   so affect which policies select them.
//!
//! ```text
//! [ Policy ] -selects-> [ Endpoint ] -names-> [ Profile ]
//! ```
//!
//! Selector matching is delegated to a [`LabelIndex`], which reports each match as it starts and
//! stops. These reports arrive synchronously, while the calculator is still processing the update
//! that caused them, and the calculator folds them into its state before it returns.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod active_rules;
mod endpoint_profiles;
pub mod label_index;
pub mod metrics;
mod relation;

#[cfg(test)]
mod tests;

pub use self::{
    active_rules::{ActiveRulesCalculator, UpdateError},
    endpoint_profiles::{EndpointProfiles, ProfileDiff},
    label_index::{InheritIndex, LabelIndex, MatchObserver},
    relation::Relation,
};
