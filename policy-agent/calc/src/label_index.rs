//! Matches policy selectors against the labels of local endpoints.
//!
//! The index reports each change in whether a selector matches an endpoint through a
//! [`MatchObserver`] supplied by the caller. Notifications are delivered synchronously, before the
//! call into the index returns, so the caller observes a consistent view of every match the call
//! produced.

mod inherit;

pub use self::inherit::InheritIndex;
use policy_agent_core::{EndpointKey, PolicyKey, Update};
use policy_agent_labels::Selector;

/// Receives match transitions from a [`LabelIndex`].
pub trait MatchObserver {
    /// The policy's selector now matches the endpoint.
    fn match_started(&mut self, policy: &PolicyKey, endpoint: &EndpointKey);

    /// The policy's selector no longer matches the endpoint.
    fn match_stopped(&mut self, policy: &PolicyKey, endpoint: &EndpointKey);
}

pub trait LabelIndex {
    /// Installs or replaces the selector for `policy`.
    fn update_selector(
        &mut self,
        policy: PolicyKey,
        selector: Selector,
        observer: &mut dyn MatchObserver,
    );

    /// Removes the selector for `policy`, stopping all of its matches.
    fn delete_selector(&mut self, policy: &PolicyKey, observer: &mut dyn MatchObserver);

    /// Applies an endpoint, profile-label or profile-tag update.
    ///
    /// Other updates are ignored.
    fn on_update(&mut self, update: &Update, observer: &mut dyn MatchObserver);
}
