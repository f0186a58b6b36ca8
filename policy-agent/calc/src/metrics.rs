use crate::{ActiveRulesCalculator, LabelIndex, UpdateError};
use policy_agent_core::{PolicyMatchListener, RuleScanner, Update};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Instruments an [`ActiveRulesCalculator`] with update counts and the size of its active set.
#[derive(Debug)]
pub struct UpdateMetrics<T> {
    inner: T,

    updates: Family<UpdateLabels, Counter>,
    invalid_selectors: Counter,
    active_policies: Gauge,
    active_profiles: Gauge,
    policy_matches: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UpdateLabels {
    kind: &'static str,
}

impl<T> UpdateMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let updates = Family::default();
        prom.register(
            "updates",
            "Count of updates processed, by resource kind",
            updates.clone(),
        );

        let invalid_selectors = Counter::default();
        prom.register(
            "invalid_selectors",
            "Count of policy updates rejected because of an invalid selector",
            invalid_selectors.clone(),
        );

        let active_policies = Gauge::default();
        prom.register(
            "active_policies",
            "Gauge of the number of policies that match a local endpoint",
            active_policies.clone(),
        );

        let active_profiles = Gauge::default();
        prom.register(
            "active_profiles",
            "Gauge of the number of profiles that are known and referenced by a local endpoint",
            active_profiles.clone(),
        );

        let policy_matches = Gauge::default();
        prom.register(
            "policy_matches",
            "Gauge of the number of policy-to-local-endpoint matches",
            policy_matches.clone(),
        );

        Self {
            inner,
            updates,
            invalid_selectors,
            active_policies,
            active_profiles,
            policy_matches,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<S, L, I> UpdateMetrics<ActiveRulesCalculator<S, L, I>>
where
    S: RuleScanner,
    L: PolicyMatchListener,
    I: LabelIndex,
{
    pub fn on_update(&mut self, update: &Update) -> Result<(), UpdateError> {
        self.updates
            .get_or_create(&UpdateLabels {
                kind: update.kind(),
            })
            .inc();

        let res = self.inner.on_update(update);
        if res.is_err() {
            self.invalid_selectors.inc();
        }

        // The calculator keeps these counts as it reports activity changes, so reading them
        // doesn't walk its indexes.
        self.active_policies
            .set(self.inner.active_policy_count() as i64);
        self.active_profiles
            .set(self.inner.active_profile_count() as i64);
        self.policy_matches
            .set(self.inner.policy_match_count() as i64);
        res
    }
}
