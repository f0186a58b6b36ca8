use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use policy_agent_core::{EndpointKey, ProfileId};

/// Records the profile IDs explicitly assigned to each endpoint.
#[derive(Debug, Default)]
pub struct EndpointProfiles {
    by_endpoint: HashMap<EndpointKey, Vec<ProfileId>>,
}

/// The change in an endpoint's profile assignment.
///
/// Both lists are free of duplicates and keep the order in which the IDs were assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileDiff {
    pub removed: Vec<ProfileId>,
    pub added: Vec<ProfileId>,
}

// === impl EndpointProfiles ===

impl EndpointProfiles {
    /// Replaces the endpoint's profile assignment, returning the IDs that were removed and added.
    ///
    /// Repeated IDs are recorded once. An empty assignment forgets the endpoint.
    pub fn update(&mut self, endpoint: &EndpointKey, profile_ids: &[ProfileId]) -> ProfileDiff {
        let current = difference(profile_ids, &[]);
        let prior = self
            .by_endpoint
            .get(endpoint)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let diff = ProfileDiff {
            removed: difference(prior, &current),
            added: difference(&current, prior),
        };

        if current.is_empty() {
            self.by_endpoint.remove(endpoint);
        } else {
            self.by_endpoint.insert(endpoint.clone(), current);
        }
        diff
    }

    pub fn get(&self, endpoint: &EndpointKey) -> Option<&[ProfileId]> {
        self.by_endpoint.get(endpoint).map(Vec::as_slice)
    }
}

/// Returns the IDs in `a` that are not in `b`.
fn difference(a: &[ProfileId], b: &[ProfileId]) -> Vec<ProfileId> {
    let mut seen = b.iter().collect::<HashSet<_>>();
    a.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
