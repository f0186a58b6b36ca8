use crate::{
    calc::{metrics::UpdateMetrics, ActiveRulesCalculator, LabelIndex},
    core::{PolicyMatchListener, RuleScanner, Update},
    LocalEndpointFilter,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Feeds updates to the calculator one at a time, in the order they were received.
///
/// Readiness is signaled once the calculator has caught up with its input for the first time.
pub(crate) async fn process<S, L, I>(
    mut updates: mpsc::Receiver<Update>,
    filter: LocalEndpointFilter,
    mut calc: UpdateMetrics<ActiveRulesCalculator<S, L, I>>,
    ready: watch::Sender<bool>,
) -> UpdateMetrics<ActiveRulesCalculator<S, L, I>>
where
    S: RuleScanner,
    L: PolicyMatchListener,
    I: LabelIndex,
{
    loop {
        let update = match updates.try_recv() {
            Ok(update) => update,
            Err(mpsc::error::TryRecvError::Empty) => {
                mark_ready(&ready);
                match updates.recv().await {
                    Some(update) => update,
                    None => break,
                }
            }
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        };

        if !filter.accepts(&update) {
            debug!(kind = update.kind(), "Ignoring update for a remote endpoint");
            continue;
        }
        if let Err(error) = calc.on_update(&update) {
            warn!(%error, "Invalid update");
        }
    }

    mark_ready(&ready);
    info!(
        policies = calc.inner().active_policy_count(),
        profiles = calc.inner().active_profile_count(),
        "Updates exhausted"
    );
    calc
}

fn mark_ready(ready: &watch::Sender<bool>) {
    if !ready.send_replace(true) {
        info!("Caught up with updates");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            HostEndpoint, HostEndpointKey, Policy, PolicyKey, ProfileId, ProfileRules,
            WorkloadEndpoint, WorkloadEndpointKey,
        },
        ActiveSet, EndpointMatchCounts,
    };
    use maplit::btreemap;
    use prometheus_client::registry::Registry;

    fn workload(hostname: &str, name: &str) -> Update {
        Update::WorkloadEndpoint {
            key: WorkloadEndpointKey::new(hostname, "k8s", name, "eth0"),
            value: Some(WorkloadEndpoint {
                labels: btreemap! { "app".to_string() => name.to_string() },
                profile_ids: vec![ProfileId::from("pr1")],
                ..Default::default()
            }),
        }
    }

    fn policy(name: &str, selector: &str) -> Update {
        Update::Policy {
            key: PolicyKey::named(name),
            value: Some(Policy {
                selector: selector.to_string(),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn processes_local_updates() {
        let active = ActiveSet::default();
        let counts = EndpointMatchCounts::default();
        let mut prom = Registry::default();
        let calc = UpdateMetrics::register(
            ActiveRulesCalculator::new(active.clone(), counts.clone()),
            prom.sub_registry_with_prefix("calc"),
        );

        let (tx, rx) = mpsc::channel(16);
        let (ready_tx, ready_rx) = watch::channel(false);
        for update in [
            policy("web", "app == 'web'"),
            policy("db", "app == 'db'"),
            policy("broken", "app =="),
            Update::ProfileRules {
                key: "pr1".into(),
                value: Some(ProfileRules::default()),
            },
            workload("node-0", "web"),
            workload("node-1", "db"),
            Update::HostEndpoint {
                key: HostEndpointKey::new("node-0", "eth0"),
                value: Some(HostEndpoint {
                    labels: btreemap! { "app".to_string() => "db".to_string() },
                    ..Default::default()
                }),
            },
        ] {
            tx.send(update).await.unwrap();
        }
        drop(tx);

        let calc = process(rx, LocalEndpointFilter::new("node-0"), calc, ready_tx).await;
        assert!(*ready_rx.borrow());

        assert_eq!(
            active.policy_keys(),
            vec![PolicyKey::named("db"), PolicyKey::named("web")]
        );
        assert_eq!(active.profile_ids(), vec![ProfileId::from("pr1")]);
        assert_eq!(counts.endpoints(), 2);
        assert_eq!(
            calc.inner().invalid_policies().collect::<Vec<_>>(),
            vec![&PolicyKey::named("broken")]
        );
    }

    #[tokio::test]
    async fn ready_when_idle() {
        let (tx, rx) = mpsc::channel(1);
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let calc = UpdateMetrics::register(
            ActiveRulesCalculator::new(ActiveSet::default(), EndpointMatchCounts::default()),
            &mut Registry::default(),
        );
        let task = tokio::spawn(process(rx, LocalEndpointFilter::any_host(), calc, ready_tx));

        ready_rx.changed().await.unwrap();
        assert!(*ready_rx.borrow());
        assert!(!task.is_finished());

        drop(tx);
        task.await.unwrap();
    }
}
