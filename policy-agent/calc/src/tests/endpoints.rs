use super::*;
use maplit::btreemap;

/// Deleting an endpoint releases both its profiles and its policy matches.
#[test]
fn delete_endpoint_releases_everything() {
    let mut test = TestConfig::default();
    test.apply(mk_profile_rules("pr1"));
    test.apply(mk_policy("p1", "role == 'web'"));
    test.apply(mk_workload("e1", &[("role", "web")], &["pr1"]));
    assert_eq!(
        test.take(),
        vec![
            profile_active("pr1"),
            policy_active("p1", "role == 'web'"),
            matched("p1", workload_key("e1")),
        ]
    );

    test.apply(delete_workload("e1"));
    assert_eq!(
        test.take(),
        vec![
            profile_inactive("pr1"),
            policy_inactive("p1"),
            match_stopped("p1", workload_key("e1")),
        ]
    );
    assert!(test.calc.endpoint_profile_ids(&workload_key("e1")).is_empty());
    assert_eq!(test.calc.active_policy_count(), 0);
    assert_eq!(test.calc.active_profile_count(), 0);

    // Deleting it again is a no-op.
    test.apply(delete_workload("e1"));
    assert_eq!(test.take(), vec![]);
}

/// Workload and host endpoints with the same name are distinct.
#[test]
fn workload_and_host_endpoints() {
    let mut test = TestConfig::default();
    test.apply(mk_policy("p1", "has(role)"));
    test.apply(mk_workload("eth0", &[("role", "web")], &[]));
    test.apply(mk_host("eth0", &[("role", "gw")], &[]));
    assert_eq!(
        test.take(),
        vec![
            policy_active("p1", "has(role)"),
            matched("p1", workload_key("eth0")),
            matched("p1", host_key("eth0")),
        ]
    );
    assert_eq!(test.calc.policy_match_count(), 2);

    test.apply(delete_workload("eth0"));
    assert_eq!(test.take(), vec![match_stopped("p1", workload_key("eth0"))]);
    assert!(test.calc.is_policy_active(&PolicyKey::named("p1")));
}

/// The calculator remembers each endpoint's profile IDs in the order they were given.
#[test]
fn endpoint_profile_ids_follow_updates() {
    let mut test = TestConfig::default();
    test.apply(mk_host("eth0", &[], &["b", "a", "b"]));
    assert_eq!(
        test.calc.endpoint_profile_ids(&host_key("eth0")),
        &[ProfileId::from("b"), ProfileId::from("a")]
    );

    test.apply(mk_host("eth0", &[], &["a"]));
    assert_eq!(
        test.calc.endpoint_profile_ids(&host_key("eth0")),
        &[ProfileId::from("a")]
    );
    // Neither profile's rules are known, so only the removal is reported.
    assert_eq!(test.take(), vec![profile_inactive("b")]);
}

/// An endpoint's profile changes are reported before the matches its new labels produce.
#[test]
fn profiles_reported_before_matches() {
    let mut test = TestConfig::default();
    test.apply(mk_profile_rules("pr1"));
    test.apply(mk_policy("p1", "all()"));
    test.apply(mk_workload("e1", &[], &["pr1"]));
    assert_eq!(
        test.take(),
        vec![
            profile_active("pr1"),
            policy_active("p1", "all()"),
            matched("p1", workload_key("e1")),
        ]
    );
}

/// Labels inherited from a profile can make a policy match.
#[test]
fn inherited_profile_labels() {
    let mut test = TestConfig::default();
    test.apply(mk_policy("p1", "env == 'prod'"));
    test.apply(mk_workload("e1", &[], &["pr1"]));
    assert_eq!(test.take(), vec![]);

    test.apply(Update::ProfileLabels {
        key: "pr1".into(),
        value: Some(btreemap! { "env".to_string() => "prod".to_string() }),
    });
    assert_eq!(
        test.take(),
        vec![
            policy_active("p1", "env == 'prod'"),
            matched("p1", workload_key("e1")),
        ]
    );

    // The endpoint's own labels win.
    test.apply(mk_workload("e1", &[("env", "dev")], &["pr1"]));
    assert_eq!(
        test.take(),
        vec![
            policy_inactive("p1"),
            match_stopped("p1", workload_key("e1")),
        ]
    );
}

/// Profile tags are inherited as labels without a value.
#[test]
fn inherited_profile_tags() {
    let mut test = TestConfig::default();
    test.apply(mk_policy("p1", "has(frontend)"));
    test.apply(mk_host("eth0", &[], &["pr1"]));
    test.apply(Update::ProfileTags {
        key: "pr1".into(),
        value: Some(vec!["frontend".to_string()]),
    });
    assert_eq!(
        test.take(),
        vec![
            policy_active("p1", "has(frontend)"),
            matched("p1", host_key("eth0")),
        ]
    );

    test.apply(Update::ProfileTags {
        key: "pr1".into(),
        value: None,
    });
    assert_eq!(
        test.take(),
        vec![
            policy_inactive("p1"),
            match_stopped("p1", host_key("eth0")),
        ]
    );
}

#[test]
fn unknown_update_is_ignored() {
    let mut test = TestConfig::default();
    test.apply(mk_workload("e1", &[], &[]));
    test.apply(Update::Unknown);
    assert_eq!(test.take(), vec![]);
}
