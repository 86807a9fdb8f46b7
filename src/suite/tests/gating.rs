use super::*;

#[test]
fn gated_groups_do_not_execute_without_the_capability() {
    let (_temp, store) = host_fixture();

    let report = run_suite(&store, &minimal_config()).unwrap();

    for name in ["symlinks", "permissions", "timestamps", "atomic_rename"] {
        let group = group_named(&report, name);
        assert!(
            group
                .cases
                .iter()
                .all(|c| matches!(&c.outcome, CaseOutcome::Skipped { reason } if reason.contains("capability"))),
            "group {name} must be skipped when its capability is off:\n{report}"
        );
    }
}

#[test]
fn ungated_groups_execute_regardless_of_optional_capabilities() {
    let (_temp, store) = host_fixture();

    let report = run_suite(&store, &minimal_config()).unwrap();

    for name in ["file_ops", "dir_ops", "error_semantics"] {
        let group = group_named(&report, name);
        assert!(
            group.cases.iter().any(|c| c.outcome == CaseOutcome::Passed),
            "group {name} must execute:\n{report}"
        );
    }
}

#[cfg(unix)]
#[test]
fn gated_groups_execute_when_the_capability_is_claimed() {
    let (_temp, store) = host_fixture();
    let config = RunConfig::default(); // full POSIX feature set

    let report = run_suite(&store, &config).unwrap();

    for name in ["symlinks", "permissions", "timestamps", "atomic_rename"] {
        let group = group_named(&report, name);
        assert!(
            group.cases.iter().any(|c| c.outcome == CaseOutcome::Passed),
            "group {name} must execute when its capability is claimed:\n{report}"
        );
    }
}

#[test]
fn case_sensitivity_gate_follows_the_flag() {
    let (_temp, store) = host_fixture();
    let config = RunConfig {
        features: Features::default(),
        ..RunConfig::default()
    };

    let report = run_suite(&store, &config).unwrap();
    let group = group_named(&report, "case_sensitivity");
    assert!(
        group
            .cases
            .iter()
            .all(|c| matches!(c.outcome, CaseOutcome::Skipped { .. })),
        "case_sensitivity must not run with all capabilities off:\n{report}"
    );
}
