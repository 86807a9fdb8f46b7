use super::*;
use crate::host::HostStore;
use crate::report::{CaseOutcome, RunReport};
use tempfile::TempDir;

fn host_fixture() -> (TempDir, HostStore) {
    let temp = TempDir::new().unwrap();
    let store = HostStore::new(temp.path()).unwrap();
    (temp, store)
}

fn group_named<'a>(report: &'a RunReport, name: &str) -> &'a crate::report::GroupReport {
    report
        .groups
        .iter()
        .find(|g| g.name == name)
        .unwrap_or_else(|| panic!("missing group {name} in:\n{report}"))
}

fn minimal_config() -> RunConfig {
    RunConfig {
        features: Features::minimal(),
        ..RunConfig::default()
    }
}

mod gating;
