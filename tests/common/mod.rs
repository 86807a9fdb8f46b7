use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::path::Path;
use std::process::Output;

pub fn fsconform_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("fsconform");
    cmd.arg("-C").arg(cwd);
    cmd
}

// Each integration test file is compiled as its own crate. Some crates only
// use `fsconform_cmd`, so these helpers are intentionally unused there.
#[allow(dead_code)]
pub fn run_output(cwd: &Path, args: &[&str]) -> Output {
    let mut cmd = fsconform_cmd(cwd);
    cmd.arg("run").args(args);
    cmd.output().expect("failed to run `fsconform run`")
}

#[allow(dead_code)]
pub fn extract_fingerprint(stdout: &[u8]) -> String {
    let output = std::str::from_utf8(stdout).expect("stdout should be UTF-8");
    output
        .lines()
        .find_map(|line| line.strip_prefix("Fingerprint: "))
        .expect("fingerprint not found in output")
        .to_string()
}
