//! Baseline behavior suite.
//!
//! Drives a candidate store through capability-gated groups of
//! conformance checks and collects the outcomes into a [`RunReport`].
//! Every group works under a fresh, uniquely named sub-path of a per-run
//! root, so groups never interfere with each other and independent runs
//! can share a store. A failing case never aborts its siblings; only a
//! failure to create the per-run root is fatal, since nothing can be
//! verified without it.

use crate::errors::ErrorClass;
use crate::features::Features;
use crate::report::{GroupReport, RunReport};
use crate::resolve::{self, Resolution};
use crate::store::{NodeKind, OpenOptions, Store, StoreError};
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to create run root {root}: {source}")]
    CreateRoot { root: PathBuf, source: StoreError },
    #[error("failed to construct the wrapper under test: {0}")]
    WrapperFactory(StoreError),
}

/// Per-run configuration for the baseline suite.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Capabilities the candidate claims; gates the optional groups.
    pub features: Features,

    /// Store path under which the per-run root is created. Defaults to
    /// the store root.
    pub test_root: Option<PathBuf>,

    /// Keep the per-run root after the run instead of removing it.
    /// Useful for debugging.
    pub keep_artifacts: bool,

    /// Group names to skip regardless of capabilities, compared
    /// case-insensitively. Skipped groups are recorded as such.
    pub skip_groups: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            features: Features::default_posix(),
            test_root: None,
            keep_artifacts: false,
            skip_groups: Vec::new(),
        }
    }
}

impl RunConfig {
    fn skips(&self, group: &str) -> bool {
        self.skip_groups
            .iter()
            .any(|s| s.eq_ignore_ascii_case(group))
    }
}

trait CaseContext<T> {
    /// Converts a store failure into a case-failure detail string.
    fn ctx(self, what: &str) -> Result<T, String>;
}

impl<T> CaseContext<T> for Result<T, StoreError> {
    fn ctx(self, what: &str) -> Result<T, String> {
        self.map_err(|e| format!("{what}: {e}"))
    }
}

/// Asserts that an operation failed with the expected error class.
fn expect_class<T>(
    result: Result<T, StoreError>,
    want: ErrorClass,
    what: &str,
) -> Result<(), String> {
    match ErrorClass::of(&result) {
        Some(got) if ErrorClass::equivalent(got, want) => Ok(()),
        Some(got) => Err(format!("{what}: expected {want}, got {got}")),
        None => Err(format!("{what}: expected {want}, but the operation succeeded")),
    }
}

fn expect_content(got: &[u8], want: &[u8], what: &str) -> Result<(), String> {
    if got == want {
        Ok(())
    } else {
        Err(format!(
            "{what}: content mismatch: got {}, want {}",
            crate::util::hashing::payload_digest(got),
            crate::util::hashing::payload_digest(want),
        ))
    }
}

fn create_run_root(
    store: &dyn Store,
    config: &RunConfig,
    label: &str,
) -> Result<PathBuf, SetupError> {
    let base = config
        .test_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("/"));
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let root = base.join(format!("{label}_{nanos}"));

    store
        .mkdir_all(&root)
        .map_err(|source| SetupError::CreateRoot {
            root: root.clone(),
            source,
        })?;
    info!("run root {} on store {:?}", root.display(), store.name());
    Ok(root)
}

fn cleanup_run_root(store: &dyn Store, root: &Path, config: &RunConfig) {
    if config.keep_artifacts {
        info!("keeping test artifacts under {}", root.display());
        return;
    }
    if let Err(e) = store.remove_all(root) {
        warn!("failed to remove run root {}: {e}", root.display());
    }
}

/// Runs the full baseline suite against `store`.
pub fn run_suite(store: &dyn Store, config: &RunConfig) -> Result<RunReport, SetupError> {
    let root = create_run_root(store, config, "fsconform")?;
    let mut report = RunReport::new(format!("baseline suite ({})", store.name()));

    let features = &config.features;
    type Runner = fn(&dyn Store, &Path) -> GroupReport;
    let planned: &[(&str, Option<bool>, Runner)] = &[
        ("file_ops", None, file_ops),
        ("dir_ops", None, dir_ops),
        ("path_handling", None, path_handling),
        ("error_semantics", None, error_semantics),
        ("sub_store", None, sub_store_views),
        ("open_flag_matrix", None, open_flag_matrix),
        (
            "case_sensitivity",
            Some(features.case_sensitive),
            case_sensitivity,
        ),
        ("atomic_rename", Some(features.atomic_rename), atomic_rename),
        ("symlinks", Some(features.symlinks), symlink_semantics),
        ("permissions", Some(features.permissions), permissions),
        ("timestamps", Some(features.timestamps), timestamps),
    ];

    for (name, gate, runner) in planned {
        if config.skips(name) {
            report
                .groups
                .push(GroupReport::skipped(*name, "skipped by configuration"));
            continue;
        }
        if *gate == Some(false) {
            report
                .groups
                .push(GroupReport::skipped(*name, "capability not declared"));
            continue;
        }

        let group_root = root.join(name);
        match store.mkdir_all(&group_root) {
            Ok(()) => report.groups.push(runner(store, &group_root)),
            Err(e) => {
                let mut group = GroupReport::new(*name);
                group.record("setup", || Err(format!("failed to create group root: {e}")));
                report.groups.push(group);
            }
        }
    }

    cleanup_run_root(store, &root, config);
    Ok(report)
}

/// Runs the minimal smoke path: create, read back, remove, verify
/// absence. Much faster than the full suite; intended for sanity checks.
pub fn quick_check(store: &dyn Store, config: &RunConfig) -> Result<RunReport, SetupError> {
    let root = create_run_root(store, config, "fsconform_quick")?;
    let mut report = RunReport::new(format!("quick check ({})", store.name()));

    let mut group = GroupReport::new("quick_check");
    let path = root.join("quickcheck.txt");
    let content = b"quick check content";

    group.record("write_and_read_back", || {
        store.write_file(&path, content).ctx("write")?;
        let got = store.read_file(&path).ctx("read back")?;
        expect_content(&got, content, "read back")
    });
    group.record("remove", || store.remove(&path).ctx("remove"));
    group.record("gone_after_remove", || {
        expect_class(store.metadata(&path), ErrorClass::NotFound, "stat after remove")
    });

    report.groups.push(group);
    cleanup_run_root(store, &root, config);
    Ok(report)
}

fn file_ops(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("file_ops");

    group.record("create_and_read", || {
        let path = root.join("create_test.txt");
        let content = b"hello, world";

        let mut file = store.create(&path).ctx("create")?;
        file.write_all(content).map_err(|e| format!("write: {e}"))?;
        drop(file);

        let got = store.read_file(&path).ctx("reopen and read")?;
        expect_content(&got, content, "read back")
    });

    group.record("open_exclusive", || {
        let path = root.join("openfile_test.txt");
        let exclusive = OpenOptions::new().write(true).create(true).create_new(true);

        store.open(&path, &exclusive).ctx("exclusive create")?;
        expect_class(
            store.open(&path, &exclusive),
            ErrorClass::AlreadyExists,
            "exclusive create of an existing file",
        )
    });

    group.record("truncate", || {
        let path = root.join("truncate_test.txt");
        store.write_file(&path, b"hello, world").ctx("create")?;

        store.truncate(&path, 5).ctx("truncate to 5")?;

        let meta = store.metadata(&path).ctx("stat after truncate")?;
        if meta.len != 5 {
            return Err(format!("size after truncate: got {}, want 5", meta.len));
        }
        let got = store.read_file(&path).ctx("read after truncate")?;
        expect_content(&got, b"hello", "content after truncate")
    });

    group.record("remove", || {
        let path = root.join("remove_test.txt");
        store.write_file(&path, b"").ctx("create")?;

        store.remove(&path).ctx("remove")?;
        expect_class(store.metadata(&path), ErrorClass::NotFound, "stat after remove")
    });

    group.record("rename", || {
        let old = root.join("rename_old.txt");
        let new = root.join("rename_new.txt");
        let content = b"rename test content";

        store.write_file(&old, content).ctx("create")?;
        store.rename(&old, &new).ctx("rename")?;

        expect_class(
            store.metadata(&old),
            ErrorClass::NotFound,
            "stat of the old path",
        )?;
        let got = store.read_file(&new).ctx("read the new path")?;
        expect_content(&got, content, "content after rename")
    });

    group.record("stat", || {
        let path = root.join("stat_test.txt");
        let content = b"stat test";
        store.write_file(&path, content).ctx("create")?;

        let meta = store.metadata(&path).ctx("stat")?;
        if meta.kind != NodeKind::File {
            return Err(format!("kind: got {}, want file", meta.kind.describe()));
        }
        if meta.len != content.len() as u64 {
            return Err(format!("size: got {}, want {}", meta.len, content.len()));
        }
        Ok(())
    });

    group
}

fn dir_ops(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("dir_ops");

    group.record("mkdir", || {
        let path = root.join("mkdir_test");
        store.mkdir(&path).ctx("mkdir")?;

        let meta = store.metadata(&path).ctx("stat")?;
        if !meta.is_dir() {
            return Err(format!(
                "created path is a {}, want directory",
                meta.kind.describe()
            ));
        }
        Ok(())
    });

    group.record("mkdir_recursive", || {
        let path = root.join("x/y/z");
        store.mkdir_all(&path).ctx("mkdir_all")?;

        let meta = store.metadata(&path).ctx("stat")?;
        if !meta.is_dir() {
            return Err(format!(
                "created path is a {}, want directory",
                meta.kind.describe()
            ));
        }
        Ok(())
    });

    group.record("remove_recursive", || {
        let base = root.join("removeall_test");
        store.mkdir_all(&base.join("nested")).ctx("mkdir_all")?;
        store
            .write_file(&base.join("nested/file.txt"), b"x")
            .ctx("create nested file")?;

        store.remove_all(&base).ctx("remove_all")?;
        expect_class(
            store.metadata(&base),
            ErrorClass::NotFound,
            "stat after remove_all",
        )
    });

    group.record("list", || {
        let base = root.join("readdir_test");
        store.mkdir(&base).ctx("mkdir")?;
        for name in ["a.txt", "b.txt", "c.txt"] {
            store.write_file(&base.join(name), b"").ctx("create entry")?;
        }
        store.mkdir(&base.join("subdir")).ctx("mkdir subdir")?;

        let entries = store.read_dir(&base).ctx("read_dir")?;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        if names != ["a.txt", "b.txt", "c.txt", "subdir"] {
            return Err(format!("listing: got {names:?}"));
        }
        for entry in &entries {
            let want = if entry.name == "subdir" {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            if entry.kind != want {
                return Err(format!(
                    "entry {} listed as {}, want {}",
                    entry.name,
                    entry.kind.describe(),
                    want.describe()
                ));
            }
        }
        Ok(())
    });

    group.record("list_of_file_fails", || {
        let path = root.join("notadir.txt");
        store.write_file(&path, b"").ctx("create")?;
        expect_class(
            store.read_dir(&path),
            ErrorClass::NotADirectory,
            "read_dir of a file",
        )
    });

    group
}

fn path_handling(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("path_handling");

    group.record("dot_segments", || {
        let base = root.join("dotpaths");
        store.mkdir(&base).ctx("mkdir")?;

        let dotted = base.join(".").join("file.txt");
        store.write_file(&dotted, b"dotted").ctx("create with dot segment")?;

        let got = store.read_file(&base.join("file.txt")).ctx("read clean path")?;
        expect_content(&got, b"dotted", "read through clean path")
    });

    group.record("trailing_separator", || {
        let base = root.join("trailingslash");
        store.mkdir(&base).ctx("mkdir")?;

        let mut with_slash = base.as_os_str().to_os_string();
        with_slash.push("/");
        let meta = store
            .metadata(Path::new(&with_slash))
            .ctx("stat with trailing separator")?;
        if !meta.is_dir() {
            return Err("trailing-separator stat did not report a directory".to_string());
        }
        Ok(())
    });

    group.record("special_characters", || {
        let base = root.join("specialchars");
        store.mkdir(&base).ctx("mkdir")?;

        for name in [
            "spaces in name.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
        ] {
            let path = base.join(name);
            store.write_file(&path, b"x").ctx(&format!("create {name:?}"))?;
            store.metadata(&path).ctx(&format!("stat {name:?}"))?;
        }
        Ok(())
    });

    group.record("non_ascii_names", || {
        let base = root.join("unicode");
        store.mkdir(&base).ctx("mkdir")?;

        for name in ["日本語.txt", "émoji🎉.txt", "中文文件.txt"] {
            let path = base.join(name);
            store.write_file(&path, b"x").ctx(&format!("create {name:?}"))?;
            store.metadata(&path).ctx(&format!("stat {name:?}"))?;
        }
        Ok(())
    });

    group
}

fn error_semantics(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("error_semantics");

    group.record("not_found", || {
        let path = root.join("nonexistent");
        expect_class(store.metadata(&path), ErrorClass::NotFound, "stat")?;
        expect_class(
            store.open(&path, &OpenOptions::new().read(true)),
            ErrorClass::NotFound,
            "open",
        )
    });

    group.record("already_exists", || {
        let path = root.join("exist_test");
        store.mkdir(&path).ctx("mkdir")?;
        expect_class(
            store.mkdir(&path),
            ErrorClass::AlreadyExists,
            "mkdir of an existing directory",
        )
    });

    group.record("is_a_directory", || {
        let path = root.join("isdir_test");
        store.mkdir(&path).ctx("mkdir")?;
        expect_class(
            store.open(&path, &OpenOptions::new().write(true)),
            ErrorClass::IsADirectory,
            "open a directory for writing",
        )
    });

    group.record("not_a_directory", || {
        let path = root.join("notdir_test.txt");
        store.write_file(&path, b"").ctx("create")?;
        expect_class(
            store.metadata(&path.join("child")),
            ErrorClass::NotADirectory,
            "stat through a file",
        )?;
        expect_class(
            store.read_dir(&path),
            ErrorClass::NotADirectory,
            "read_dir of a file",
        )
    });

    group
}

fn sub_store_views(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("sub_store");

    group.record("read_through_sub_view", || {
        let base = root.join("sub_test");
        let content = b"nested file content";
        store.mkdir_all(&base.join("nested")).ctx("mkdir_all")?;
        store
            .write_file(&base.join("nested/file.txt"), content)
            .ctx("create nested file")?;

        let sub = store.sub_store(&base).ctx("sub_store")?;
        let got = sub
            .read_file(Path::new("/nested/file.txt"))
            .ctx("read through the sub view")?;
        expect_content(&got, content, "sub view content")
    });

    group.record("nested_sub_views", || {
        let base = root.join("nested_sub_test");
        let content = b"deep nested content";
        store.mkdir_all(&base.join("level1/level2")).ctx("mkdir_all")?;
        store
            .write_file(&base.join("level1/level2/deep.txt"), content)
            .ctx("create deep file")?;

        let sub1 = store.sub_store(&base).ctx("first sub_store")?;
        let sub2 = sub1
            .sub_store(Path::new("/level1"))
            .ctx("nested sub_store")?;
        let got = sub2
            .read_file(Path::new("/level2/deep.txt"))
            .ctx("read through the nested view")?;
        expect_content(&got, content, "nested sub view content")
    });

    group.record("sub_view_of_file_fails", || {
        let path = root.join("notadir.txt");
        store.write_file(&path, b"").ctx("create")?;
        expect_class(
            store.sub_store(&path).map(|_| ()),
            ErrorClass::NotADirectory,
            "sub_store of a file",
        )
    });

    group.record("sub_view_is_confined", || {
        let base = root.join("confined");
        store.mkdir(&base).ctx("mkdir")?;
        store
            .write_file(&root.join("outside.txt"), b"outside")
            .ctx("create sibling")?;

        let sub = store.sub_store(&base).ctx("sub_store")?;
        match sub.exists(Path::new("/../outside.txt")) {
            Ok(false) => Ok(()),
            Ok(true) => Err("a sibling of the view root is reachable through ..".to_string()),
            // An outright rejection of the escaping path is also conforming.
            Err(_) => Ok(()),
        }
    });

    group
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Precondition {
    Absent,
    File,
    Dir,
}

impl Precondition {
    fn label(&self) -> &'static str {
        match self {
            Precondition::Absent => "absent",
            Precondition::File => "file",
            Precondition::Dir => "dir",
        }
    }
}

/// The reference behavior model for `open`: POSIX `open(2)` semantics
/// plus the conventional host-library restriction that creation and
/// truncation flags require write access. `None` means the open must
/// succeed.
fn expected_open(pre: Precondition, opts: &OpenOptions) -> Option<ErrorClass> {
    if (opts.create || opts.create_new || opts.truncate) && !opts.write && !opts.append {
        return Some(ErrorClass::InvalidInput);
    }

    match pre {
        Precondition::Absent => {
            if opts.create || opts.create_new {
                None
            } else {
                Some(ErrorClass::NotFound)
            }
        }
        Precondition::File => {
            if opts.create_new {
                Some(ErrorClass::AlreadyExists)
            } else {
                None
            }
        }
        Precondition::Dir => {
            // O_EXCL is checked before the directory/access conflict.
            if opts.create_new {
                Some(ErrorClass::AlreadyExists)
            } else if opts.write || opts.append {
                Some(ErrorClass::IsADirectory)
            } else {
                None
            }
        }
    }
}

fn open_flag_matrix(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("open_flag_matrix");

    let combos: &[(&str, OpenOptions)] = &[
        ("read", OpenOptions::new().read(true)),
        ("write", OpenOptions::new().write(true)),
        ("read_write", OpenOptions::new().read(true).write(true)),
        ("append", OpenOptions::new().append(true)),
        ("create", OpenOptions::new().write(true).create(true)),
        (
            "create_exclusive",
            OpenOptions::new().write(true).create(true).create_new(true),
        ),
        (
            "create_truncate",
            OpenOptions::new().write(true).create(true).truncate(true),
        ),
        ("append_create", OpenOptions::new().append(true).create(true)),
        (
            "truncate_without_write",
            OpenOptions::new().read(true).truncate(true),
        ),
        (
            "create_without_write",
            OpenOptions::new().read(true).create(true),
        ),
    ];

    for (index, (combo_name, opts)) in combos.iter().enumerate() {
        for pre in [Precondition::Absent, Precondition::File, Precondition::Dir] {
            let case_name = format!("{}/{}", pre.label(), combo_name);
            let path = root.join(format!("matrix_{index:02}_{}", pre.label()));

            group.record(&case_name, || {
                match pre {
                    Precondition::Absent => {}
                    Precondition::File => {
                        store.write_file(&path, b"existing content").ctx("precondition")?
                    }
                    Precondition::Dir => store.mkdir(&path).ctx("precondition")?,
                }

                let want = expected_open(pre, opts);
                let got = ErrorClass::of(&store.open(&path, opts));
                match (want, got) {
                    (None, None) => Ok(()),
                    (Some(w), Some(g)) if ErrorClass::equivalent(w, g) => Ok(()),
                    (None, Some(g)) => Err(format!("expected success, open failed with {g}")),
                    (Some(w), None) => Err(format!("expected {w}, open succeeded")),
                    (Some(w), Some(g)) => Err(format!("expected {w}, got {g}")),
                }
            });

            // Fresh fixture for the next combo sharing this path.
            let _ = store.remove_all(&path);
        }
    }

    group
}

fn case_sensitivity(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("case_sensitivity");

    group.record("distinct_names", || {
        let upper = root.join("CaseTest.txt");
        let lower = root.join("casetest.txt");
        store.write_file(&upper, b"upper").ctx("create upper")?;
        store.write_file(&lower, b"lower").ctx("create lower")?;

        let got_upper = store.read_file(&upper).ctx("read upper")?;
        let got_lower = store.read_file(&lower).ctx("read lower")?;
        expect_content(&got_upper, b"upper", "upper-case name")?;
        expect_content(&got_lower, b"lower", "lower-case name")?;

        let entries = store.read_dir(root).ctx("read_dir")?;
        let count = entries
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case("casetest.txt"))
            .count();
        if count != 2 {
            return Err(format!(
                "expected two distinct case variants in the listing, found {count}"
            ));
        }
        Ok(())
    });

    group
}

fn atomic_rename(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("atomic_rename");

    group.record("rename_replaces_existing", || {
        let from = root.join("replace_from.txt");
        let to = root.join("replace_to.txt");
        store.write_file(&from, b"new content").ctx("create source")?;
        store.write_file(&to, b"old content").ctx("create target")?;

        store.rename(&from, &to).ctx("rename over existing")?;

        expect_class(
            store.metadata(&from),
            ErrorClass::NotFound,
            "stat of the old path",
        )?;
        let got = store.read_file(&to).ctx("read the target")?;
        expect_content(&got, b"new content", "target content")
    });

    group
}

fn symlink_semantics(store: &dyn Store, root: &Path) -> GroupReport {
    let Some(links) = store.symlinks() else {
        return GroupReport::skipped("symlinks", "store does not expose symlink operations");
    };
    let mut group = GroupReport::new("symlinks");

    group.record("create_and_readlink", || {
        let target = root.join("symlink_target.txt");
        let link = root.join("symlink_link");
        store.write_file(&target, b"symlink target content").ctx("create target")?;

        links.symlink(&target, &link).ctx("symlink")?;
        resolve::verify_link_node(links, &link, &target).map_err(|m| m.to_string())
    });

    group.record("stat_follows_lstat_does_not", || {
        let target = root.join("lstat_target.txt");
        let link = root.join("lstat_link");
        store.write_file(&target, b"x").ctx("create target")?;
        links.symlink(&target, &link).ctx("symlink")?;

        let followed = store.metadata(&link).ctx("stat through the link")?;
        if followed.kind == NodeKind::Symlink {
            return Err("stat reported a symlink; it must follow to the target".to_string());
        }
        let unfollowed = links.lstat(&link).ctx("lstat of the link")?;
        if unfollowed.kind != NodeKind::Symlink {
            return Err(format!(
                "lstat reported a {}, want the link itself",
                unfollowed.kind.describe()
            ));
        }
        Ok(())
    });

    group.record("parent_relative_target", || {
        let subdir = root.join("rel_sub");
        let target = root.join("rel_target.txt");
        let link = subdir.join("rel_link");
        store.mkdir_all(&subdir).ctx("mkdir")?;
        store.write_file(&target, b"relative target").ctx("create target")?;

        links
            .symlink(Path::new("../rel_target.txt"), &link)
            .ctx("symlink with a relative target")?;

        resolve::verify_link_node(links, &link, Path::new("../rel_target.txt"))
            .map_err(|m| m.to_string())?;

        // The resolution base must be the link's directory, so this must
        // land on rel_target.txt next to the subdir.
        let resolution = resolve::verify_follow_matches(store, links, &link)
            .map_err(|m| m.to_string())?;
        match resolution {
            Resolution::Terminal { kind: NodeKind::File, .. } => {}
            other => return Err(format!("expected a file terminal, resolved to {other}")),
        }
        let got = store.read_file(&link).ctx("read through the link")?;
        expect_content(&got, b"relative target", "content through the link")
    });

    group.record("same_directory_target", || {
        let target = root.join("same_dir_target.txt");
        let link = root.join("same_dir_link");
        store.write_file(&target, b"same dir target").ctx("create target")?;

        links
            .symlink(Path::new("same_dir_target.txt"), &link)
            .ctx("symlink with a bare-name target")?;

        resolve::verify_link_node(links, &link, Path::new("same_dir_target.txt"))
            .map_err(|m| m.to_string())?;
        let meta = store.metadata(&link).ctx("stat through the link")?;
        if meta.kind != NodeKind::File {
            return Err(format!("resolved to a {}, want file", meta.kind.describe()));
        }
        Ok(())
    });

    group.record("link_to_directory", || {
        let target = root.join("link_target_dir");
        let link = root.join("dir_link");
        store.mkdir(&target).ctx("mkdir target")?;
        store
            .write_file(&target.join("file.txt"), b"content")
            .ctx("create file in target")?;
        links.symlink(&target, &link).ctx("symlink")?;

        let followed = store.metadata(&link).ctx("stat through the link")?;
        if !followed.is_dir() {
            return Err(format!(
                "stat through the link reported a {}, want directory",
                followed.kind.describe()
            ));
        }
        let unfollowed = links.lstat(&link).ctx("lstat")?;
        if unfollowed.kind != NodeKind::Symlink {
            return Err("lstat must report the link itself".to_string());
        }
        let got = store.read_file(&link.join("file.txt")).ctx("read through the link")?;
        expect_content(&got, b"content", "content through the directory link")
    });

    group.record("broken_link", || {
        let missing = root.join("nonexistent_target");
        let link = root.join("broken_link");
        links.symlink(&missing, &link).ctx("symlink to a missing target")?;

        resolve::verify_link_node(links, &link, &missing).map_err(|m| m.to_string())?;

        // Dereferencing must fail, and the failure belongs to the target.
        let resolution =
            resolve::verify_follow_matches(store, links, &link).map_err(|m| m.to_string())?;
        match resolution {
            Resolution::Failed { class: ErrorClass::NotFound } => Ok(()),
            other => Err(format!("expected a not-found failure, resolved to {other}")),
        }
    });

    group.record("link_over_existing_fails", || {
        let target = root.join("exists_target.txt");
        let link = root.join("exists_link");
        store.write_file(&target, b"").ctx("create target")?;
        links.symlink(&target, &link).ctx("first symlink")?;

        expect_class(
            links.symlink(&target, &link),
            ErrorClass::AlreadyExists,
            "symlink over an existing link",
        )
    });

    group.record("self_referential_link", || {
        let link = root.join("self_ref");
        links.symlink(&link, &link).ctx("self-referential symlink")?;

        resolve::verify_link_node(links, &link, &link).map_err(|m| m.to_string())?;
        let resolution =
            resolve::verify_follow_matches(store, links, &link).map_err(|m| m.to_string())?;
        match resolution {
            Resolution::Failed { class: ErrorClass::TooManyLinks } => Ok(()),
            other => Err(format!("expected too-many-links, resolved to {other}")),
        }
    });

    group.record("two_node_cycle", || {
        let a = root.join("cycle_a");
        let b = root.join("cycle_b");
        links.symlink(&b, &a).ctx("symlink a -> b")?;
        links.symlink(&a, &b).ctx("symlink b -> a")?;

        resolve::verify_link_node(links, &a, &b).map_err(|m| m.to_string())?;
        resolve::verify_link_node(links, &b, &a).map_err(|m| m.to_string())?;

        for entry in [&a, &b] {
            let resolution = resolve::verify_follow_matches(store, links, entry)
                .map_err(|m| m.to_string())?;
            if resolution
                != (Resolution::Failed { class: ErrorClass::TooManyLinks })
            {
                return Err(format!(
                    "cycle entered at {}: expected too-many-links, resolved to {resolution}",
                    entry.display()
                ));
            }
        }
        Ok(())
    });

    group.record("chained_links", || {
        let target = root.join("chain_target.txt");
        let link1 = root.join("chain_link1");
        let link2 = root.join("chain_link2");
        let content = b"chained symlink content";
        store.write_file(&target, content).ctx("create target")?;
        links.symlink(&target, &link1).ctx("symlink link1")?;
        links.symlink(&link1, &link2).ctx("symlink link2")?;

        // The non-following view of link2 sees exactly one step: link1.
        resolve::verify_link_node(links, &link2, &link1).map_err(|m| m.to_string())?;

        let resolution = resolve::verify_follow_matches(store, links, &link2)
            .map_err(|m| m.to_string())?;
        match resolution {
            Resolution::Terminal { kind: NodeKind::File, .. } => {}
            other => return Err(format!("expected a file terminal, resolved to {other}")),
        }
        let got = store.read_file(&link2).ctx("read through the chain")?;
        expect_content(&got, content, "content through the chain")
    });

    group.record("remove_link_keeps_target", || {
        let target = root.join("remove_target.txt");
        let link = root.join("remove_link");
        store
            .write_file(&target, b"should not be deleted")
            .ctx("create target")?;
        links.symlink(&target, &link).ctx("symlink")?;

        store.remove(&link).ctx("remove the link")?;

        expect_class(
            links.lstat(&link),
            ErrorClass::NotFound,
            "lstat of the removed link",
        )?;
        let got = store.read_file(&target).ctx("read the target")?;
        expect_content(&got, b"should not be deleted", "target after link removal")
    });

    group.record("rename_preserves_linkness", || {
        let target = root.join("rename_sym_target.txt");
        let link = root.join("rename_sym_link");
        let new_link = root.join("rename_sym_link_new");
        store.write_file(&target, b"x").ctx("create target")?;
        links.symlink(&target, &link).ctx("symlink")?;

        store.rename(&link, &new_link).ctx("rename the link")?;

        expect_class(
            links.lstat(&link),
            ErrorClass::NotFound,
            "lstat of the old link path",
        )?;
        resolve::verify_link_node(links, &new_link, &target).map_err(|m| m.to_string())?;
        store.metadata(&target).ctx("target after renaming the link")?;
        Ok(())
    });

    group.record("write_through_link", || {
        let target = root.join("write_through_target.txt");
        let link = root.join("write_through_link");
        let content = b"written through symlink";
        store.write_file(&target, b"").ctx("create target")?;
        links.symlink(&target, &link).ctx("symlink")?;

        let mut file = store
            .open(&link, &OpenOptions::new().write(true))
            .ctx("open through the link")?;
        file.write_all(content).map_err(|e| format!("write: {e}"))?;
        drop(file);

        let got = store.read_file(&target).ctx("read the target directly")?;
        expect_content(&got, content, "write must land on the target")
    });

    group
}

fn permissions(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("permissions");

    group.record("chmod_round_trip", || {
        let path = root.join("chmod_test.txt");
        store.write_file(&path, b"").ctx("create")?;

        store.chmod(&path, 0o600).ctx("chmod")?;

        let meta = store.metadata(&path).ctx("stat")?;
        match meta.mode {
            Some(mode) if mode & 0o777 == 0o600 => Ok(()),
            Some(mode) => Err(format!("mode after chmod: got {:o}, want 600", mode & 0o777)),
            None => Err("store claims permissions but reports no mode bits".to_string()),
        }
    });

    group
}

fn timestamps(store: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("timestamps");

    group.record("set_times_round_trip", || {
        let path = root.join("chtimes_test.txt");
        store.write_file(&path, b"").ctx("create")?;

        // 2020-01-01T00:00:00Z and 2021-06-15T12:00:00Z.
        let atime = UNIX_EPOCH + Duration::from_secs(1_577_836_800);
        let mtime = UNIX_EPOCH + Duration::from_secs(1_623_758_400);
        store.set_times(&path, atime, mtime).ctx("set_times")?;

        let meta = store.metadata(&path).ctx("stat")?;
        let Some(modified) = meta.modified else {
            return Err("store claims timestamps but reports no mtime".to_string());
        };
        // One second of tolerance for stores with coarse time resolution.
        let distance = modified
            .duration_since(mtime)
            .unwrap_or_else(|e| e.duration());
        if distance > Duration::from_secs(1) {
            return Err(format!(
                "mtime after set_times is off by {}s",
                distance.as_secs_f64()
            ));
        }
        Ok(())
    });

    group
}

#[cfg(test)]
mod tests;
