//! Path and symlink resolution verifier.
//!
//! The harness carries its own model of link-chain resolution, built only
//! from the candidate's non-following primitives (lstat and readlink).
//! Comparing the model's expectation against what the candidate's
//! following operations (stat, open) actually observe is what turns
//! "resolution" into something that can be verified rather than trusted.
//!
//! Resolution works on store-absolute paths: a relative link target is
//! resolved against the directory containing the link, never against any
//! ambient working directory, and `..` clamps at the store root.

use crate::errors::ErrorClass;
use crate::store::{NodeKind, Store, SymlinkOps};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Upper bound on symlink hops in one resolution, matching the
/// conventional POSIX limit. Revisiting an already-seen link short-circuits
/// before the bound; both conditions report the same outcome, so an
/// over-long finite chain and a genuine cycle are indistinguishable by
/// design.
pub const MAX_LINK_HOPS: usize = 40;

/// Outcome of resolving a path for a following operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolution reached a non-link node (which is all a following
    /// operation can ever observe).
    Terminal { path: PathBuf, kind: NodeKind },
    /// Resolution failed before reaching a terminal node.
    Failed { class: ErrorClass },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Terminal { path, kind } => {
                write!(f, "{} at {}", kind.describe(), path.display())
            }
            Resolution::Failed { class } => write!(f, "failure ({class})"),
        }
    }
}

/// A disagreement between the resolution model and the candidate.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub path: PathBuf,
    pub detail: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.detail)
    }
}

impl Mismatch {
    fn new(path: &Path, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Normalizes a path into store-absolute form: leading root, no `.` or
/// `..` components, `..` clamped at the root.
pub fn lexical_absolute(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for comp in path.components() {
        match comp {
            Component::Prefix(_) => {}
            Component::RootDir => out = PathBuf::from("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                if out != Path::new("/") {
                    out.pop();
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Resolves `path` the way a following operation must, using only the
/// candidate's non-following primitives.
pub fn resolve_following(links: &dyn SymlinkOps, path: &Path) -> Resolution {
    let mut current = lexical_absolute(path);
    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut hops = 0usize;

    loop {
        let meta = match links.lstat(&current) {
            Ok(meta) => meta,
            Err(err) => {
                return Resolution::Failed {
                    class: ErrorClass::classify(&err),
                };
            }
        };

        if meta.kind != NodeKind::Symlink {
            return Resolution::Terminal {
                path: current,
                kind: meta.kind,
            };
        }

        hops += 1;
        if hops > MAX_LINK_HOPS || !visited.insert(current.clone()) {
            debug!("link hop limit exhausted at {}", current.display());
            return Resolution::Failed {
                class: ErrorClass::TooManyLinks,
            };
        }

        let target = match links.read_link(&current) {
            Ok(target) => target,
            Err(err) => {
                return Resolution::Failed {
                    class: ErrorClass::classify(&err),
                };
            }
        };

        current = if target.is_absolute() {
            lexical_absolute(&target)
        } else {
            // Relative targets resolve against the directory holding the
            // link, not against the link's own path.
            let base = current.parent().unwrap_or_else(|| Path::new("/"));
            lexical_absolute(&base.join(target))
        };
    }
}

/// Checks that the candidate's following stat agrees with the model
/// resolution of `path`. Returns the model resolution so callers can make
/// further assertions about the terminal node.
pub fn verify_follow_matches(
    store: &dyn Store,
    links: &dyn SymlinkOps,
    path: &Path,
) -> Result<Resolution, Mismatch> {
    let expected = resolve_following(links, path);
    let observed = store.metadata(path);

    match (&expected, &observed) {
        (Resolution::Terminal { kind, .. }, Ok(meta)) => {
            if meta.kind == NodeKind::Symlink {
                Err(Mismatch::new(
                    path,
                    "stat reported a symlink; a following operation must resolve to the target",
                ))
            } else if meta.kind != *kind {
                Err(Mismatch::new(
                    path,
                    format!(
                        "resolution expects a {}, stat observed a {}",
                        kind.describe(),
                        meta.kind.describe()
                    ),
                ))
            } else {
                Ok(expected.clone())
            }
        }
        (Resolution::Failed { class }, Err(err)) => {
            let observed_class = ErrorClass::classify(err);
            if ErrorClass::equivalent(*class, observed_class) {
                Ok(expected.clone())
            } else {
                Err(Mismatch::new(
                    path,
                    format!("resolution expects {class}, stat failed with {observed_class}"),
                ))
            }
        }
        (Resolution::Terminal { .. }, Err(err)) => Err(Mismatch::new(
            path,
            format!("resolution expects {expected}, but stat failed: {err}"),
        )),
        (Resolution::Failed { class }, Ok(meta)) => Err(Mismatch::new(
            path,
            format!(
                "resolution expects {class}, but stat observed a {}",
                meta.kind.describe()
            ),
        )),
    }
}

/// Checks that `path` is a link node as a non-following operation must see
/// it: lstat terminates after exactly one step and reports the symlink
/// itself, and readlink returns the raw target verbatim. Valid for broken
/// links and for links participating in cycles.
pub fn verify_link_node(
    links: &dyn SymlinkOps,
    path: &Path,
    expected_target: &Path,
) -> Result<(), Mismatch> {
    let meta = links
        .lstat(path)
        .map_err(|e| Mismatch::new(path, format!("lstat on the link itself failed: {e}")))?;
    if meta.kind != NodeKind::Symlink {
        return Err(Mismatch::new(
            path,
            format!("lstat reported a {}, expected a symlink", meta.kind.describe()),
        ));
    }

    let target = links
        .read_link(path)
        .map_err(|e| Mismatch::new(path, format!("readlink failed: {e}")))?;
    if target != expected_target {
        return Err(Mismatch::new(
            path,
            format!(
                "readlink returned {}, expected the verbatim target {}",
                target.display(),
                expected_target.display()
            ),
        ));
    }

    Ok(())
}

/// Convenience: classifies a following stat of `path`, for asserting the
/// failure class of paths that must not resolve.
pub fn follow_class(store: &dyn Store, path: &Path) -> Option<ErrorClass> {
    ErrorClass::of(&store.metadata(path))
}
