//! Fuzz property harness.
//!
//! Drives the store primitives under adversarial, corpus-seeded input.
//! The generator is deliberately framework-free: a seed corpus plus a
//! mutation-based production function over a seeded RNG, so runs are
//! reproducible from a single `u64` and the harness can be rehosted under
//! any execution framework. The portable contract is the invariant set:
//! no input may panic the candidate (errors are fine), and operations
//! that succeed on well-formed input must uphold the stronger round-trip
//! and visibility properties.
//!
//! When an invariant breaks, the failing input is shrunk deterministically
//! by re-running the violated check on smaller candidates, and the report
//! carries both the original and the minimized input.

use crate::resolve;
use crate::store::{NodeKind, OpenOptions, Store};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct FuzzConfig {
    /// Seed for the mutation RNG; two runs with the same seed produce
    /// the same inputs.
    pub seed: u64,
    /// Inputs produced per driver.
    pub iterations: u32,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_f00d,
            iterations: 256,
        }
    }
}

/// A seed corpus: the interesting starting points mutation works from.
pub struct Corpus {
    seeds: Vec<Vec<u8>>,
}

impl Corpus {
    pub fn new(seeds: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let seeds: Vec<Vec<u8>> = seeds.into_iter().collect();
        assert!(!seeds.is_empty(), "a corpus needs at least one seed");
        Self { seeds }
    }

    /// File and directory names worth starting from.
    pub fn names() -> Self {
        Self::new([
            b"test.txt".to_vec(),
            b"nested/path/file.txt".to_vec(),
            b".hidden".to_vec(),
            b"spaces in name.txt".to_vec(),
            b"file.multiple.dots.txt".to_vec(),
            b"UPPERCASE.TXT".to_vec(),
            b"mixedCase.Txt".to_vec(),
            "日本語.txt".as_bytes().to_vec(),
            "émoji🎉.txt".as_bytes().to_vec(),
            vec![b'a'; 255],
        ])
    }

    /// Byte payloads, including the empty payload and chunk-boundary
    /// sizes.
    pub fn payloads() -> Self {
        Self::new([
            b"hello".to_vec(),
            Vec::new(),
            vec![0x00],
            vec![0xFF],
            vec![0x00, 0xFF, 0x00, 0xFF],
            vec![0u8; 4096],
            vec![0u8; 4097],
            "日本語テスト".as_bytes().to_vec(),
            vec![b'x'; 1 << 16],
        ])
    }

    /// `old|new` rename pairs.
    pub fn rename_pairs() -> Self {
        Self::new([
            b"old.txt|new.txt".to_vec(),
            b"a|b".to_vec(),
            b"file.txt|subdir/file.txt".to_vec(),
            "日本語.txt|renamed.txt".as_bytes().to_vec(),
            b"source|target with spaces".to_vec(),
        ])
    }

    /// Traversal sequences that try to climb out of the test root.
    pub fn traversals() -> Self {
        Self::new([
            b"../escape".to_vec(),
            b"../../etc/passwd".to_vec(),
            b"subdir/../../../escape".to_vec(),
            b"....//....//escape".to_vec(),
            b"..\\..\\escape".to_vec(),
            b"subdir/./../../escape".to_vec(),
            [b"../".repeat(100), b"escape".to_vec()].concat(),
        ])
    }

    /// Open-flag encodings understood by the open-flags driver.
    pub fn flag_bytes() -> Self {
        Self::new([
            vec![FLAG_READ],
            vec![FLAG_WRITE],
            vec![FLAG_READ | FLAG_WRITE],
            vec![FLAG_WRITE | FLAG_CREATE],
            vec![FLAG_WRITE | FLAG_CREATE | FLAG_CREATE_NEW],
            vec![FLAG_WRITE | FLAG_CREATE | FLAG_TRUNCATE],
            vec![FLAG_APPEND],
            vec![FLAG_APPEND | FLAG_CREATE],
            vec![FLAG_READ | FLAG_TRUNCATE],
        ])
    }
}

/// Produces the next adversarial input. Implementations are free to be
/// corpus-driven, mutation-based, replayed from a file, or anything else;
/// the drivers only consume bytes.
pub trait InputSource {
    fn next_input(&mut self) -> Vec<u8>;
}

/// The default source: picks a corpus seed and applies a small random
/// number of byte-level mutations.
pub struct SeededMutations {
    corpus: Corpus,
    rng: StdRng,
}

impl SeededMutations {
    pub fn new(corpus: Corpus, seed: u64) -> Self {
        Self {
            corpus,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn mutate(&mut self, input: &mut Vec<u8>) {
        match self.rng.gen_range(0..5u8) {
            0 if !input.is_empty() => {
                let index = self.rng.gen_range(0..input.len());
                input[index] = self.rng.r#gen();
            }
            1 => {
                let index = self.rng.gen_range(0..=input.len());
                input.insert(index, self.rng.r#gen());
            }
            2 if !input.is_empty() => {
                let index = self.rng.gen_range(0..input.len());
                input.remove(index);
            }
            3 if !input.is_empty() => {
                let start = self.rng.gen_range(0..input.len());
                let end = self.rng.gen_range(start..input.len());
                let slice = input[start..=end].to_vec();
                input.extend_from_slice(&slice);
            }
            4 if !input.is_empty() => {
                let keep = self.rng.gen_range(0..input.len());
                input.truncate(keep);
            }
            _ => {}
        }
    }
}

impl InputSource for SeededMutations {
    fn next_input(&mut self) -> Vec<u8> {
        let seed_index = self.rng.gen_range(0..self.corpus.seeds.len());
        let mut input = self.corpus.seeds[seed_index].clone();
        for _ in 0..self.rng.gen_range(0..4u8) {
            self.mutate(&mut input);
        }
        input
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzFailure {
    /// Human-readable rendering of the input that broke the invariant.
    pub input: String,
    /// The same invariant violation, shrunk as far as it reproduces.
    pub minimized: String,
    pub detail: String,
}

#[derive(Debug)]
pub struct FuzzReport {
    pub driver: &'static str,
    pub iterations: u32,
    pub executed: u32,
    pub skipped: u32,
    pub failure: Option<FuzzFailure>,
}

impl FuzzReport {
    pub fn is_clean(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for FuzzReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "{}: ok ({} checked, {} skipped of {})",
                self.driver, self.executed, self.skipped, self.iterations
            ),
            Some(failure) => write!(
                f,
                "{}: FAIL: {}\n  input:     {}\n  minimized: {}",
                self.driver, failure.detail, failure.input, failure.minimized
            ),
        }
    }
}

enum StepOutcome {
    Checked,
    Skipped,
    Violated(String),
}

fn render_input(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.len() <= 128 => format!("{text:?}"),
        Ok(text) => {
            let mut cut = 128;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{:?}... ({} bytes)", &text[..cut], bytes.len())
        }
        Err(_) => {
            let shown: Vec<String> = bytes.iter().take(32).map(|b| format!("{b:02x}")).collect();
            format!("0x{} ({} bytes)", shown.join(""), bytes.len())
        }
    }
}

/// Budgeted chunk-removal shrinking: repeatedly drop spans of the input
/// while the violation still reproduces.
fn minimize(input: &[u8], mut violates: impl FnMut(&[u8]) -> bool) -> Vec<u8> {
    const BUDGET: usize = 256;

    let mut current = input.to_vec();
    let mut attempts = 0usize;
    let mut progressed = true;

    while progressed && attempts < BUDGET {
        progressed = false;
        let mut chunk = current.len() / 2;
        while chunk > 0 && attempts < BUDGET {
            let mut start = 0;
            while start < current.len() && attempts < BUDGET {
                let end = (start + chunk).min(current.len());
                let mut candidate = Vec::with_capacity(current.len() - (end - start));
                candidate.extend_from_slice(&current[..start]);
                candidate.extend_from_slice(&current[end..]);
                attempts += 1;
                if violates(&candidate) {
                    current = candidate;
                    progressed = true;
                } else {
                    start = end;
                }
            }
            chunk /= 2;
        }
    }

    current
}

/// Shared driver loop: produce inputs, run the step with panic
/// containment, and shrink the first violation.
fn drive(
    driver: &'static str,
    iterations: u32,
    source: &mut dyn InputSource,
    mut step: impl FnMut(&[u8]) -> StepOutcome,
) -> FuzzReport {
    let mut executed = 0u32;
    let mut skipped = 0u32;
    let mut failure = None;

    for _ in 0..iterations {
        let input = source.next_input();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step(&input)));

        let detail = match outcome {
            Ok(StepOutcome::Checked) => {
                executed += 1;
                continue;
            }
            Ok(StepOutcome::Skipped) => {
                skipped += 1;
                continue;
            }
            Ok(StepOutcome::Violated(detail)) => detail,
            Err(_) => "input caused a panic in the candidate".to_string(),
        };

        executed += 1;
        debug!("{driver}: violation on {}: {detail}", render_input(&input));
        let minimized = minimize(&input, |candidate| {
            matches!(
                panic::catch_unwind(AssertUnwindSafe(|| step(candidate))),
                Err(_) | Ok(StepOutcome::Violated(_))
            )
        });

        failure = Some(FuzzFailure {
            input: render_input(&input),
            minimized: render_input(&minimized),
            detail,
        });
        break;
    }

    info!(
        "{driver}: {executed} checked, {skipped} skipped, {}",
        if failure.is_some() { "1 violation" } else { "no violations" }
    );
    FuzzReport {
        driver,
        iterations,
        executed,
        skipped,
        failure,
    }
}

/// Rejects inputs that must never reach the store: invalid encodings,
/// NUL bytes, empty names, and bare dot components.
fn sanitize_name(bytes: &[u8]) -> Option<&str> {
    let name = std::str::from_utf8(bytes).ok()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    if name.contains('\0') {
        return None;
    }
    if name.len() > 255 {
        return None;
    }
    Some(name)
}

/// Joins fuzz input beneath `base` without letting a leading separator
/// restart the path at the store root.
fn join_under(base: &Path, input: &str) -> PathBuf {
    base.join(input.trim_start_matches('/'))
}

pub fn fuzz_create(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_create");

    drive("fuzz_create", iterations, source, |bytes| {
        let Some(name) = sanitize_name(bytes) else {
            return StepOutcome::Skipped;
        };
        let path = join_under(&base, name);

        let parent = path.parent().unwrap_or(&base).to_path_buf();
        if store.mkdir_all(&parent).is_err() {
            // Parent creation may legitimately fail for hostile names.
            return StepOutcome::Checked;
        }

        let file = match store.create(&path) {
            Ok(file) => file,
            Err(_) => return StepOutcome::Checked,
        };
        drop(file);

        let outcome = match store.metadata(&path) {
            Err(e) => StepOutcome::Violated(format!(
                "create succeeded but stat failed for {}: {e}",
                path.display()
            )),
            Ok(meta) if meta.kind != NodeKind::File => StepOutcome::Violated(format!(
                "created a file but stat reports a {}",
                meta.kind.describe()
            )),
            Ok(_) => StepOutcome::Checked,
        };
        let _ = store.remove(&path);
        outcome
    })
}

pub fn fuzz_read_write(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_rw");
    let mut counter = 0u32;

    drive("fuzz_read_write", iterations, source, |payload| {
        counter += 1;
        if store.mkdir_all(&base).is_err() {
            return StepOutcome::Checked;
        }
        let path = base.join(format!("payload_{}.bin", counter % 26));

        if store.write_file(&path, payload).is_err() {
            // A refused write is acceptable; a half-applied one is caught
            // below on the next successful round trip.
            let _ = store.remove(&path);
            return StepOutcome::Checked;
        }

        let outcome = match store.read_file(&path) {
            Err(e) => StepOutcome::Violated(format!("read after successful write failed: {e}")),
            Ok(got) if got != payload => StepOutcome::Violated(format!(
                "round trip mismatch: wrote {}, read {}",
                crate::util::hashing::payload_digest(payload),
                crate::util::hashing::payload_digest(&got)
            )),
            Ok(_) => StepOutcome::Checked,
        };
        let _ = store.remove(&path);
        outcome
    })
}

pub fn fuzz_rename(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_rename");
    let content = b"rename test content";

    drive("fuzz_rename", iterations, source, |bytes| {
        let Some(separator) = bytes.iter().position(|b| *b == b'|') else {
            return StepOutcome::Skipped;
        };
        let (Some(old_name), Some(new_name)) = (
            sanitize_name(&bytes[..separator]),
            sanitize_name(&bytes[separator + 1..]),
        ) else {
            return StepOutcome::Skipped;
        };

        let old_path = join_under(&base, old_name);
        let new_path = join_under(&base, new_name);

        let old_parent = old_path.parent().unwrap_or(&base).to_path_buf();
        let new_parent = new_path.parent().unwrap_or(&base).to_path_buf();
        if store.mkdir_all(&old_parent).is_err() || store.mkdir_all(&new_parent).is_err() {
            return StepOutcome::Checked;
        }
        if store.write_file(&old_path, content).is_err() {
            return StepOutcome::Checked;
        }

        if store.rename(&old_path, &new_path).is_err() {
            let _ = store.remove(&old_path);
            return StepOutcome::Checked;
        }

        let mut outcome = StepOutcome::Checked;
        // Careful with pairs that normalize to the same node: renaming a
        // path onto itself leaves the entry in place, which is fine.
        let same_node = resolve::lexical_absolute(&old_path) == resolve::lexical_absolute(&new_path);
        if !same_node && store.exists(&old_path).unwrap_or(false) {
            outcome = StepOutcome::Violated(format!(
                "old path {} still exists after rename",
                old_path.display()
            ));
        } else {
            match store.read_file(&new_path) {
                Err(e) => {
                    outcome = StepOutcome::Violated(format!(
                        "renamed entry is unreadable at {}: {e}",
                        new_path.display()
                    ));
                }
                Ok(got) if got != content => {
                    outcome =
                        StepOutcome::Violated("content changed across a rename".to_string());
                }
                Ok(_) => {}
            }
        }

        let _ = store.remove(&new_path);
        let _ = store.remove(&old_path);
        outcome
    })
}

pub fn fuzz_mkdir(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_mkdir");

    drive("fuzz_mkdir", iterations, source, |bytes| {
        let Some(name) = sanitize_name(bytes) else {
            return StepOutcome::Skipped;
        };
        let path = join_under(&base, name);

        if store.mkdir_all(&path).is_err() {
            return StepOutcome::Checked;
        }

        let outcome = match store.metadata(&path) {
            Err(e) => StepOutcome::Violated(format!("mkdir_all succeeded but stat failed: {e}")),
            Ok(meta) if !meta.is_dir() => StepOutcome::Violated(format!(
                "created path is a {}, not a directory",
                meta.kind.describe()
            )),
            Ok(_) => StepOutcome::Checked,
        };
        let _ = store.remove_all(&path);
        outcome
    })
}

pub fn fuzz_path_traversal(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_traversal");
    let run_root = resolve::lexical_absolute(root);

    drive("fuzz_path_traversal", iterations, source, |bytes| {
        let Some(input) = sanitize_name(bytes) else {
            return StepOutcome::Skipped;
        };
        let _ = store.mkdir_all(&base);
        let path = join_under(&base, input);
        let resolved = resolve::lexical_absolute(&path);
        let escapes = !resolved.starts_with(&run_root);

        // None of these may panic; errors are acceptable outcomes.
        let _ = store.metadata(&path);
        let _ = store.open(&path, &OpenOptions::new().read(true));
        let mkdir_ok = store.mkdir_all(&path).is_ok();

        let outcome = if mkdir_ok && escapes {
            // The mutation took effect somewhere. A confined store must
            // be able to see it inside its own namespace at the
            // normalized location; anything else means the write landed
            // outside the sandbox.
            match store.metadata(&resolved) {
                Ok(_) => StepOutcome::Checked,
                Err(_) => StepOutcome::Violated(format!(
                    "mkdir of escaping path {input:?} succeeded but the entry is not visible \
                     inside the store namespace"
                )),
            }
        } else {
            StepOutcome::Checked
        };

        // Only clean up nodes that are certainly ours; an escaping path
        // may have normalized onto shared ancestors of the run root.
        if mkdir_ok && !escapes {
            let _ = store.remove_all(&path);
        }
        outcome
    })
}

const FLAG_READ: u8 = 1 << 0;
const FLAG_WRITE: u8 = 1 << 1;
const FLAG_APPEND: u8 = 1 << 2;
const FLAG_TRUNCATE: u8 = 1 << 3;
const FLAG_CREATE: u8 = 1 << 4;
const FLAG_CREATE_NEW: u8 = 1 << 5;

fn options_from_byte(bits: u8) -> OpenOptions {
    OpenOptions::new()
        .read(bits & FLAG_READ != 0)
        .write(bits & FLAG_WRITE != 0)
        .append(bits & FLAG_APPEND != 0)
        .truncate(bits & FLAG_TRUNCATE != 0)
        .create(bits & FLAG_CREATE != 0)
        .create_new(bits & FLAG_CREATE_NEW != 0)
}

pub fn fuzz_open_flags(
    store: &dyn Store,
    root: &Path,
    source: &mut dyn InputSource,
    iterations: u32,
) -> FuzzReport {
    let base = root.join("fuzz_flags");
    let mut counter = 0u32;

    drive("fuzz_open_flags", iterations, source, |bytes| {
        let Some(bits) = bytes.first().copied() else {
            return StepOutcome::Skipped;
        };
        counter += 1;
        if store.mkdir_all(&base).is_err() {
            return StepOutcome::Checked;
        }
        let path = base.join(format!("flags_{}.txt", counter % 26));

        let precreated = counter % 2 == 0;
        if precreated && store.write_file(&path, b"existing content").is_err() {
            return StepOutcome::Checked;
        }

        let opts = options_from_byte(bits);
        let outcome = match store.open(&path, &opts) {
            Err(_) => StepOutcome::Checked,
            Ok(mut file) => {
                if opts.create_new && precreated {
                    StepOutcome::Violated(
                        "exclusive create succeeded over an existing file".to_string(),
                    )
                } else {
                    use std::io::{Read, Write};
                    if opts.write || opts.append {
                        let _ = file.write(b"test");
                    }
                    if opts.read {
                        let mut buf = [0u8; 16];
                        let _ = file.read(&mut buf);
                    }
                    StepOutcome::Checked
                }
            }
        };

        let _ = store.remove(&path);
        outcome
    })
}

/// Runs every driver with per-driver corpora and seeds derived from the
/// configured one.
pub fn run_all(store: &dyn Store, root: &Path, config: &FuzzConfig) -> Vec<FuzzReport> {
    let iterations = config.iterations;
    vec![
        fuzz_create(
            store,
            root,
            &mut SeededMutations::new(Corpus::names(), config.seed ^ 0x01),
            iterations,
        ),
        fuzz_read_write(
            store,
            root,
            &mut SeededMutations::new(Corpus::payloads(), config.seed ^ 0x02),
            iterations,
        ),
        fuzz_rename(
            store,
            root,
            &mut SeededMutations::new(Corpus::rename_pairs(), config.seed ^ 0x03),
            iterations,
        ),
        fuzz_mkdir(
            store,
            root,
            &mut SeededMutations::new(Corpus::names(), config.seed ^ 0x04),
            iterations,
        ),
        fuzz_path_traversal(
            store,
            root,
            &mut SeededMutations::new(Corpus::traversals(), config.seed ^ 0x05),
            iterations,
        ),
        fuzz_open_flags(
            store,
            root,
            &mut SeededMutations::new(Corpus::flag_bytes(), config.seed ^ 0x06),
            iterations,
        ),
    ]
}
