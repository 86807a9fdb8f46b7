//! Differential wrapper verifier.
//!
//! Validates a transformation layer (compression, encryption, access
//! control, ...) built on top of a base store. The wrapper's *external*
//! contract is what gets checked: when the contract declares a data
//! transform, the base store's raw bytes are deliberately never
//! inspected, because the wrapper is free to hold any representation as
//! long as callers get their bytes back.

use crate::errors::ErrorClass;
use crate::report::{GroupReport, RunReport};
use crate::store::{OpenOptions, Store, StoreError};
use crate::suite::{RunConfig, SetupError};
use crate::util::hashing::payload_digest;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Declares which invariants a wrapper under test must uphold.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContract {
    /// The wrapper transforms file contents; the base store's bytes may
    /// differ from the logical content.
    pub transforms_data: bool,

    /// The wrapper intentionally diverges on metadata (sizes, modes,
    /// times); metadata is not compared against the base.
    pub transforms_meta: bool,

    /// The wrapper blocks every mutating operation.
    pub read_only: bool,
}

/// Verifies a wrapper produced by `factory` over `base` against its
/// declared contract. The factory failing is a setup error: nothing can
/// be verified without the wrapper.
pub fn verify_wrapper<F>(
    factory: F,
    base: &dyn Store,
    contract: &TransformContract,
    config: &RunConfig,
) -> Result<RunReport, SetupError>
where
    F: FnOnce(&dyn Store) -> Result<Box<dyn Store>, StoreError>,
{
    let wrapper = factory(base).map_err(SetupError::WrapperFactory)?;
    let wrapper = wrapper.as_ref();

    // A read-only wrapper cannot create its own run root; it is prepared
    // on the base store instead, which the run orchestrator owns anyway.
    let base_root = config
        .test_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("/"));
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let root = base_root.join(format!("fsconform_wrapper_{nanos}"));
    base.mkdir_all(&root)
        .map_err(|source| SetupError::CreateRoot {
            root: root.clone(),
            source,
        })?;
    info!(
        "wrapper run root {} (wrapper {:?} over base {:?})",
        root.display(),
        wrapper.name(),
        base.name()
    );

    let mut report = RunReport::new(format!(
        "wrapper verification ({} over {})",
        wrapper.name(),
        base.name()
    ));

    if contract.read_only {
        report.groups.push(write_blocking(wrapper, &root));
    } else {
        report.groups.push(passthrough(wrapper, &root));
        report.groups.push(data_integrity(wrapper, &root));
        report.groups.push(metadata_view(wrapper, base, contract, &root));
    }

    if contract.transforms_data && !contract.read_only {
        report.groups.push(transform_round_trip(wrapper, &root));
    }

    if !config.keep_artifacts {
        if let Err(e) = base.remove_all(&root) {
            warn!("failed to remove wrapper run root {}: {e}", root.display());
        }
    } else {
        info!("keeping wrapper artifacts under {}", root.display());
    }

    Ok(report)
}

fn passthrough(wrapper: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("passthrough");

    group.record("create_read_stat_remove", || {
        let path = root.join("passthrough.txt");
        let content = b"passthrough test content";

        wrapper
            .write_file(&path, content)
            .map_err(|e| format!("create through the wrapper: {e}"))?;

        let got = wrapper
            .read_file(&path)
            .map_err(|e| format!("read through the wrapper: {e}"))?;
        if got != content {
            return Err(format!(
                "content mismatch: got {}, want {}",
                payload_digest(&got),
                payload_digest(content)
            ));
        }

        let meta = wrapper
            .metadata(&path)
            .map_err(|e| format!("stat through the wrapper: {e}"))?;
        if meta.is_dir() {
            return Err("file stats as a directory through the wrapper".to_string());
        }

        wrapper
            .remove(&path)
            .map_err(|e| format!("remove through the wrapper: {e}"))?;
        Ok(())
    });

    group.record("directory_round_trip", || {
        let dir = root.join("passthrough_dir");
        wrapper
            .mkdir(&dir)
            .map_err(|e| format!("mkdir through the wrapper: {e}"))?;
        let meta = wrapper
            .metadata(&dir)
            .map_err(|e| format!("stat through the wrapper: {e}"))?;
        if !meta.is_dir() {
            return Err("created directory does not stat as a directory".to_string());
        }
        wrapper
            .remove(&dir)
            .map_err(|e| format!("remove through the wrapper: {e}"))?;
        Ok(())
    });

    group
}

fn integrity_payloads() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("empty", Vec::new()),
        ("small", b"hello".to_vec()),
        ("binary", vec![0x00, 0xFF, 0x00, 0xFF]),
        ("multi_byte_text", "日本語テスト🎉".as_bytes().to_vec()),
        ("large", vec![b'x'; 1 << 16]),
    ]
}

fn data_integrity(wrapper: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("data_integrity");

    for (name, payload) in integrity_payloads() {
        group.record(name, || {
            let path = root.join(format!("integrity_{name}.bin"));

            wrapper
                .write_file(&path, &payload)
                .map_err(|e| format!("write: {e}"))?;
            let got = wrapper.read_file(&path).map_err(|e| format!("read: {e}"))?;
            let _ = wrapper.remove(&path);

            if got != payload {
                return Err(format!(
                    "round trip mismatch: wrote {}, read {}",
                    payload_digest(&payload),
                    payload_digest(&got)
                ));
            }
            Ok(())
        });
    }

    group
}

fn metadata_view(
    wrapper: &dyn Store,
    base: &dyn Store,
    contract: &TransformContract,
    root: &Path,
) -> GroupReport {
    let mut group = GroupReport::new("metadata");

    group.record("logical_size_through_wrapper", || {
        let path = root.join("meta_size.bin");
        let content = b"sized payload for the wrapper";

        wrapper
            .write_file(&path, content)
            .map_err(|e| format!("write: {e}"))?;
        let meta = wrapper
            .metadata(&path)
            .map_err(|e| format!("stat through the wrapper: {e}"))?;
        if meta.len != content.len() as u64 {
            return Err(format!(
                "wrapper reports size {}, logical content is {} bytes",
                meta.len,
                content.len()
            ));
        }
        Ok(())
    });

    if contract.transforms_meta || contract.transforms_data {
        group.skip(
            "matches_base_metadata",
            "wrapper declares divergent metadata or data representation",
        );
    } else {
        group.record("matches_base_metadata", || {
            let path = root.join("meta_base.bin");
            let content = b"same bytes on both sides";

            wrapper
                .write_file(&path, content)
                .map_err(|e| format!("write: {e}"))?;
            let through = wrapper
                .metadata(&path)
                .map_err(|e| format!("stat through the wrapper: {e}"))?;
            let beneath = base
                .metadata(&path)
                .map_err(|e| format!("stat on the base store: {e}"))?;
            if through.kind != beneath.kind || through.len != beneath.len {
                return Err(format!(
                    "wrapper and base disagree: {} of {} bytes vs {} of {} bytes",
                    through.kind.describe(),
                    through.len,
                    beneath.kind.describe(),
                    beneath.len
                ));
            }
            Ok(())
        });
    }

    group
}

fn write_blocking(wrapper: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("write_blocking");

    group.record("create_is_rejected", || {
        let path = root.join("writeblock.txt");
        let result = wrapper.open(
            &path,
            &OpenOptions::new().write(true).create(true),
        );
        if result.is_ok() {
            return Err("create through a read-only wrapper succeeded".to_string());
        }
        match wrapper.exists(&path) {
            Ok(false) => Ok(()),
            Ok(true) => Err("rejected create left a visible entry behind".to_string()),
            Err(e) => Err(format!("existence check after rejected create: {e}")),
        }
    });

    group.record("mkdir_is_rejected", || {
        let path = root.join("newdir");
        if wrapper.mkdir(&path).is_ok() {
            return Err("mkdir through a read-only wrapper succeeded".to_string());
        }
        match wrapper.exists(&path) {
            Ok(false) => Ok(()),
            Ok(true) => Err("rejected mkdir left a visible entry behind".to_string()),
            Err(e) => Err(format!("existence check after rejected mkdir: {e}")),
        }
    });

    group.record("remove_is_rejected", || {
        // The run root exists on the base, so removing it is a genuine
        // mutation attempt with something to lose.
        if wrapper.remove_all(root).is_ok() {
            return Err("remove through a read-only wrapper succeeded".to_string());
        }
        match wrapper.exists(root) {
            Ok(true) => Ok(()),
            Ok(false) => Err("rejected remove still deleted the entry".to_string()),
            Err(e) => Err(format!("existence check after rejected remove: {e}")),
        }
    });

    group.record("rejections_classify_as_permission_outcomes", || {
        let path = root.join("classify.txt");
        let result = wrapper.open(&path, &OpenOptions::new().write(true).create(true));
        match ErrorClass::of(&result) {
            Some(ErrorClass::PermissionDenied) => Ok(()),
            Some(other) => Err(format!(
                "write rejection classified as {other}, want permission-denied"
            )),
            None => Err("write through a read-only wrapper succeeded".to_string()),
        }
    });

    group
}

/// Chunk-boundary payload sizes: one byte either side of a typical 4 KiB
/// block, and a larger structured payload that spans many chunks.
fn boundary_sizes() -> [usize; 4] {
    [4095, 4096, 4097, 64 * 1024]
}

fn transform_round_trip(wrapper: &dyn Store, root: &Path) -> GroupReport {
    let mut group = GroupReport::new("transform_round_trip");

    group.record("structured_payload", || {
        let path = root.join("transform.bin");
        let payload: Vec<u8> = b"compressible data pattern "
            .iter()
            .copied()
            .cycle()
            .take(26 * 1000)
            .collect();

        wrapper
            .write_file(&path, &payload)
            .map_err(|e| format!("write: {e}"))?;
        let got = wrapper.read_file(&path).map_err(|e| format!("read: {e}"))?;
        let _ = wrapper.remove(&path);

        if got != payload {
            return Err(format!(
                "round trip mismatch: wrote {}, read {}",
                payload_digest(&payload),
                payload_digest(&got)
            ));
        }
        Ok(())
    });

    for size in boundary_sizes() {
        group.record(&format!("boundary_{size}"), || {
            let path = root.join(format!("boundary_{size}.bin"));
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

            wrapper
                .write_file(&path, &payload)
                .map_err(|e| format!("write: {e}"))?;
            let got = wrapper.read_file(&path).map_err(|e| format!("read: {e}"))?;
            let _ = wrapper.remove(&path);

            if got != payload {
                return Err(format!(
                    "round trip mismatch at {size} bytes: wrote {}, read {}",
                    payload_digest(&payload),
                    payload_digest(&got)
                ));
            }
            Ok(())
        });
    }

    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostStore;
    use crate::testutil::{ReadOnlyStore, XorStore};
    use tempfile::TempDir;

    fn host() -> (TempDir, HostStore) {
        let temp = TempDir::new().unwrap();
        let store = HostStore::new(temp.path()).unwrap();
        (temp, store)
    }

    #[test]
    fn transforming_wrapper_passes_its_contract() {
        let (temp, base) = host();
        let contract = TransformContract {
            transforms_data: true,
            ..TransformContract::default()
        };

        let report = verify_wrapper(
            |_| Ok(Box::new(XorStore::new(Box::new(HostStore::new(temp.path()).unwrap()), 0x5A))),
            &base,
            &contract,
            &RunConfig::default(),
        )
        .unwrap();

        assert!(report.is_clean(), "unexpected failures:\n{report}");
        assert!(report.groups.iter().any(|g| g.name == "transform_round_trip"));
    }

    #[test]
    fn transforming_wrapper_stores_different_base_bytes() {
        // Not part of the verifier contract (opacity forbids it there),
        // but the fixture itself should actually transform.
        let (temp, base) = host();
        let wrapper = XorStore::new(Box::new(HostStore::new(temp.path()).unwrap()), 0x5A);

        let path = std::path::Path::new("/masked.bin");
        wrapper.write_file(path, b"plain text").unwrap();

        let raw = base.read_file(path).unwrap();
        assert_ne!(raw, b"plain text");
        assert_eq!(wrapper.read_file(path).unwrap(), b"plain text");
    }

    #[test]
    fn read_only_wrapper_passes_write_blocking() {
        let (temp, base) = host();
        let contract = TransformContract {
            read_only: true,
            ..TransformContract::default()
        };

        let report = verify_wrapper(
            |_| Ok(Box::new(ReadOnlyStore::new(Box::new(HostStore::new(temp.path()).unwrap())))),
            &base,
            &contract,
            &RunConfig::default(),
        )
        .unwrap();

        assert!(report.is_clean(), "unexpected failures:\n{report}");
        let names: Vec<&str> = report.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["write_blocking"]);
    }

    #[test]
    fn identity_wrapper_passes_metadata_comparison() {
        let (temp, base) = host();
        let contract = TransformContract::default();

        let report = verify_wrapper(
            |_| Ok(Box::new(HostStore::new(temp.path()).unwrap())),
            &base,
            &contract,
            &RunConfig::default(),
        )
        .unwrap();

        assert!(report.is_clean(), "unexpected failures:\n{report}");
    }

    #[test]
    fn a_corrupting_wrapper_is_caught() {
        let (temp, base) = host();
        let contract = TransformContract {
            transforms_data: true,
            ..TransformContract::default()
        };

        let report = verify_wrapper(
            |_| {
                let inner = HostStore::new(temp.path()).unwrap();
                Ok(Box::new(CorruptReads::new(Box::new(inner))))
            },
            &base,
            &contract,
            &RunConfig::default(),
        )
        .unwrap();

        assert!(!report.is_clean());
        let failing: Vec<&str> = report
            .groups
            .iter()
            .filter(|g| g.failed_cases().next().is_some())
            .map(|g| g.name.as_str())
            .collect();
        assert!(failing.contains(&"data_integrity"), "failing: {failing:?}");
    }

    #[test]
    fn factory_failure_is_a_setup_error() {
        let (_temp, base) = host();
        let result = verify_wrapper(
            |_| Err(crate::store::StoreError::Unsupported("no wrapper today")),
            &base,
            &TransformContract::default(),
            &RunConfig::default(),
        );
        assert!(matches!(result, Err(SetupError::WrapperFactory(_))));
    }

    /// Flips the first byte of every read, leaving writes alone.
    struct CorruptReads {
        inner: Box<dyn Store>,
    }

    impl CorruptReads {
        fn new(inner: Box<dyn Store>) -> Self {
            Self { inner }
        }
    }

    struct CorruptFile {
        inner: Box<dyn crate::store::StoreFile>,
        corrupted: bool,
    }

    impl std::io::Read for CorruptFile {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            if n > 0 && !self.corrupted {
                buf[0] ^= 0xFF;
                self.corrupted = true;
            }
            Ok(n)
        }
    }

    impl std::io::Write for CorruptFile {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl std::io::Seek for CorruptFile {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl crate::store::StoreFile for CorruptFile {
        fn metadata(&self) -> Result<crate::store::Metadata, StoreError> {
            self.inner.metadata()
        }

        fn set_len(&mut self, len: u64) -> Result<(), StoreError> {
            self.inner.set_len(len)
        }
    }

    impl Store for CorruptReads {
        fn name(&self) -> &str {
            "corrupt-reads"
        }

        fn open(
            &self,
            path: &std::path::Path,
            opts: &OpenOptions,
        ) -> Result<Box<dyn crate::store::StoreFile>, StoreError> {
            let inner = self.inner.open(path, opts)?;
            Ok(Box::new(CorruptFile {
                inner,
                corrupted: false,
            }))
        }

        fn metadata(&self, path: &std::path::Path) -> Result<crate::store::Metadata, StoreError> {
            self.inner.metadata(path)
        }

        fn read_dir(
            &self,
            path: &std::path::Path,
        ) -> Result<Vec<crate::store::DirEntry>, StoreError> {
            self.inner.read_dir(path)
        }

        fn mkdir(&self, path: &std::path::Path) -> Result<(), StoreError> {
            self.inner.mkdir(path)
        }

        fn mkdir_all(&self, path: &std::path::Path) -> Result<(), StoreError> {
            self.inner.mkdir_all(path)
        }

        fn remove(&self, path: &std::path::Path) -> Result<(), StoreError> {
            self.inner.remove(path)
        }

        fn remove_all(&self, path: &std::path::Path) -> Result<(), StoreError> {
            self.inner.remove_all(path)
        }

        fn rename(
            &self,
            from: &std::path::Path,
            to: &std::path::Path,
        ) -> Result<(), StoreError> {
            self.inner.rename(from, to)
        }

        fn truncate(&self, path: &std::path::Path, len: u64) -> Result<(), StoreError> {
            self.inner.truncate(path, len)
        }

        fn chmod(&self, path: &std::path::Path, mode: u32) -> Result<(), StoreError> {
            self.inner.chmod(path, mode)
        }

        fn set_times(
            &self,
            path: &std::path::Path,
            atime: std::time::SystemTime,
            mtime: std::time::SystemTime,
        ) -> Result<(), StoreError> {
            self.inner.set_times(path, atime, mtime)
        }

        fn sub_store(&self, path: &std::path::Path) -> Result<Box<dyn Store>, StoreError> {
            self.inner.sub_store(path)
        }
    }
}
