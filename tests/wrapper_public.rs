//! Wrapper verification through the public API, with a wrapper defined
//! entirely outside the crate the way a real transformation layer would
//! be.

use fsconform::host::HostStore;
use fsconform::store::{
    DirEntry, Metadata, OpenOptions, Store, StoreError, StoreFile, SymlinkOps,
};
use fsconform::suite::RunConfig;
use fsconform::wrapper::{TransformContract, verify_wrapper};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;
use tempfile::TempDir;

/// Adds a fixed offset to every stored byte; a stand-in for a real
/// content transform such as compression or encryption.
struct ShiftStore {
    inner: Box<dyn Store>,
}

struct ShiftFile {
    inner: Box<dyn StoreFile>,
}

impl Read for ShiftFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        for byte in &mut buf[..n] {
            *byte = byte.wrapping_sub(3);
        }
        Ok(n)
    }
}

impl Write for ShiftFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let shifted: Vec<u8> = buf.iter().map(|b| b.wrapping_add(3)).collect();
        self.inner.write(&shifted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for ShiftFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl StoreFile for ShiftFile {
    fn metadata(&self) -> Result<Metadata, StoreError> {
        self.inner.metadata()
    }

    fn set_len(&mut self, len: u64) -> Result<(), StoreError> {
        self.inner.set_len(len)
    }
}

impl Store for ShiftStore {
    fn name(&self) -> &str {
        "shift"
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError> {
        let inner = self.inner.open(path, opts)?;
        Ok(Box::new(ShiftFile { inner }))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, StoreError> {
        self.inner.metadata(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, StoreError> {
        self.inner.read_dir(path)
    }

    fn mkdir(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.mkdir(path)
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.mkdir_all(path)
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.remove(path)
    }

    fn remove_all(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.remove_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        self.inner.rename(from, to)
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError> {
        self.inner.truncate(path, len)
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<(), StoreError> {
        self.inner.chmod(path, mode)
    }

    fn set_times(
        &self,
        path: &Path,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> Result<(), StoreError> {
        self.inner.set_times(path, atime, mtime)
    }

    fn sub_store(&self, path: &Path) -> Result<Box<dyn Store>, StoreError> {
        let inner = self.inner.sub_store(path)?;
        Ok(Box::new(ShiftStore { inner }))
    }

    fn symlinks(&self) -> Option<&dyn SymlinkOps> {
        self.inner.symlinks()
    }
}

#[test]
fn shifting_wrapper_satisfies_a_transforming_contract() {
    let temp = TempDir::new().unwrap();
    let base = HostStore::new(temp.path()).unwrap();
    let contract = TransformContract {
        transforms_data: true,
        ..TransformContract::default()
    };

    let report = verify_wrapper(
        |_| {
            Ok(Box::new(ShiftStore {
                inner: Box::new(HostStore::new(temp.path()).unwrap()),
            }))
        },
        &base,
        &contract,
        &RunConfig::default(),
    )
    .unwrap();

    assert!(report.is_clean(), "unexpected failures:\n{report}");
}

#[test]
fn opacity_means_base_bytes_may_differ() {
    let temp = TempDir::new().unwrap();
    let base = HostStore::new(temp.path()).unwrap();
    let wrapper = ShiftStore {
        inner: Box::new(HostStore::new(temp.path()).unwrap()),
    };

    wrapper
        .write_file(Path::new("/opaque.bin"), b"logical content")
        .unwrap();

    // Through the wrapper: the logical bytes. On the base: the shifted
    // representation. Only the former is part of the wrapper's contract.
    assert_eq!(
        wrapper.read_file(Path::new("/opaque.bin")).unwrap(),
        b"logical content"
    );
    assert_ne!(
        base.read_file(Path::new("/opaque.bin")).unwrap(),
        b"logical content"
    );
}
