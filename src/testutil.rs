//! Crate-internal test fixtures: small wrapper stores with known
//! transform contracts, used to exercise the differential wrapper
//! verifier and failure collection.

use crate::store::{
    DirEntry, Metadata, OpenOptions, Store, StoreError, StoreFile, SymlinkOps,
};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

/// A data-transforming wrapper: file bytes are XORed with a fixed key on
/// the way in and out. Logical content survives the round trip while the
/// base store holds different bytes, which is exactly the opacity shape
/// the wrapper verifier must accept.
pub(crate) struct XorStore {
    inner: Box<dyn Store>,
    key: u8,
}

impl XorStore {
    pub(crate) fn new(inner: Box<dyn Store>, key: u8) -> Self {
        Self { inner, key }
    }
}

struct XorFile {
    inner: Box<dyn StoreFile>,
    key: u8,
}

impl Read for XorFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        for byte in &mut buf[..n] {
            *byte ^= self.key;
        }
        Ok(n)
    }
}

impl Write for XorFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let masked: Vec<u8> = buf.iter().map(|b| b ^ self.key).collect();
        self.inner.write(&masked)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for XorFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl StoreFile for XorFile {
    fn metadata(&self) -> Result<Metadata, StoreError> {
        self.inner.metadata()
    }

    fn set_len(&mut self, len: u64) -> Result<(), StoreError> {
        self.inner.set_len(len)
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.inner.sync()
    }
}

impl Store for XorStore {
    fn name(&self) -> &str {
        "xor"
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError> {
        let inner = self.inner.open(path, opts)?;
        Ok(Box::new(XorFile {
            inner,
            key: self.key,
        }))
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
        Ok(Box::new(XorStore {
            inner,
            key: self.key,
        }))
    }

    fn symlinks(&self) -> Option<&dyn SymlinkOps> {
        self.inner.symlinks()
    }
}

/// A wrapper that silently drops the last byte of every whole-file
/// write: the kind of subtle corruption the harness exists to catch.
pub(crate) struct LossyWrites {
    inner: Box<dyn Store>,
}

impl LossyWrites {
    pub(crate) fn new(inner: Box<dyn Store>) -> Self {
        Self { inner }
    }
}

impl Store for LossyWrites {
    fn name(&self) -> &str {
        "lossy-writes"
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError> {
        self.inner.open(path, opts)
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
        self.inner.sub_store(path)
    }

    fn symlinks(&self) -> Option<&dyn SymlinkOps> {
        self.inner.symlinks()
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let kept = if data.is_empty() {
            data
        } else {
            &data[..data.len() - 1]
        };
        self.inner.write_file(path, kept)
    }
}

/// A wrapper that rejects every mutation while delegating reads.
pub(crate) struct ReadOnlyStore {
    inner: Box<dyn Store>,
}

impl ReadOnlyStore {
    pub(crate) fn new(inner: Box<dyn Store>) -> Self {
        Self { inner }
    }

    fn rejected(path: &Path) -> StoreError {
        StoreError::ReadOnly(path.to_path_buf())
    }
}

impl Store for ReadOnlyStore {
    fn name(&self) -> &str {
        "read-only"
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError> {
        if opts.writes() {
            return Err(Self::rejected(path));
        }
        self.inner.open(path, opts)
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, StoreError> {
        self.inner.metadata(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, StoreError> {
        self.inner.read_dir(path)
    }

    fn mkdir(&self, path: &Path) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn remove_all(&self, path: &Path) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn rename(&self, from: &Path, _to: &Path) -> Result<(), StoreError> {
        Err(Self::rejected(from))
    }

    fn truncate(&self, path: &Path, _len: u64) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn chmod(&self, path: &Path, _mode: u32) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn set_times(
        &self,
        path: &Path,
        _atime: SystemTime,
        _mtime: SystemTime,
    ) -> Result<(), StoreError> {
        Err(Self::rejected(path))
    }

    fn sub_store(&self, path: &Path) -> Result<Box<dyn Store>, StoreError> {
        let inner = self.inner.sub_store(path)?;
        Ok(Box::new(ReadOnlyStore { inner }))
    }
}
