//! Root-confined adapter over the host filesystem.
//!
//! `HostStore` interprets every store path beneath a host root directory,
//! chroot-style: absolute store paths start at the root, `..` never climbs
//! above it, and store-absolute symlink targets are rewritten under the
//! root on creation so the host kernel can follow them. `read_link`
//! reverses the rewrite, so targets read back exactly as they were given.
//!
//! This is an adapter, not a filesystem: all real semantics (link
//! following, loop detection, flag handling) come from the host kernel,
//! which is what makes the adapter usable as a reference candidate.

use crate::store::{
    DirEntry, Metadata, NodeKind, OpenOptions, Store, StoreError, StoreFile, SymlinkOps,
};
use filetime::FileTime;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

pub struct HostStore {
    root: PathBuf,
}

impl HostStore {
    /// Creates a store rooted at `root`, which must be an existing host
    /// directory. The root is canonicalized so confinement checks are not
    /// confused by host-level symlinks in the root path itself.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root: PathBuf = root.into();
        let root = root
            .canonicalize()
            .map_err(|e| StoreError::from_io(e, &root))?;
        let meta = fs::metadata(&root).map_err(|e| StoreError::from_io(e, &root))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory(root));
        }
        Ok(Self { root })
    }

    /// The host directory backing the store root.
    pub fn host_root(&self) -> &Path {
        &self.root
    }

    /// Maps a store path to its host location: lexical normalization with
    /// `..` clamped at the store root.
    fn host_path(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut rel = PathBuf::new();
        for comp in path.components() {
            match comp {
                Component::Prefix(_) => {
                    return Err(StoreError::InvalidInput(format!(
                        "path prefixes are not supported: {}",
                        path.display()
                    )));
                }
                Component::RootDir => rel = PathBuf::new(),
                Component::CurDir => {}
                Component::ParentDir => {
                    rel.pop();
                }
                Component::Normal(name) => rel.push(name),
            }
        }
        Ok(self.root.join(rel))
    }

    fn metadata_from_host(meta: &fs::Metadata) -> Metadata {
        let kind = if meta.file_type().is_symlink() {
            NodeKind::Symlink
        } else if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        Metadata {
            kind,
            len: meta.len(),
            mode: host_mode(meta),
            modified: meta.modified().ok(),
        }
    }
}

#[cfg(unix)]
fn host_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn host_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

struct HostFile {
    file: fs::File,
    path: PathBuf,
}

impl Read for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for HostFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for HostFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StoreFile for HostFile {
    fn metadata(&self) -> Result<Metadata, StoreError> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| StoreError::from_io(e, &self.path))?;
        Ok(HostStore::metadata_from_host(&meta))
    }

    fn set_len(&mut self, len: u64) -> Result<(), StoreError> {
        self.file
            .set_len(len)
            .map_err(|e| StoreError::from_io(e, &self.path))
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.file
            .sync_all()
            .map_err(|e| StoreError::from_io(e, &self.path))
    }
}

impl Store for HostStore {
    fn name(&self) -> &str {
        "host"
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError> {
        let host = self.host_path(path)?;

        let mut options = fs::OpenOptions::new();
        // With no access mode requested at all, behave like O_RDONLY.
        options.read(opts.read || !opts.writes());
        options.write(opts.write);
        options.append(opts.append);
        options.truncate(opts.truncate);
        options.create(opts.create);
        options.create_new(opts.create_new);
        #[cfg(unix)]
        if let Some(mode) = opts.mode {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }

        let file = options
            .open(&host)
            .map_err(|e| StoreError::from_io(e, &host))?;
        Ok(Box::new(HostFile { file, path: host }))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, StoreError> {
        let host = self.host_path(path)?;
        let meta = fs::metadata(&host).map_err(|e| StoreError::from_io(e, &host))?;
        Ok(Self::metadata_from_host(&meta))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, StoreError> {
        let host = self.host_path(path)?;
        let read_dir = fs::read_dir(&host).map_err(|e| StoreError::from_io(e, &host))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| StoreError::from_io(e, &host))?;
            let file_type = entry
                .file_type()
                .map_err(|e| StoreError::from_io(e, &entry.path()))?;
            let kind = if file_type.is_symlink() {
                NodeKind::Symlink
            } else if file_type.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, path: &Path) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        fs::create_dir(&host).map_err(|e| StoreError::from_io(e, &host))
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        fs::create_dir_all(&host).map_err(|e| StoreError::from_io(e, &host))
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        // Decide file vs directory from the node itself, not its target,
        // so removing a symlink removes only the link edge.
        let meta = fs::symlink_metadata(&host).map_err(|e| StoreError::from_io(e, &host))?;
        if meta.is_dir() {
            fs::remove_dir(&host).map_err(|e| StoreError::from_io(e, &host))
        } else {
            fs::remove_file(&host).map_err(|e| StoreError::from_io(e, &host))
        }
    }

    fn remove_all(&self, path: &Path) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        let meta = match fs::symlink_metadata(&host) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::from_io(e, &host)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&host).map_err(|e| StoreError::from_io(e, &host))
        } else {
            fs::remove_file(&host).map_err(|e| StoreError::from_io(e, &host))
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let host_from = self.host_path(from)?;
        let host_to = self.host_path(to)?;
        fs::rename(&host_from, &host_to).map_err(|e| StoreError::from_io(e, &host_from))
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&host)
            .map_err(|e| StoreError::from_io(e, &host))?;
        file.set_len(len).map_err(|e| StoreError::from_io(e, &host))
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<(), StoreError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let host = self.host_path(path)?;
            fs::set_permissions(&host, fs::Permissions::from_mode(mode))
                .map_err(|e| StoreError::from_io(e, &host))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Err(StoreError::Unsupported("chmod"))
        }
    }

    fn set_times(
        &self,
        path: &Path,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        filetime::set_file_times(
            &host,
            FileTime::from_system_time(atime),
            FileTime::from_system_time(mtime),
        )
        .map_err(|e| StoreError::from_io(e, &host))
    }

    fn sub_store(&self, path: &Path) -> Result<Box<dyn Store>, StoreError> {
        let host = self.host_path(path)?;
        let meta = fs::metadata(&host).map_err(|e| StoreError::from_io(e, &host))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory(host));
        }
        Ok(Box::new(HostStore { root: host }))
    }

    fn symlinks(&self) -> Option<&dyn SymlinkOps> {
        #[cfg(unix)]
        {
            Some(self)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}

#[cfg(unix)]
impl SymlinkOps for HostStore {
    fn symlink(&self, target: &Path, link: &Path) -> Result<(), StoreError> {
        let host_link = self.host_path(link)?;
        // Store-absolute targets are anchored under the host root so the
        // kernel resolves them inside the store namespace. Relative
        // targets are written through untouched.
        let host_target = if target.is_absolute() {
            self.host_path(target)?
        } else {
            target.to_path_buf()
        };

        debug!(
            "symlink {} -> {}",
            host_link.display(),
            host_target.display()
        );
        std::os::unix::fs::symlink(&host_target, &host_link)
            .map_err(|e| StoreError::from_io(e, &host_link))
    }

    fn read_link(&self, link: &Path) -> Result<PathBuf, StoreError> {
        let host_link = self.host_path(link)?;
        let target = fs::read_link(&host_link).map_err(|e| StoreError::from_io(e, &host_link))?;
        match target.strip_prefix(&self.root) {
            Ok(rel) => Ok(Path::new("/").join(rel)),
            Err(_) => Ok(target),
        }
    }

    fn lstat(&self, path: &Path) -> Result<Metadata, StoreError> {
        let host = self.host_path(path)?;
        let meta = fs::symlink_metadata(&host).map_err(|e| StoreError::from_io(e, &host))?;
        Ok(Self::metadata_from_host(&meta))
    }
}
