//! The abstract storage interface the harness verifies.
//!
//! `Store` is the trait boundary between the harness and a candidate
//! implementation. It deliberately mirrors the POSIX-flavored surface the
//! baseline suite exercises: open with flag semantics, metadata, rename,
//! directory operations, sub-tree views, and (as an optional capability)
//! symbolic links. All paths handed to a store are interpreted inside the
//! store's own namespace, absolute from its root; no operation depends on
//! an ambient working directory.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entry not found: {0}")]
    NotFound(PathBuf),
    #[error("entry already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("is a directory: {0}")]
    IsADirectory(PathBuf),
    #[error("too many levels of symbolic links: {0}")]
    TooManyLinks(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("directory not empty: {0}")]
    NotEmpty(PathBuf),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store is read-only: {0}")]
    ReadOnly(PathBuf),
    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),
    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl StoreError {
    /// Maps an `std::io::Error` produced while operating on `path` to the
    /// semantically closest `StoreError` variant. Unrecognized kinds stay
    /// as `Io` so they classify as unclassified rather than masquerading
    /// as a known outcome.
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.to_path_buf()),
            ErrorKind::NotADirectory => StoreError::NotADirectory(path.to_path_buf()),
            ErrorKind::IsADirectory => StoreError::IsADirectory(path.to_path_buf()),
            ErrorKind::FilesystemLoop => StoreError::TooManyLinks(path.to_path_buf()),
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(path.to_path_buf()),
            ErrorKind::DirectoryNotEmpty => StoreError::NotEmpty(path.to_path_buf()),
            ErrorKind::ReadOnlyFilesystem => StoreError::ReadOnly(path.to_path_buf()),
            ErrorKind::InvalidInput => {
                StoreError::InvalidInput(format!("{}: {err}", path.display()))
            }
            _ => StoreError::Io(err),
        }
    }
}

/// The kind of node a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

impl NodeKind {
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Symlink => "symlink",
        }
    }
}

/// Metadata for a single store node.
///
/// `mode` and `modified` are optional because not every store tracks
/// permissions or timestamps; the suite only inspects them inside the
/// corresponding capability-gated groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: NodeKind,
    pub len: u64,
    pub mode: Option<u32>,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }
}

/// One entry in a directory listing. Listings are sorted by name and the
/// kind reflects the entry itself (a symlink lists as a symlink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Open flags, mirroring the create/exclusive/truncate/append/access-mode
/// combinations of a POSIX `open`. Built with chained setters:
///
/// ```
/// use fsconform::store::OpenOptions;
///
/// let opts = OpenOptions::new().write(true).create(true).truncate(true);
/// assert!(opts.write && opts.create && opts.truncate);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
    /// Permission bits applied when the open creates the file.
    pub mode: Option<u32>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// True if the options request any form of mutation.
    pub fn writes(&self) -> bool {
        self.write || self.append || self.truncate || self.create || self.create_new
    }
}

/// An open file handle. Dropping the handle closes it.
pub trait StoreFile: Read + Write + Seek + Send {
    fn metadata(&self) -> Result<Metadata, StoreError>;
    fn set_len(&mut self, len: u64) -> Result<(), StoreError>;

    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Optional symbolic-link operations.
///
/// Exposed through [`Store::symlinks`] as a typed capability query so the
/// absence of link support is distinguishable from a transient failure.
/// `read_link` returns the target string exactly as it was given to
/// `symlink`, whether or not the target exists.
pub trait SymlinkOps {
    fn symlink(&self, target: &Path, link: &Path) -> Result<(), StoreError>;
    fn read_link(&self, link: &Path) -> Result<PathBuf, StoreError>;
    /// Like `metadata` but never follows a final symlink.
    fn lstat(&self, path: &Path) -> Result<Metadata, StoreError>;
}

/// A filesystem-like storage implementation under verification.
pub trait Store: Send + Sync {
    /// Short human-readable identifier used in logs and reports.
    fn name(&self) -> &str;

    fn open(&self, path: &Path, opts: &OpenOptions) -> Result<Box<dyn StoreFile>, StoreError>;

    /// Metadata for the node `path` resolves to, following symlinks.
    fn metadata(&self, path: &Path) -> Result<Metadata, StoreError>;

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, StoreError>;

    fn mkdir(&self, path: &Path) -> Result<(), StoreError>;

    fn mkdir_all(&self, path: &Path) -> Result<(), StoreError>;

    /// Removes a file, symlink, or empty directory. Removing a symlink
    /// removes the link itself, never its target.
    fn remove(&self, path: &Path) -> Result<(), StoreError>;

    /// Removes `path` and all children. Succeeds if `path` does not exist.
    fn remove_all(&self, path: &Path) -> Result<(), StoreError>;

    /// Renames a node without dereferencing a final symlink.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError>;

    fn truncate(&self, path: &Path, len: u64) -> Result<(), StoreError>;

    fn chmod(&self, path: &Path, mode: u32) -> Result<(), StoreError>;

    fn set_times(
        &self,
        path: &Path,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> Result<(), StoreError>;

    /// A view of the sub-tree rooted at `path`, which must be a directory.
    fn sub_store(&self, path: &Path) -> Result<Box<dyn Store>, StoreError>;

    /// Typed capability query for symbolic-link support.
    fn symlinks(&self) -> Option<&dyn SymlinkOps> {
        None
    }

    fn create(&self, path: &Path) -> Result<Box<dyn StoreFile>, StoreError> {
        self.open(
            path,
            &OpenOptions::new().write(true).create(true).truncate(true),
        )
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        let mut file = self.open(path, &OpenOptions::new().read(true))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| StoreError::from_io(e, path))?;
        Ok(buf)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let mut file = self.create(path)?;
        file.write_all(data)
            .map_err(|e| StoreError::from_io(e, path))?;
        file.sync()?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
