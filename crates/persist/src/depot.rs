use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors from depot and resource operations.
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid depot path: {0}")]
    InvalidPath(String),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("resource kind mismatch for {path}: expected {expected}, got {actual}")]
    KindMismatch {
        path: String,
        expected: &'static str,
        actual: String,
    },
}

/// Byte-level storage for resources, addressed by `/`-separated paths.
pub trait Depot: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>, DepotError>;

    fn write(&self, path: &str, data: &[u8]) -> Result<(), DepotError>;

    fn exists(&self, path: &str) -> bool;

    /// Files directly inside `dir`, sorted. A missing directory lists as empty.
    fn list(&self, dir: &str) -> Result<Vec<String>, DepotError>;
}

/// Depot backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FileDepot {
    root: PathBuf,
}

impl FileDepot {
    /// Open a depot rooted at `root`. The directory is created if missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DepotError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, DepotError> {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if part == ".." || part == "." {
                return Err(DepotError::InvalidPath(path.to_string()));
            }
            full.push(part);
        }
        Ok(full)
    }
}

impl Depot for FileDepot {
    fn read(&self, path: &str) -> Result<Vec<u8>, DepotError> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DepotError::NotFound(path.to_string()),
            _ => DepotError::Io(e),
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), DepotError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, data)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, DepotError> {
        let full = self.resolve(dir)?;
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(join_path(dir, name));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Depot held entirely in memory. Used by tests and in-process cooking.
#[derive(Debug, Default)]
pub struct MemoryDepot {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryDepot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Depot for MemoryDepot {
    fn read(&self, path: &str) -> Result<Vec<u8>, DepotError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| DepotError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), DepotError> {
        self.files.write().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, DepotError> {
        let files = self.files.read();
        Ok(files
            .keys()
            .filter(|key| parent_path(key) == dir.trim_end_matches('/'))
            .cloned()
            .collect())
    }
}

/// Directory part of a depot path (`"a/b/c.x"` -> `"a/b"`, `"c.x"` -> `""`).
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Join a directory and a relative name with a single `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// File name without directory and extension (`"a/b/c.x"` -> `"c"`).
pub fn file_stem(path: &str) -> &str {
    let name = &path[path.rfind('/').map(|i| i + 1).unwrap_or(0)..];
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => &name[..index],
    }
}
