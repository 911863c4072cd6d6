use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// Allow/deny decision source for paths touched by tools.
///
/// Read tools call `validate_read`, write tools call `validate_write` before
/// any storage is touched. Both return the resolved absolute path on success.
pub trait PathValidator: Send + Sync {
    fn validate_read(&self, path: &Path) -> Result<PathBuf, EngineError>;

    fn validate_write(&self, path: &Path) -> Result<PathBuf, EngineError>;
}

/// FileSystemGuard provides multi-layer defense against path traversal and unauthorized access.
///
/// # Security Model
///
/// Reads pass four gates:
/// 1. Check deny list before canonicalization
/// 2. Canonicalize path to resolve symlinks and .. patterns
/// 3. Check deny list after canonicalization
/// 4. Verify path is within workspace
///
/// Writes may target files that don't exist yet, so the nearest existing
/// ancestor is canonicalized instead, `..` is refused in the remainder, and
/// the result must also fall under one of the writable directories. Protected
/// directories (the ledger data directory) are never writable.
#[derive(Debug)]
pub struct FileSystemGuard {
    workspace: PathBuf,
    deny_list: Vec<PathBuf>,
    writable: Vec<PathBuf>,
    protected: Vec<PathBuf>,
}

impl FileSystemGuard {
    /// Creates a guard rooted at `workspace`.
    ///
    /// `writable_dirs` are workspace-relative; `extra_deny` extends the
    /// built-in deny list of credential and VCS paths.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathCanonicalization` if the workspace cannot be
    /// canonicalized.
    pub fn new(
        workspace: &Path,
        writable_dirs: &[String],
        extra_deny: &[String],
    ) -> Result<Self, EngineError> {
        // Canonicalize workspace to handle symlinks (e.g., /var -> /private/var on macOS)
        let workspace = workspace
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(workspace.to_path_buf(), e.to_string()))?;

        let mut deny_list: Vec<PathBuf> = [
            ".ssh",
            ".env",
            ".git",
            ".aws/credentials",
            ".config/gcloud",
            "id_rsa",
            "id_ed25519",
            ".gnupg",
            ".kube/config",
            "credentials",
            "private_key",
            ".npmrc",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        deny_list.extend(extra_deny.iter().map(PathBuf::from));

        let writable = writable_dirs.iter().map(|d| workspace.join(d)).collect();

        Ok(Self {
            workspace,
            deny_list,
            writable,
            protected: Vec::new(),
        })
    }

    /// Mark a directory as never writable, even inside a writable directory.
    pub fn protect(mut self, dir: &Path) -> Self {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.protected.push(dir);
        self
    }

    /// Resolve a workspace-relative or absolute path against the workspace.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Checks if a path matches any entry in the deny list, either as a
    /// suffix or as a single component anywhere in the path.
    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path.components().any(|c| {
                    c.as_os_str()
                        .to_str()
                        .is_some_and(|s| denied.as_os_str().to_str() == Some(s))
                })
        })
    }

    /// Returns a reference to the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Canonicalize the longest existing prefix of `path` and re-attach the rest.
    fn canonicalize_existing_prefix(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let mut existing = path.to_path_buf();
        let mut remainder = Vec::new();

        while !existing.exists() {
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    remainder.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => {
                    return Err(EngineError::PathCanonicalization(
                        path.to_path_buf(),
                        "no existing ancestor".to_string(),
                    ))
                }
            }
        }

        let mut canonical = existing
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))?;
        for part in remainder.into_iter().rev() {
            canonical.push(part);
        }
        Ok(canonical)
    }
}

impl PathValidator for FileSystemGuard {
    fn validate_read(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let path = self.resolve(path);

        // Gate 1: Check deny list before canonicalization
        if self.is_denied(&path) {
            return Err(EngineError::PathDenied(path));
        }

        // Gate 2: Canonicalize to resolve symlinks and .. patterns
        let canonical = path
            .canonicalize()
            .map_err(|e| EngineError::PathCanonicalization(path.clone(), e.to_string()))?;

        // Gate 3: Check deny list after canonicalization (catches symlink bypasses)
        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }

        // Gate 4: Verify within workspace
        if !canonical.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        Ok(canonical)
    }

    fn validate_write(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let path = self.resolve(path);

        if self.is_denied(&path) {
            return Err(EngineError::PathDenied(path));
        }

        let canonical = self.canonicalize_existing_prefix(&path)?;

        if canonical
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        if self.is_denied(&canonical) {
            return Err(EngineError::PathDenied(canonical));
        }

        if !canonical.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(canonical));
        }

        if self.protected.iter().any(|p| canonical.starts_with(p)) {
            return Err(EngineError::PathDenied(canonical));
        }

        if !self.writable.iter().any(|w| canonical.starts_with(w)) {
            return Err(EngineError::PathDenied(canonical));
        }

        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard_for(temp: &TempDir) -> FileSystemGuard {
        fs::create_dir_all(temp.path().join("components")).unwrap();
        FileSystemGuard::new(temp.path(), &["components".to_string()], &[]).unwrap()
    }

    #[test]
    fn test_deny_list_before_canonicalization() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(&temp);

        let result = guard.validate_read(Path::new(".ssh"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[test]
    fn test_deny_list_after_canonicalization() {
        let temp = TempDir::new().unwrap();
        let ssh_dir = temp.path().join(".ssh");
        fs::create_dir(&ssh_dir).unwrap();

        #[cfg(unix)]
        {
            let guard = guard_for(&temp);
            let symlink_path = temp.path().join("safe_link");
            std::os::unix::fs::symlink(&ssh_dir, &symlink_path).unwrap();

            let result = guard.validate_read(&symlink_path);
            assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
        }
    }

    #[test]
    fn test_read_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let guard = FileSystemGuard::new(&workspace, &[], &[]).unwrap();

        fs::write(temp.path().join("secret.txt"), "secret").unwrap();

        let result = guard.validate_read(Path::new("../secret.txt"));
        assert!(matches!(
            result.unwrap_err(),
            EngineError::PathOutsideWorkspace(_)
        ));
    }

    #[test]
    fn test_valid_read_within_workspace() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(&temp);
        let file = temp.path().join("components").join("spec.md");
        fs::write(&file, "# Spec").unwrap();

        let resolved = guard.validate_read(Path::new("components/spec.md")).unwrap();
        assert_eq!(resolved, file.canonicalize().unwrap());
    }

    #[test]
    fn test_write_new_file_in_writable_dir() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(&temp);

        let resolved = guard
            .validate_write(Path::new("components/toggle/style.css"))
            .unwrap();
        assert!(resolved.ends_with("components/toggle/style.css"));
    }

    #[test]
    fn test_write_outside_writable_dirs_denied() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(&temp);

        let result = guard.validate_write(Path::new("README.md"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[test]
    fn test_write_traversal_denied() {
        let temp = TempDir::new().unwrap();
        let guard = guard_for(&temp);

        let result = guard.validate_write(Path::new("components/../../escape.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_into_protected_dir_denied() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("components").join("data");
        fs::create_dir_all(&data).unwrap();
        let guard = guard_for(&temp).protect(&data);

        let result = guard.validate_write(Path::new("components/data/decisions.jsonl"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }

    #[test]
    fn test_extra_deny_entries() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("components")).unwrap();
        let guard = FileSystemGuard::new(
            temp.path(),
            &["components".to_string()],
            &["drafts".to_string()],
        )
        .unwrap();

        let result = guard.validate_write(Path::new("components/drafts/x.css"));
        assert!(matches!(result.unwrap_err(), EngineError::PathDenied(_)));
    }
}
