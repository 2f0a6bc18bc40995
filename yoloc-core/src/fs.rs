//! Filesystem abstractions used for scanning checkouts.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// List all files reachable from the root path, skipping `.git`.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Size of a file in bytes.
    fn file_len(&self, path: &Path) -> Result<u64>;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if is_git_dir(&path) {
                    continue;
                }
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn is_git_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == ".git")
}

#[cfg(test)]
mod tests {
    use super::StdFileSystem;
    use crate::fs::FileSystem;
    use std::path::PathBuf;

    #[test]
    fn std_filesystem_lists_dotfiles_but_not_git() {
        let root = std::env::temp_dir().join(unique_dir_name());
        std::fs::create_dir_all(root.join(".git")).expect("create git dir");
        std::fs::write(root.join(".git").join("config"), "[core]").expect("write git config");
        let env_path = root.join(".env");
        std::fs::write(&env_path, "TOKEN=abc").expect("write dotfile");
        let key_path = root.join("id_rsa");
        std::fs::write(&key_path, "hello yoloc").expect("write test file");

        let fs = StdFileSystem::new();
        let files = fs.list_files(&root).expect("list files");
        assert_eq!(files, vec![env_path, key_path.clone()]);

        assert_eq!(fs.file_len(&key_path).expect("len"), 11);
        let contents = fs.read_to_string(&key_path).expect("read file");
        assert_eq!(contents, "hello yoloc");

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    fn unique_dir_name() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        PathBuf::from(format!("yoloc_core_test_{nanos}"))
    }
}
