// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Persistence of uploaded `.deb` content.

A [PackageStore] keeps the raw bytes of every accepted package so a catalog can
be rebuilt after a restart. Packages are laid out as
`<package>/<package>_<version>_<arch>.deb`.

[FilesystemPackageStore] persists to a directory. [MemoryPackageStore] keeps
everything in memory.
*/

use {
    crate::error::{RepositoryError, Result},
    async_trait::async_trait,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex, PoisonError,
        },
    },
};

/// Ensure a value is usable as a single path component.
pub fn validate_path_component(value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        Err(RepositoryError::InvalidPathComponent(value.to_string()))
    } else {
        Ok(())
    }
}

/// Storage of raw package content.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Persist the content of a package, replacing any existing content.
    async fn write_package(&self, package: &str, filename: &str, content: &[u8]) -> Result<()>;

    /// List the store relative paths of every persisted package.
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// Read the content of a package given its store relative path.
    async fn read_package(&self, path: &str) -> Result<Vec<u8>>;
}

/// A [PackageStore] backed by a filesystem directory.
#[derive(Debug)]
pub struct FilesystemPackageStore {
    root_dir: PathBuf,
    temp_counter: AtomicU64,
}

impl FilesystemPackageStore {
    /// Construct a new instance, bound to the root directory specified.
    ///
    /// The directory is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
            temp_counter: AtomicU64::new(0),
        }
    }

    /// The root directory of the store.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

fn io_path_error(path: &Path, e: std::io::Error) -> RepositoryError {
    RepositoryError::RepositoryIoPath(format!("{}", path.display()), e)
}

#[async_trait]
impl PackageStore for FilesystemPackageStore {
    async fn write_package(&self, package: &str, filename: &str, content: &[u8]) -> Result<()> {
        validate_path_component(package)?;
        validate_path_component(filename)?;

        let dir = self.root_dir.join(package);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_path_error(&dir, e))?;

        let dest_path = dir.join(filename);
        // Hidden temporary file in the destination directory, so the rename is atomic.
        let temp_path = dir.join(format!(
            ".{}.{}-{}.tmp",
            filename,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = tokio::fs::write(&temp_path, content).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_path_error(&temp_path, e));
        }

        tokio::fs::rename(&temp_path, &dest_path)
            .await
            .map_err(|e| io_path_error(&dest_path, e))?;

        Ok(())
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let mut paths = vec![];

        let mut dirs = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(paths);
            }
            Err(e) => {
                return Err(io_path_error(&self.root_dir, e));
            }
        };

        while let Some(dir) = dirs
            .next_entry()
            .await
            .map_err(|e| io_path_error(&self.root_dir, e))?
        {
            let dir_path = dir.path();
            if !dir_path.is_dir() {
                continue;
            }

            let dir_name = dir.file_name().to_string_lossy().to_string();

            let mut files = tokio::fs::read_dir(&dir_path)
                .await
                .map_err(|e| io_path_error(&dir_path, e))?;

            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| io_path_error(&dir_path, e))?
            {
                let name = file.file_name().to_string_lossy().to_string();

                if name.starts_with('.') || !name.ends_with(".deb") || !file.path().is_file() {
                    continue;
                }

                paths.push(format!("{}/{}", dir_name, name));
            }
        }

        paths.sort();

        Ok(paths)
    }

    async fn read_package(&self, path: &str) -> Result<Vec<u8>> {
        let (package, filename) = path
            .split_once('/')
            .ok_or_else(|| RepositoryError::InvalidPathComponent(path.to_string()))?;
        validate_path_component(package)?;
        validate_path_component(filename)?;

        let full_path = self.root_dir.join(package).join(filename);

        tokio::fs::read(&full_path)
            .await
            .map_err(|e| io_path_error(&full_path, e))
    }
}

/// A [PackageStore] holding content in memory.
#[derive(Debug, Default)]
pub struct MemoryPackageStore {
    packages: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn write_package(&self, package: &str, filename: &str, content: &[u8]) -> Result<()> {
        validate_path_component(package)?;
        validate_path_component(filename)?;

        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(format!("{}/{}", package, filename), content.to_vec());

        Ok(())
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        Ok(self
            .packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    async fn read_package(&self, path: &str) -> Result<Vec<u8>> {
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::RepositoryIoPath(
                    path.to_string(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "package not in store"),
                )
            })
    }
}
