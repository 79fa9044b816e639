// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT repositories.

[AptRepository] ties together a [PackageCatalog], a [ReleaseBuilder], an optional
[SigningContext] and an optional [PackageStore]. It exposes the operations a
transport layer needs to serve a repository:

* [AptRepository::add_package()] ingests an uploaded `.deb`.
* [AptRepository::get_package()] resolves a package by filename.
* [AptRepository::build_packages_index()] renders a `Packages` file.
* [AptRepository::build_release()] renders a `Release` file.
* [AptRepository::clear_sign_release()] and [AptRepository::detached_sign_release()]
  produce `InRelease` and `Release.gpg`.
* [AptRepository::export_public_key()] exports the key clients trust.

[RepositoryPath] maps the request paths APT clients fetch onto those
operations. [AptRepository::publish_to_directory()] writes the whole repository
as a static tree.

# Layout

```text
pool/main/<package>_<version>_<arch>.deb
dists/<suite>/Release
dists/<suite>/InRelease
dists/<suite>/Release.gpg
dists/<suite>/main/binary-<arch>/Packages[.gz|.xz]
public.asc
```
*/

use {
    crate::{
        catalog::PackageCatalog,
        config::RepositoryConfig,
        error::{RepositoryError, Result},
        io::Compression,
        package_record::PackageRecord,
        release::ReleaseBuilder,
        signing::SigningContext,
        store::{FilesystemPackageStore, PackageStore},
    },
    log::{debug, info, warn},
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// The component every package is published in.
pub const COMPONENT: &str = "main";

/// Filename of the exported public key at the repository root.
pub const PUBLIC_KEY_FILENAME: &str = "public.asc";

/// Repository root relative path of a `.deb` file.
pub fn pool_path(filename: &str) -> String {
    format!("pool/{}/{}", COMPONENT, filename)
}

/// Distribution relative path of a `Packages` index.
pub fn packages_index_path(component: &str, architecture: &str) -> String {
    format!("{}/binary-{}/Packages", component, architecture)
}

/// Repository root relative path of a file in a distribution directory.
pub fn distribution_file_path(suite: &str, path: &str) -> String {
    format!("dists/{}/{}", suite, path)
}

/// A file served by a repository, as identified by its request path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepositoryPath {
    /// `dists/<suite>/Release`.
    Release,
    /// `dists/<suite>/InRelease`.
    InRelease,
    /// `dists/<suite>/Release.gpg`.
    ReleaseGpg,
    /// `dists/<suite>/main/binary-<arch>/Packages[.gz|.xz]`.
    Packages {
        architecture: String,
        compression: Compression,
    },
    /// `pool/main/<filename>`.
    Pool(String),
    /// `public.asc`.
    PublicKey,
}

impl RepositoryPath {
    /// Resolve a request path for a repository serving `suite`.
    ///
    /// Leading slashes are ignored. Returns [None] for paths the repository doesn't serve.
    pub fn parse(path: &str, suite: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');

        if path == PUBLIC_KEY_FILENAME {
            return Some(Self::PublicKey);
        }

        if let Some(filename) = path
            .strip_prefix("pool/")
            .and_then(|p| p.strip_prefix(COMPONENT))
            .and_then(|p| p.strip_prefix('/'))
        {
            return if filename.is_empty() || filename.contains('/') {
                None
            } else {
                Some(Self::Pool(filename.to_string()))
            };
        }

        let dist_path = path
            .strip_prefix("dists/")?
            .strip_prefix(suite)?
            .strip_prefix('/')?;

        match dist_path {
            "Release" => Some(Self::Release),
            "InRelease" => Some(Self::InRelease),
            "Release.gpg" => Some(Self::ReleaseGpg),
            _ => {
                let rest = dist_path
                    .strip_prefix(COMPONENT)?
                    .strip_prefix("/binary-")?;
                let (architecture, filename) = rest.split_once('/')?;

                if architecture.is_empty() {
                    return None;
                }

                let compression = [Compression::None, Compression::Gzip, Compression::Xz]
                    .into_iter()
                    .find(|c| filename == format!("Packages{}", c.extension()))?;

                Some(Self::Packages {
                    architecture: architecture.to_string(),
                    compression,
                })
            }
        }
    }

    /// The repository root relative path of this file.
    pub fn to_path(&self, suite: &str) -> String {
        match self {
            Self::Release => distribution_file_path(suite, "Release"),
            Self::InRelease => distribution_file_path(suite, "InRelease"),
            Self::ReleaseGpg => distribution_file_path(suite, "Release.gpg"),
            Self::Packages {
                architecture,
                compression,
            } => distribution_file_path(
                suite,
                &format!(
                    "{}{}",
                    packages_index_path(COMPONENT, architecture),
                    compression.extension()
                ),
            ),
            Self::Pool(filename) => pool_path(filename),
            Self::PublicKey => PUBLIC_KEY_FILENAME.to_string(),
        }
    }
}

/// A `Release` body and the signatures over it.
///
/// All members derive from the same body, so they agree with each other.
#[derive(Clone, Debug)]
pub struct SignedRelease {
    /// The `Release` file.
    pub release: String,
    /// The `InRelease` file: `release` as a cleartext signed document.
    pub inrelease: String,
    /// The `Release.gpg` file: an armored detached signature over `release`.
    pub release_gpg: Vec<u8>,
}

/// An APT repository.
pub struct AptRepository {
    config: RepositoryConfig,
    catalog: PackageCatalog,
    release_builder: ReleaseBuilder,
    signing: Option<SigningContext>,
    store: Option<Arc<dyn PackageStore>>,
}

impl AptRepository {
    /// Construct an empty repository.
    ///
    /// No signing context or package store is attached.
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            release_builder: ReleaseBuilder::from_config(&config),
            config,
            catalog: PackageCatalog::default(),
            signing: None,
            store: None,
        })
    }

    /// Construct an empty repository from configuration, attaching what it references.
    ///
    /// The signing keyring is loaded from `signing_key_path`, unlocked with the
    /// passphrase in the configured environment variable. A filesystem package
    /// store is attached if `package_store` is set. The catalog is not hydrated:
    /// call [Self::load_from_store()] for that.
    pub fn from_config(config: RepositoryConfig) -> Result<Self> {
        let signing = if let Some(path) = &config.signing_key_path {
            Some(SigningContext::from_path(
                path,
                config.signing_key_passphrase(),
            )?)
        } else {
            None
        };

        let store = config
            .package_store
            .as_ref()
            .map(|path| Arc::new(FilesystemPackageStore::new(path)) as Arc<dyn PackageStore>);

        let mut repo = Self::new(config)?;
        repo.signing = signing;
        repo.store = store;

        Ok(repo)
    }

    /// Attach a signing context.
    pub fn with_signing_context(mut self, signing: SigningContext) -> Self {
        self.signing = Some(signing);
        self
    }

    /// Attach a package store.
    pub fn with_store(mut self, store: Arc<dyn PackageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The repository configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The catalog of packages.
    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// The signing context, if one is attached.
    pub fn signing_context(&self) -> Option<&SigningContext> {
        self.signing.as_ref()
    }

    fn signing(&self) -> Result<&SigningContext> {
        self.signing
            .as_ref()
            .ok_or(RepositoryError::SigningNotConfigured)
    }

    /// Add an uploaded `.deb` to the repository.
    ///
    /// Returns the filename the package is registered under. A package with the same
    /// filename is replaced. If a package store is attached the content is persisted
    /// after the catalog is updated; a store failure is returned but the package stays
    /// in the catalog.
    pub async fn add_package(&self, content: Vec<u8>) -> Result<String> {
        let record = self.catalog.add(content)?;

        if let Some(store) = &self.store {
            store
                .write_package(record.package(), record.filename(), record.content())
                .await?;
            debug!("persisted {}", record.filename());
        }

        Ok(record.filename().to_string())
    }

    /// Obtain a package by filename.
    pub fn get_package(&self, filename: &str) -> Option<Arc<PackageRecord>> {
        self.catalog.get_by_filename(filename)
    }

    /// Build the `Packages` index for an architecture.
    pub fn build_packages_index(&self, architecture: &str) -> String {
        self.catalog.build_index(architecture)
    }

    /// Build the `Release` file.
    pub fn build_release(&self) -> Result<String> {
        self.build_release_for(&self.catalog)
    }

    fn build_release_for(&self, catalog: &PackageCatalog) -> Result<String> {
        self.release_builder.build(
            catalog,
            &self.config.architectures,
            &self.config.components,
        )
    }

    /// Build the `InRelease` file: a freshly built `Release` as a cleartext signed document.
    pub fn clear_sign_release(&self) -> Result<String> {
        let signing = self.signing()?;

        signing.clear_sign(&self.build_release()?)
    }

    /// Build a `Release.gpg` file: a detached signature over a freshly built `Release`.
    ///
    /// The `Date` of a `Release` changes with time. Use [Self::signed_release()] to obtain
    /// a `Release` along with signatures matching it.
    pub fn detached_sign_release(&self) -> Result<Vec<u8>> {
        let signing = self.signing()?;

        signing.detached_sign(self.build_release()?.as_bytes())
    }

    /// Export the ASCII armored public keys of the signing keyring.
    pub fn export_public_key(&self) -> Result<Vec<u8>> {
        self.signing()?.export_public_key()
    }

    /// Build a `Release` file along with its `InRelease` and `Release.gpg` signatures.
    pub fn signed_release(&self) -> Result<SignedRelease> {
        self.signed_release_for(&self.catalog)
    }

    fn signed_release_for(&self, catalog: &PackageCatalog) -> Result<SignedRelease> {
        let signing = self.signing()?;

        let release = self.build_release_for(catalog)?;
        let inrelease = signing.clear_sign(&release)?;
        let release_gpg = signing.detached_sign(release.as_bytes())?;

        Ok(SignedRelease {
            release,
            inrelease,
            release_gpg,
        })
    }

    /// Populate the catalog from the attached package store.
    ///
    /// Packages that can't be read or parsed are logged and skipped. Returns the number
    /// of packages loaded.
    pub async fn load_from_store(&self) -> Result<usize> {
        let store = if let Some(store) = &self.store {
            store
        } else {
            debug!("no package store attached; nothing to load");
            return Ok(0);
        };

        let paths = store.list_packages().await?;
        let mut loaded = 0;

        for path in paths {
            let content = match store.read_package(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping unreadable stored package {}: {}", path, e);
                    continue;
                }
            };

            match self.catalog.add(content) {
                Ok(_) => {
                    loaded += 1;
                }
                Err(e) => {
                    warn!("skipping invalid stored package {}: {}", path, e);
                }
            }
        }

        info!("loaded {} packages from store", loaded);

        Ok(loaded)
    }

    /// Obtain the content served at a repository path.
    ///
    /// Returns [None] if nothing is served at that path. Signed files error if no
    /// signing context is attached.
    pub fn read_path(&self, path: &RepositoryPath) -> Result<Option<Vec<u8>>> {
        Ok(match path {
            RepositoryPath::Release => Some(self.build_release()?.into_bytes()),
            RepositoryPath::InRelease => Some(self.clear_sign_release()?.into_bytes()),
            RepositoryPath::ReleaseGpg => Some(self.detached_sign_release()?),
            RepositoryPath::Packages {
                architecture,
                compression,
            } => Some(
                self.catalog
                    .build_index_compressed(architecture, *compression)?,
            ),
            RepositoryPath::Pool(filename) => self
                .catalog
                .get_by_filename(filename)
                .map(|r| r.content().to_vec()),
            RepositoryPath::PublicKey => Some(self.export_public_key()?),
        })
    }

    /// Write the repository as a static tree under `dest_dir`.
    ///
    /// Pool files are written first, then `Packages` indices, then `Release` files, so a
    /// client reading the tree while it is written never sees indices referring to missing
    /// files. Signed files and `public.asc` are only written if a signing context is
    /// attached.
    pub async fn publish_to_directory(&self, dest_dir: impl AsRef<Path>) -> Result<()> {
        let dest_dir = dest_dir.as_ref();
        let suite = self.release_builder.suite();

        // Everything below derives from one set of records.
        let catalog = self.catalog.frozen();

        info!(
            "publishing {} packages to {}",
            catalog.len(),
            dest_dir.display()
        );

        for record in catalog.snapshot() {
            write_file(dest_dir.join(record.pool_path()), record.content()).await?;
        }

        for arch in &self.config.architectures {
            for compression in std::iter::once(Compression::None)
                .chain(self.config.compressed_index_variants())
            {
                let path = RepositoryPath::Packages {
                    architecture: arch.clone(),
                    compression,
                };

                write_file(
                    dest_dir.join(path.to_path(suite)),
                    &catalog.build_index_compressed(arch, compression)?,
                )
                .await?;
            }
        }

        if self.signing.is_some() {
            let signed = self.signed_release_for(&catalog)?;

            write_file(
                dest_dir.join(RepositoryPath::Release.to_path(suite)),
                signed.release.as_bytes(),
            )
            .await?;
            write_file(
                dest_dir.join(RepositoryPath::InRelease.to_path(suite)),
                signed.inrelease.as_bytes(),
            )
            .await?;
            write_file(
                dest_dir.join(RepositoryPath::ReleaseGpg.to_path(suite)),
                &signed.release_gpg,
            )
            .await?;
            write_file(
                dest_dir.join(PUBLIC_KEY_FILENAME),
                &self.export_public_key()?,
            )
            .await?;
        } else {
            warn!("no signing key attached; publishing unsigned repository");

            write_file(
                dest_dir.join(RepositoryPath::Release.to_path(suite)),
                self.build_release_for(&catalog)?.as_bytes(),
            )
            .await?;
        }

        Ok(())
    }
}

async fn write_file(path: PathBuf, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RepositoryError::RepositoryIoPath(format!("{}", parent.display()), e))?;
    }

    debug!("writing {}", path.display());

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| RepositoryError::RepositoryIoPath(format!("{}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            deb::testutil::deb,
            error::ErrorCategory,
            signing::{verify_cleartext, verify_detached_signature},
            signing_key::test_key_pair,
            store::MemoryPackageStore,
        },
        std::io::Read,
    };

    fn signed_repo(config: RepositoryConfig) -> Result<AptRepository> {
        Ok(AptRepository::new(config)?
            .with_signing_context(SigningContext::new(vec![test_key_pair().0.clone()], "")))
    }

    #[test]
    fn path_helpers() {
        assert_eq!(pool_path("a_1_amd64.deb"), "pool/main/a_1_amd64.deb");
        assert_eq!(
            packages_index_path("main", "arm64"),
            "main/binary-arm64/Packages"
        );
        assert_eq!(
            distribution_file_path("stable", "Release"),
            "dists/stable/Release"
        );
    }

    #[test]
    fn parse_paths() {
        assert_eq!(
            RepositoryPath::parse("dists/stable/Release", "stable"),
            Some(RepositoryPath::Release)
        );
        assert_eq!(
            RepositoryPath::parse("/dists/stable/InRelease", "stable"),
            Some(RepositoryPath::InRelease)
        );
        assert_eq!(
            RepositoryPath::parse("dists/stable/Release.gpg", "stable"),
            Some(RepositoryPath::ReleaseGpg)
        );
        assert_eq!(
            RepositoryPath::parse("dists/stable/main/binary-amd64/Packages", "stable"),
            Some(RepositoryPath::Packages {
                architecture: "amd64".into(),
                compression: Compression::None
            })
        );
        assert_eq!(
            RepositoryPath::parse("dists/stable/main/binary-arm64/Packages.xz", "stable"),
            Some(RepositoryPath::Packages {
                architecture: "arm64".into(),
                compression: Compression::Xz
            })
        );
        assert_eq!(
            RepositoryPath::parse("pool/main/hello_1.0_amd64.deb", "stable"),
            Some(RepositoryPath::Pool("hello_1.0_amd64.deb".into()))
        );
        assert_eq!(
            RepositoryPath::parse("public.asc", "stable"),
            Some(RepositoryPath::PublicKey)
        );

        for unknown in [
            "dists/unstable/Release",
            "dists/stable/Sources",
            "dists/stable/main/binary-/Packages",
            "dists/stable/main/binary-amd64/Packages.bz2",
            "dists/stable/contrib/binary-amd64/Packages",
            "pool/main/",
            "pool/main/a/b.deb",
            "pool/mainx/a.deb",
            "index.html",
        ] {
            assert_eq!(RepositoryPath::parse(unknown, "stable"), None, "{}", unknown);
        }

        for path in [
            RepositoryPath::Release,
            RepositoryPath::Packages {
                architecture: "amd64".into(),
                compression: Compression::Gzip,
            },
            RepositoryPath::Pool("a_1_all.deb".into()),
            RepositoryPath::PublicKey,
        ] {
            assert_eq!(
                RepositoryPath::parse(&path.to_path("bookworm"), "bookworm"),
                Some(path)
            );
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = RepositoryConfig::default();
        config.components.clear();

        let err = AptRepository::new(config).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn add_and_serve() -> Result<()> {
        let repo = AptRepository::new(RepositoryConfig::default())?;

        let filename = repo.add_package(deb("hello", "1.0", "amd64")?).await?;
        assert_eq!(filename, "hello_1.0_amd64.deb");

        let record = repo.get_package(&filename).unwrap();
        assert_eq!(record.package(), "hello");
        assert!(repo.get_package("nope.deb").is_none());

        let index = repo.build_packages_index("amd64");
        assert!(index.contains("Filename: pool/main/hello_1.0_amd64.deb\n"));
        assert_eq!(repo.build_packages_index("arm64"), "");

        let release = repo.build_release()?;
        assert!(release.starts_with("Origin: DebianRepo\nLabel: DebianRepo\nSuite: stable\n"));
        assert!(release.contains(&format!(
            " {} {:>8} main/binary-amd64/Packages\n",
            crate::io::ContentDigest::compute(crate::release::ChecksumType::Sha256, index.as_bytes())
                .digest_hex(),
            index.len()
        )));

        assert_eq!(
            repo.read_path(&RepositoryPath::Pool(filename.clone()))?,
            Some(record.content().to_vec())
        );
        assert_eq!(
            repo.read_path(&RepositoryPath::Pool("missing.deb".into()))?,
            None
        );

        Ok(())
    }

    #[tokio::test]
    async fn parse_failure_leaves_catalog_unchanged() -> Result<()> {
        let store = Arc::new(MemoryPackageStore::default());
        let repo = AptRepository::new(RepositoryConfig::default())?.with_store(store.clone());

        let err = repo.add_package(b"definitely not a deb".to_vec()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Format);
        assert!(repo.catalog().is_empty());
        assert!(store.list_packages().await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn signing_requires_context() -> Result<()> {
        let repo = AptRepository::new(RepositoryConfig::default())?;

        for res in [
            repo.clear_sign_release().map(|_| ()),
            repo.detached_sign_release().map(|_| ()),
            repo.export_public_key().map(|_| ()),
            repo.signed_release().map(|_| ()),
        ] {
            let err = res.unwrap_err();
            assert!(matches!(err, RepositoryError::SigningNotConfigured));
            assert_eq!(err.category(), ErrorCategory::KeyNotFound);
        }

        Ok(())
    }

    #[tokio::test]
    async fn signed_release_verifies() -> Result<()> {
        let repo = signed_repo(RepositoryConfig::default())?;
        repo.add_package(deb("hello", "1.0", "amd64")?).await?;

        let public = repo.export_public_key()?;

        let signed = repo.signed_release()?;
        assert_eq!(verify_cleartext(&signed.inrelease, &public)?, signed.release);
        verify_detached_signature(signed.release.as_bytes(), &signed.release_gpg, &public)?;

        let inrelease = repo.clear_sign_release()?;
        let text = verify_cleartext(&inrelease, &public)?;
        assert!(text.starts_with("Origin: DebianRepo\n"));

        let release_gpg = repo.detached_sign_release()?;
        assert!(String::from_utf8_lossy(&release_gpg).starts_with("-----BEGIN PGP SIGNATURE-----"));

        Ok(())
    }

    #[tokio::test]
    async fn store_round_trip() -> Result<()> {
        let store = Arc::new(MemoryPackageStore::default());

        let repo = AptRepository::new(RepositoryConfig::default())?.with_store(store.clone());
        repo.add_package(deb("hello", "1.0", "amd64")?).await?;
        repo.add_package(deb("hello", "2.0", "amd64")?).await?;
        repo.add_package(deb("world", "1.0", "arm64")?).await?;

        store
            .write_package("broken", "broken_1.0_amd64.deb", b"garbage")
            .await?;

        assert_eq!(
            store.list_packages().await?,
            vec![
                "broken/broken_1.0_amd64.deb",
                "hello/hello_1.0_amd64.deb",
                "hello/hello_2.0_amd64.deb",
                "world/world_1.0_arm64.deb",
            ]
        );

        let restored = AptRepository::new(RepositoryConfig::default())?.with_store(store);
        assert_eq!(restored.load_from_store().await?, 3);
        assert_eq!(restored.catalog().len(), 3);
        assert_eq!(
            restored.build_packages_index("amd64"),
            repo.build_packages_index("amd64")
        );

        // Loading again replaces records in place.
        assert_eq!(restored.load_from_store().await?, 3);
        assert_eq!(restored.catalog().len(), 3);

        Ok(())
    }

    #[tokio::test]
    async fn from_config_attaches_store_and_key() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let key_path = temp.path().join("key.asc");
        std::fs::write(&key_path, test_key_pair().0.to_armored_string(None)?)?;

        let config = RepositoryConfig {
            package_store: Some(temp.path().join("store")),
            signing_key_path: Some(key_path),
            signing_key_passphrase_env: "APT_REPO_TEST_UNSET_PASSPHRASE".into(),
            ..Default::default()
        };

        let repo = AptRepository::from_config(config.clone())?;
        assert!(repo.signing_context().is_some());
        repo.add_package(deb("hello", "1.0", "amd64")?).await?;
        assert!(temp
            .path()
            .join("store/hello/hello_1.0_amd64.deb")
            .is_file());

        let restored = AptRepository::from_config(config)?;
        assert_eq!(restored.load_from_store().await?, 1);

        let missing = RepositoryConfig {
            signing_key_path: Some(temp.path().join("missing.asc")),
            ..Default::default()
        };
        let err = AptRepository::from_config(missing).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Io);

        Ok(())
    }

    #[tokio::test]
    async fn publish_signed_tree() -> Result<()> {
        let temp = tempfile::tempdir()?;

        let config = RepositoryConfig {
            architectures: vec!["amd64".into(), "arm64".into()],
            index_compressions: vec![Compression::Gzip],
            ..Default::default()
        };

        let repo = signed_repo(config)?;
        repo.add_package(deb("hello", "1.0", "amd64")?).await?;
        repo.add_package(deb("world", "1.0", "arm64")?).await?;

        repo.publish_to_directory(temp.path()).await?;

        let root = temp.path();
        assert_eq!(
            std::fs::read(root.join("pool/main/hello_1.0_amd64.deb"))?,
            repo.get_package("hello_1.0_amd64.deb").unwrap().content()
        );
        assert!(root.join("pool/main/world_1.0_arm64.deb").is_file());

        let packages = std::fs::read_to_string(root.join("dists/stable/main/binary-amd64/Packages"))?;
        assert_eq!(packages, repo.build_packages_index("amd64"));

        let mut decoded = String::new();
        libflate::gzip::Decoder::new(std::fs::File::open(
            root.join("dists/stable/main/binary-arm64/Packages.gz"),
        )?)?
        .read_to_string(&mut decoded)?;
        assert_eq!(decoded, repo.build_packages_index("arm64"));

        let release = std::fs::read_to_string(root.join("dists/stable/Release"))?;
        assert!(release.contains("main/binary-arm64/Packages.gz\n"));

        let public = std::fs::read(root.join("public.asc"))?;
        let inrelease = std::fs::read_to_string(root.join("dists/stable/InRelease"))?;
        assert_eq!(verify_cleartext(&inrelease, &public)?, release);
        verify_detached_signature(
            release.as_bytes(),
            &std::fs::read(root.join("dists/stable/Release.gpg"))?,
            &public,
        )?;

        Ok(())
    }

    #[tokio::test]
    async fn publish_unsigned_tree() -> Result<()> {
        let temp = tempfile::tempdir()?;

        let repo = AptRepository::new(RepositoryConfig::default())?;
        repo.add_package(deb("hello", "1.0", "amd64")?).await?;
        repo.publish_to_directory(temp.path()).await?;

        assert!(temp.path().join("dists/stable/Release").is_file());
        assert!(!temp.path().join("dists/stable/InRelease").exists());
        assert!(!temp.path().join("public.asc").exists());

        Ok(())
    }
}
