// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository configuration. */

use {
    crate::{
        error::{RepositoryError, Result},
        io::Compression,
        repository::COMPONENT,
    },
    serde::{Deserialize, Serialize},
    std::path::PathBuf,
};

/// Default environment variable holding the signing key passphrase.
pub const DEFAULT_PASSPHRASE_ENV: &str = "APT_REPO_SIGNING_KEY_PASSPHRASE";

fn default_origin() -> String {
    "DebianRepo".to_string()
}

fn default_suite() -> String {
    "stable".to_string()
}

fn default_architectures() -> Vec<String> {
    vec!["amd64".to_string()]
}

fn default_components() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_passphrase_env() -> String {
    DEFAULT_PASSPHRASE_ENV.to_string()
}

/// Describes a repository.
///
/// Secrets are never part of the configuration: the signing key passphrase is
/// read from the environment variable named by `signing_key_passphrase_env`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Value of the `Origin` field in `Release` files.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Value of the `Label` field in `Release` files.
    #[serde(default = "default_origin")]
    pub label: String,

    /// Value of the `Suite` field in `Release` files.
    ///
    /// Also names the `dists/<suite>` directory.
    #[serde(default = "default_suite")]
    pub suite: String,

    /// Value of the `Codename` field in `Release` files.
    #[serde(default = "default_suite")]
    pub codename: String,

    /// Architectures indexed by the repository.
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,

    /// Components advertised by the repository.
    ///
    /// Packages are only indexed under `main`, so this must be `[main]`.
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Compressed `Packages` variants to publish and list in `Release` files.
    #[serde(default)]
    pub index_compressions: Vec<Compression>,

    /// Directory holding persisted `.deb` files.
    #[serde(default)]
    pub package_store: Option<PathBuf>,

    /// Path to an armored or binary secret keyring used for signing.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,

    /// Environment variable holding the signing key passphrase.
    #[serde(default = "default_passphrase_env")]
    pub signing_key_passphrase_env: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            label: default_origin(),
            suite: default_suite(),
            codename: default_suite(),
            architectures: default_architectures(),
            components: default_components(),
            index_compressions: vec![],
            package_store: None,
            signing_key_path: None,
            signing_key_passphrase_env: default_passphrase_env(),
        }
    }
}

impl RepositoryConfig {
    /// Ensure the configuration describes a usable repository.
    pub fn validate(&self) -> Result<()> {
        if self.architectures.is_empty() {
            return Err(RepositoryError::Config(
                "at least one architecture is required".into(),
            ));
        }

        if self.components.is_empty() {
            return Err(RepositoryError::Config(
                "at least one component is required".into(),
            ));
        }

        if self.components != [COMPONENT] {
            return Err(RepositoryError::Config(format!(
                "unsupported components {:?}; only [{}] is indexed",
                self.components, COMPONENT
            )));
        }

        if self.suite.is_empty() || self.suite.contains('/') || self.suite.starts_with('.') {
            return Err(RepositoryError::Config(format!(
                "invalid suite name: {:?}",
                self.suite
            )));
        }

        for arch in &self.architectures {
            if arch.is_empty() || arch.contains(|c: char| c == '/' || c.is_whitespace()) {
                return Err(RepositoryError::Config(format!(
                    "invalid architecture: {:?}",
                    arch
                )));
            }
        }

        Ok(())
    }

    /// Distinct compressed index variants, in configuration order.
    pub fn compressed_index_variants(&self) -> impl Iterator<Item = Compression> + '_ {
        self.index_compressions
            .iter()
            .enumerate()
            .filter(move |(i, c)| {
                **c != Compression::None && !self.index_compressions[..*i].contains(c)
            })
            .map(|(_, c)| *c)
    }

    /// Resolve the signing key passphrase from the environment.
    ///
    /// An unset variable resolves to an empty passphrase.
    pub fn signing_key_passphrase(&self) -> String {
        std::env::var(&self.signing_key_passphrase_env).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn defaults() -> Result<()> {
        let config: RepositoryConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.origin, "DebianRepo");
        assert_eq!(config.label, "DebianRepo");
        assert_eq!(config.suite, "stable");
        assert_eq!(config.codename, "stable");
        assert_eq!(config.architectures, vec!["amd64"]);
        assert_eq!(config.components, vec!["main"]);
        assert!(config.index_compressions.is_empty());
        assert_eq!(
            config.signing_key_passphrase_env,
            "APT_REPO_SIGNING_KEY_PASSPHRASE"
        );
        config.validate()?;

        Ok(())
    }

    #[test]
    fn parse_full() -> Result<()> {
        let config: RepositoryConfig = serde_yaml::from_str(indoc! {"
            origin: Example
            label: Example Packages
            suite: bookworm
            codename: bookworm
            architectures: [amd64, arm64]
            components: [main]
            index_compressions: [gzip, xz, gzip]
            package_store: /srv/apt/store
            signing_key_path: /etc/apt-repo/key.asc
            signing_key_passphrase_env: KEY_PASSPHRASE
        "})
        .unwrap();

        config.validate()?;
        assert_eq!(config.label, "Example Packages");
        assert_eq!(config.architectures, vec!["amd64", "arm64"]);
        assert_eq!(
            config.compressed_index_variants().collect::<Vec<_>>(),
            vec![Compression::Gzip, Compression::Xz]
        );
        assert_eq!(config.package_store, Some(PathBuf::from("/srv/apt/store")));

        Ok(())
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(serde_yaml::from_str::<RepositoryConfig>("bogus: 1\n").is_err());
        assert!(
            serde_yaml::from_str::<RepositoryConfig>("index_compressions: [bzip2]\n").is_err()
        );
    }

    #[test]
    fn validation() {
        let mut config = RepositoryConfig::default();
        config.architectures.clear();
        assert!(config.validate().is_err());

        let mut config = RepositoryConfig::default();
        config.suite = "../escape".into();
        assert!(config.validate().is_err());

        let mut config = RepositoryConfig::default();
        config.architectures = vec!["amd 64".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn only_main_component() {
        for components in [
            vec!["main", "contrib"],
            vec!["contrib"],
            vec!["main", "main"],
            vec!["Main"],
        ] {
            let mut config = RepositoryConfig::default();
            config.components = components.iter().map(|c| c.to_string()).collect();

            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, RepositoryError::Config(_)),
                "{:?} should be rejected",
                components
            );
        }

        let config: RepositoryConfig =
            serde_yaml::from_str("components: [main, non-free]\n").unwrap();
        assert!(config.validate().is_err());
    }
}
