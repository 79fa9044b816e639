// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file generation.

`Release` files (or `InRelease` if it contains a PGP cleartext signature) are
the main definition of a Debian repository. They are a control paragraph that
defines repository-level metadata as well as a list of additional *indices* files
that further define the content of the repository.

[ReleaseBuilder] renders the `Release` body for the packages held by a
[PackageCatalog]. The body lists the `Packages` index of every architecture
once per checksum flavor. Indices are regenerated on every call so the listed
digests always describe what the catalog serves at that moment.
*/

use {
    crate::{
        catalog::PackageCatalog,
        config::RepositoryConfig,
        error::Result,
        io::{Compression, ContentDigest},
        repository::{packages_index_path, COMPONENT},
    },
    chrono::{DateTime, Utc},
    pgp_cleartext::CleartextHasher,
};

/// Formatter string for dates in release files.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Checksum flavors listed in generated `Release` files, in emission order.
pub const RELEASE_CHECKSUMS: &[ChecksumType; 2] = &[ChecksumType::Md5, ChecksumType::Sha256];

/// Checksum flavors used by repository files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// Name of the control field in `Release` files holding this variant type.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Name of the field in `Packages` paragraphs holding this variant type.
    pub fn packages_field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Obtain a new hasher for this checksum flavor.
    pub fn new_hasher(&self) -> Box<dyn pgp::crypto::Hasher + Send> {
        Box::new(match self {
            Self::Md5 => CleartextHasher::md5(),
            Self::Sha1 => CleartextHasher::sha1(),
            Self::Sha256 => CleartextHasher::sha256(),
        })
    }
}

/// Format a date the way `Release` files carry it.
pub fn format_release_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Builds `Release` file bodies.
#[derive(Clone, Debug)]
pub struct ReleaseBuilder {
    origin: String,
    label: String,
    suite: String,
    codename: String,
    index_compressions: Vec<Compression>,
}

impl Default for ReleaseBuilder {
    fn default() -> Self {
        Self::from_config(&RepositoryConfig::default())
    }
}

impl ReleaseBuilder {
    /// Construct an instance from repository configuration.
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self {
            origin: config.origin.clone(),
            label: config.label.clone(),
            suite: config.suite.clone(),
            codename: config.codename.clone(),
            index_compressions: config.compressed_index_variants().collect(),
        }
    }

    /// Set the `Origin` field value.
    pub fn set_origin(&mut self, value: impl ToString) {
        self.origin = value.to_string();
    }

    /// Set the `Label` field value.
    pub fn set_label(&mut self, value: impl ToString) {
        self.label = value.to_string();
    }

    /// Set the `Suite` field value.
    pub fn set_suite(&mut self, value: impl ToString) {
        self.suite = value.to_string();
    }

    /// Set the `Codename` field value.
    pub fn set_codename(&mut self, value: impl ToString) {
        self.codename = value.to_string();
    }

    /// Add a compressed `Packages` variant to list after every plain `Packages` entry.
    pub fn add_index_compression(&mut self, compression: Compression) {
        if compression != Compression::None && !self.index_compressions.contains(&compression) {
            self.index_compressions.push(compression);
        }
    }

    /// The `Suite` field value.
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Build a `Release` body dated now.
    pub fn build(
        &self,
        catalog: &PackageCatalog,
        architectures: &[String],
        components: &[String],
    ) -> Result<String> {
        self.build_at(catalog, architectures, components, Utc::now())
    }

    /// Build a `Release` body with an explicit `Date` value.
    ///
    /// Every architecture gets its `Packages` index rendered from the catalog;
    /// the digest and size of that text are listed under each checksum section.
    pub fn build_at(
        &self,
        catalog: &PackageCatalog,
        architectures: &[String],
        components: &[String],
        date: DateTime<Utc>,
    ) -> Result<String> {
        // (path, content) of every index file in listing order.
        let mut indices = vec![];

        for arch in architectures {
            let plain = catalog.build_index(arch).into_bytes();

            let compressed = self
                .index_compressions
                .iter()
                .map(|compression| -> Result<(String, Vec<u8>)> {
                    Ok((
                        format!(
                            "{}{}",
                            packages_index_path(COMPONENT, arch),
                            compression.extension()
                        ),
                        compression.compress(&plain)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;

            indices.push((packages_index_path(COMPONENT, arch), plain));
            indices.extend(compressed);
        }

        let mut body = String::new();
        body.push_str(&format!("Origin: {}\n", self.origin));
        body.push_str(&format!("Label: {}\n", self.label));
        body.push_str(&format!("Suite: {}\n", self.suite));
        body.push_str(&format!("Codename: {}\n", self.codename));
        body.push_str(&format!("Date: {}\n", format_release_date(&date)));
        body.push_str(&format!("Architectures: {}\n", architectures.join(" ")));
        body.push_str(&format!("Components: {}\n", components.join(" ")));

        for checksum in RELEASE_CHECKSUMS {
            body.push_str(checksum.field_name());
            body.push_str(":\n");

            for (path, content) in &indices {
                body.push_str(&format!(
                    " {} {:>8} {}\n",
                    ContentDigest::compute(*checksum, content).digest_hex(),
                    content.len(),
                    path
                ));
            }
        }

        Ok(body)
    }
}
