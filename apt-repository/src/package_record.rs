// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary packages held by a repository. */

use {
    crate::{
        control::{ControlField, ControlParagraph},
        deb::extract_control_fields,
        error::{RepositoryError, Result},
        io::{ContentDigest, MultiContentDigest},
        release::ChecksumType,
        repository::pool_path,
        store::validate_path_component,
    },
    std::{borrow::Cow, io::Write},
};

/// Fields synthesized into `Packages` paragraphs from the `.deb` content itself.
///
/// Values for these fields found in the control file are not echoed.
pub const SYNTHESIZED_FIELDS: &[&str; 5] = &["Filename", "Size", "MD5sum", "SHA1", "SHA256"];

/// An uploaded `.deb` and the metadata derived from it.
///
/// Instances are immutable. Digests and identity are computed once at construction.
///
/// Two records describe the same logical package iff their [Self::filename()] is equal.
#[derive(Clone, Debug)]
pub struct PackageRecord {
    content: Vec<u8>,
    control: ControlParagraph<'static>,
    package: String,
    version: String,
    architecture: String,
    digests: MultiContentDigest,
    filename: String,
}

fn required_field(control: &ControlParagraph, name: &'static str) -> Result<String> {
    control
        .field_str(name)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or(RepositoryError::ControlRequiredFieldMissing(name))
}

impl PackageRecord {
    /// Construct an instance by parsing `.deb` file content.
    pub fn from_deb_bytes(content: Vec<u8>) -> Result<Self> {
        let control = extract_control_fields(&content)?;

        Self::new(content, control)
    }

    /// Construct an instance from `.deb` content and its already parsed control fields.
    ///
    /// Errors if `Package`, `Version` or `Architecture` is missing or empty, or if
    /// they don't form a usable filename.
    pub fn new(content: Vec<u8>, control: ControlParagraph<'static>) -> Result<Self> {
        let package = required_field(&control, "Package")?;
        let version = required_field(&control, "Version")?;
        let architecture = required_field(&control, "Architecture")?;

        validate_path_component(&package)?;
        let filename = format!("{}_{}_{}.deb", package, version, architecture);
        validate_path_component(&filename)?;
        let digests = MultiContentDigest::compute(&content);

        Ok(Self {
            content,
            control,
            package,
            version,
            architecture,
            digests,
            filename,
        })
    }

    /// The raw `.deb` content.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The control fields, in parse order.
    pub fn control(&self) -> &ControlParagraph<'static> {
        &self.control
    }

    /// The `Package` field value.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> &str {
        &self.version
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// The `Maintainer` field.
    pub fn maintainer(&self) -> Option<&str> {
        self.control.field_str("Maintainer")
    }

    /// The `Description` field.
    pub fn description(&self) -> Option<&str> {
        self.control.field_str("Description")
    }

    /// The `Source` field.
    pub fn source(&self) -> Option<&str> {
        self.control.field_str("Source")
    }

    /// The `Section` field.
    pub fn section(&self) -> Option<&str> {
        self.control.field_str("Section")
    }

    /// The `Priority` field.
    pub fn priority(&self) -> Option<&str> {
        self.control.field_str("Priority")
    }

    /// The `Installed-Size` field, parsed to a [u64].
    pub fn installed_size(&self) -> Option<Result<u64>> {
        self.control.field_u64("Installed-Size")
    }

    /// Size in bytes of the `.deb`.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Obtain the digest of the `.deb` content of a given flavor.
    pub fn digest(&self, checksum: ChecksumType) -> &ContentDigest {
        self.digests.digest_from_checksum(checksum)
    }

    /// Lowercase hex MD5 of the `.deb` content.
    pub fn md5_hex(&self) -> String {
        self.digests.md5.digest_hex()
    }

    /// Lowercase hex SHA-1 of the `.deb` content.
    pub fn sha1_hex(&self) -> String {
        self.digests.sha1.digest_hex()
    }

    /// Lowercase hex SHA-256 of the `.deb` content.
    pub fn sha256_hex(&self) -> String {
        self.digests.sha256.digest_hex()
    }

    /// The `<package>_<version>_<architecture>.deb` filename of this package.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Path of this package relative to the repository root.
    pub fn pool_path(&self) -> String {
        pool_path(&self.filename)
    }

    /// Obtain the paragraph describing this package in a `Packages` file.
    ///
    /// Non-empty control fields come first in parse order, followed by the
    /// synthesized `Filename`, `Size` and digest fields.
    pub fn index_paragraph(&self) -> ControlParagraph<'_> {
        let mut para = ControlParagraph::default();

        for field in self.control.iter_fields().filter(|f| {
            !f.value_str().is_empty() && !SYNTHESIZED_FIELDS.iter().any(|name| f.is_named(name))
        }) {
            para.set_field(ControlField::new(
                Cow::Borrowed(field.name()),
                Cow::Borrowed(field.value_str()),
            ));
        }

        para.set_field_from_string("Filename".into(), self.pool_path().into());
        para.set_field_from_string("Size".into(), self.size().to_string().into());
        for checksum in [ChecksumType::Md5, ChecksumType::Sha1, ChecksumType::Sha256] {
            para.set_field_from_string(
                checksum.packages_field_name().into(),
                self.digest(checksum).digest_hex().into(),
            );
        }

        para
    }

    /// Write the `Packages` paragraph of this package, including its terminating empty line.
    pub fn write_index_paragraph<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.index_paragraph().write(writer)?;
        writer.write_all(b"\n")
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            deb::{testutil::*, DebCompression},
            error::ErrorCategory,
        },
        indoc::indoc,
        sha2::Digest,
    };

    #[test]
    fn identity_and_digests() -> Result<()> {
        let deb = deb("hello", "2.10-2", "amd64")?;

        let record = PackageRecord::from_deb_bytes(deb.clone())?;

        assert_eq!(record.package(), "hello");
        assert_eq!(record.version_str(), "2.10-2");
        assert_eq!(record.architecture(), "amd64");
        assert_eq!(record.maintainer(), Some("Someone <someone@example.com>"));
        assert_eq!(record.description(), Some("test package"));
        assert_eq!(record.filename(), "hello_2.10-2_amd64.deb");
        assert_eq!(record.pool_path(), "pool/main/hello_2.10-2_amd64.deb");
        assert_eq!(record.size(), deb.len() as u64);
        assert_eq!(record.content(), &deb[..]);

        assert_eq!(record.md5_hex(), hex::encode(md5::Md5::digest(&deb)));
        assert_eq!(record.sha1_hex(), hex::encode(sha1::Sha1::digest(&deb)));
        assert_eq!(record.sha256_hex(), hex::encode(sha2::Sha256::digest(&deb)));

        Ok(())
    }

    #[test]
    fn optional_fields() -> Result<()> {
        let deb = deb_with_compression(
            indoc! {"
                Package: hello
                Source: hello-src
                Version: 1.0
                Architecture: all
                Section: devel
                Priority: optional
                Installed-Size: 1024
            "},
            DebCompression::Xz,
        )?;

        let record = PackageRecord::from_deb_bytes(deb)?;
        assert_eq!(record.source(), Some("hello-src"));
        assert_eq!(record.section(), Some("devel"));
        assert_eq!(record.priority(), Some("optional"));
        assert_eq!(record.installed_size().transpose()?, Some(1024));
        assert_eq!(record.maintainer(), None);

        Ok(())
    }

    #[test]
    fn missing_required_fields() -> Result<()> {
        for (control, missing) in [
            ("Version: 1.0\nArchitecture: amd64\n", "Package"),
            ("Package: hello\nArchitecture: amd64\n", "Version"),
            ("Package: hello\nVersion: 1.0\n", "Architecture"),
            ("Package: hello\nVersion:\nArchitecture: amd64\n", "Version"),
        ] {
            let deb = deb_with_compression(control, DebCompression::Gzip)?;

            let err = PackageRecord::from_deb_bytes(deb).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::MissingField);
            assert!(
                matches!(err, RepositoryError::ControlRequiredFieldMissing(name) if name == missing)
            );
        }

        Ok(())
    }

    #[test]
    fn unusable_filename() -> Result<()> {
        let deb = deb_with_compression(
            "Package: ../evil\nVersion: 1.0\nArchitecture: amd64\n",
            DebCompression::Gzip,
        )?;

        let err = PackageRecord::from_deb_bytes(deb).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Format);

        let deb = deb_with_compression(
            "Package: hello\nVersion: 1.0/2\nArchitecture: amd64\n",
            DebCompression::Gzip,
        )?;
        assert!(PackageRecord::from_deb_bytes(deb).is_err());

        Ok(())
    }

    #[test]
    fn index_paragraph() -> Result<()> {
        let deb = deb_with_compression(
            indoc! {"
                Package: hello
                Version: 1.0
                Architecture: amd64
                Homepage:
                Size: 1
                Description: greeting
                 Says hello.
            "},
            DebCompression::Gzip,
        )?;

        let record = PackageRecord::from_deb_bytes(deb)?;

        let mut buf = vec![];
        record.write_index_paragraph(&mut buf)?;

        assert_eq!(
            String::from_utf8_lossy(&buf),
            format!(
                "Package: hello\nVersion: 1.0\nArchitecture: amd64\nDescription: greeting\n Says hello.\n\
                Filename: pool/main/hello_1.0_amd64.deb\nSize: {}\nMD5sum: {}\nSHA1: {}\nSHA256: {}\n\n",
                record.size(),
                record.md5_hex(),
                record.sha1_hex(),
                record.sha256_hex()
            )
        );

        Ok(())
    }
}
