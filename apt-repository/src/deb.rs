// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading control metadata out of `.deb` files.

A `.deb` is an `ar` archive holding a `debian-binary` member, a
`control.tar[.<ext>]` member and a `data.tar[.<ext>]` member. Only the control
archive is of interest here: [extract_control_fields()] walks the `ar` members,
decompresses the first `control.tar*` member and parses its `control` entry into
a [ControlParagraph].

The compression of the control archive is detected from its leading bytes, not
from the member name.
*/

use {
    crate::{
        control::ControlParagraph,
        error::{RepositoryError, Result},
        io::Compression,
    },
    std::io::{Cursor, Read},
};

/// Magic bytes starting every `ar` archive.
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Compression format for archives within `.deb` files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// Gzip compression.
    Gzip,
    /// XZ compression.
    Xz,
    /// Zstandard compression.
    Zstandard,
}

impl DebCompression {
    /// Detect the compression of a stream from its leading bytes.
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.starts_with(&[0xfd, b'7']) {
            Ok(Self::Xz)
        } else if data.starts_with(&[0x1f, 0x8b]) {
            Ok(Self::Gzip)
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Ok(Self::Zstandard)
        } else {
            Err(RepositoryError::DebUnknownCompression(hex::encode(
                &data[0..data.len().min(4)],
            )))
        }
    }

    /// Filename extension for archives in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
            Self::Zstandard => ".zst",
        }
    }

    /// Fully decompress data in this format.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader: Box<dyn Read + '_> = match self {
            Self::Gzip => {
                Box::new(libflate::gzip::Decoder::new(data).map_err(RepositoryError::DebDecompress)?)
            }
            Self::Xz => Box::new(xz2::read::XzDecoder::new(data)),
            Self::Zstandard => {
                Box::new(zstd::Decoder::new(data).map_err(RepositoryError::DebDecompress)?)
            }
        };

        let mut decompressed = vec![];
        reader
            .read_to_end(&mut decompressed)
            .map_err(RepositoryError::DebDecompress)?;

        Ok(decompressed)
    }

    /// Compress data in this format.
    ///
    /// Gzip and XZ output matches [Compression::compress()].
    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => Compression::Gzip.compress(data),
            Self::Xz => Compression::Xz.compress(data),
            Self::Zstandard => zstd::encode_all(data, 3),
        }
    }
}

const AR_HEADER_SIZE: usize = 60;

/// Obtain the raw bytes of the first `control.tar*` member of a `.deb` archive.
///
/// Member headers are read field by field. Only the name and size fields are
/// interpreted, so blank or space padded timestamps, owners and modes are accepted.
pub fn control_archive_bytes(data: &[u8]) -> Result<Vec<u8>> {
    if !data.starts_with(AR_MAGIC) {
        return Err(RepositoryError::DebBadMagic);
    }

    let mut offset = AR_MAGIC.len();

    while offset < data.len() {
        let header = data
            .get(offset..offset + AR_HEADER_SIZE)
            .ok_or_else(|| {
                RepositoryError::DebMalformedMember(format!(
                    "truncated member header at offset {}",
                    offset
                ))
            })?;
        offset += AR_HEADER_SIZE;

        // Member names should be ASCII. Some writers pad them with NULs.
        let name = String::from_utf8_lossy(&header[0..16]);
        let name = name.trim_matches(|c: char| c.is_whitespace() || c == '\0');

        let size_field = String::from_utf8_lossy(&header[48..58]);
        let size = size_field.trim().parse::<usize>().map_err(|_| {
            RepositoryError::DebMalformedMember(format!(
                "{} has invalid size {:?}",
                name,
                size_field.trim()
            ))
        })?;

        let member = offset
            .checked_add(size)
            .and_then(|end| data.get(offset..end))
            .ok_or_else(|| {
                RepositoryError::DebMalformedMember(format!("{} is truncated", name))
            })?;

        if name.starts_with("control.tar") {
            return Ok(member.to_vec());
        }

        // Member data is aligned to even offsets.
        offset += size + size % 2;
    }

    Err(RepositoryError::DebControlArchiveNotFound)
}

/// Find the `control` file within an uncompressed control tar archive.
///
/// The first non-directory entry whose path ends with `control` is returned.
pub fn control_file_from_tar(data: &[u8]) -> Result<String> {
    let mut archive = tar::Archive::new(Cursor::new(data));

    for entry in archive.entries().map_err(RepositoryError::DebControlTar)? {
        let mut entry = entry.map_err(RepositoryError::DebControlTar)?;

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let is_control = entry
            .path()
            .map_err(RepositoryError::DebControlTar)?
            .to_string_lossy()
            .ends_with("control");

        if is_control {
            let mut content = vec![];
            entry
                .read_to_end(&mut content)
                .map_err(RepositoryError::DebControlTar)?;

            return Ok(String::from_utf8_lossy(&content).to_string());
        }
    }

    Err(RepositoryError::DebControlFileNotFound)
}

/// Extract the control fields of a `.deb` file.
///
/// Fields are returned in the order they appear in the `control` file.
pub fn extract_control_fields(data: &[u8]) -> Result<ControlParagraph<'static>> {
    let compressed = control_archive_bytes(data)?;
    let compression = DebCompression::detect(&compressed)?;
    let tar_data = compression.decompress(&compressed)?;

    Ok(ControlParagraph::parse_str(&control_file_from_tar(
        &tar_data,
    )?))
}


#[cfg(test)]
mod tests {
    use {
        super::{testutil::*, *},
        crate::error::ErrorCategory,
        indoc::indoc,
    };

    const CONTROL: &str = indoc! {"
        Package: hello
        Version: 2.10-2
        Architecture: amd64
        Maintainer: Someone <someone@example.com>
        Installed-Size: 280
        Description: example package based on GNU hello
         The GNU hello program produces a familiar, friendly greeting.
    "};

    fn field_pairs(p: &ControlParagraph) -> Vec<(String, String)> {
        p.iter_fields()
            .map(|f| (f.name().to_string(), f.value_str().to_string()))
            .collect()
    }

    #[test]
    fn extract_gzip() -> Result<()> {
        let deb = deb_with_compression(CONTROL, DebCompression::Gzip)?;

        let fields = extract_control_fields(&deb)?;

        assert_eq!(
            field_pairs(&fields),
            vec![
                ("Package".into(), "hello".into()),
                ("Version".into(), "2.10-2".into()),
                ("Architecture".into(), "amd64".into()),
                ("Maintainer".into(), "Someone <someone@example.com>".into()),
                ("Installed-Size".into(), "280".into()),
                (
                    "Description".into(),
                    "example package based on GNU hello\n The GNU hello program produces a familiar, friendly greeting.".into()
                ),
            ]
        );

        Ok(())
    }

    #[test]
    fn extract_all_compressions() -> Result<()> {
        let expected = ControlParagraph::parse_str(CONTROL);

        for compression in [
            DebCompression::Gzip,
            DebCompression::Xz,
            DebCompression::Zstandard,
        ] {
            let deb = deb_with_compression(CONTROL, compression)?;
            assert_eq!(extract_control_fields(&deb)?, expected, "{:?}", compression);
        }

        Ok(())
    }

    #[test]
    fn detect_compression() {
        assert_eq!(
            DebCompression::detect(&[0xfd, b'7', b'z', b'X']).unwrap(),
            DebCompression::Xz
        );
        assert_eq!(
            DebCompression::detect(&[0x1f, 0x8b, 0x08]).unwrap(),
            DebCompression::Gzip
        );
        assert_eq!(
            DebCompression::detect(&[0x28, 0xb5, 0x2f, 0xfd, 0x00]).unwrap(),
            DebCompression::Zstandard
        );
        assert!(DebCompression::detect(&[]).is_err());
        assert!(DebCompression::detect(&[0x28, 0xb5]).is_err());
    }

    #[test]
    fn compression_shared_with_indices() -> std::io::Result<()> {
        let data = CONTROL.as_bytes();

        assert_eq!(
            DebCompression::Gzip.compress(data)?,
            Compression::Gzip.compress(data)?
        );
        assert_eq!(
            DebCompression::Xz.compress(data)?,
            Compression::Xz.compress(data)?
        );

        Ok(())
    }

    #[test]
    fn bad_magic() {
        let res = extract_control_fields(b"not an ar archive at all");
        assert!(matches!(res, Err(RepositoryError::DebBadMagic)));
        assert_eq!(res.unwrap_err().category(), ErrorCategory::Format);

        assert!(matches!(
            extract_control_fields(b""),
            Err(RepositoryError::DebBadMagic)
        ));
    }

    #[test]
    fn no_control_archive() -> Result<()> {
        let deb = ar_with_members(&[("debian-binary", b"2.0\n"), ("data.tar.gz", b"")])?;

        assert!(matches!(
            extract_control_fields(&deb),
            Err(RepositoryError::DebControlArchiveNotFound)
        ));

        assert!(matches!(
            extract_control_fields(AR_MAGIC),
            Err(RepositoryError::DebControlArchiveNotFound)
        ));

        Ok(())
    }

    #[test]
    fn unsupported_compression() -> Result<()> {
        let deb = ar_with_members(&[
            ("debian-binary", b"2.0\n"),
            ("control.tar.gz", &[0x00, 0x00, 0x01, 0x02]),
        ])?;

        let res = extract_control_fields(&deb);
        assert!(matches!(res, Err(RepositoryError::DebUnknownCompression(_))));
        assert_eq!(
            res.unwrap_err().category(),
            ErrorCategory::UnsupportedCompression
        );

        Ok(())
    }

    #[test]
    fn corrupt_compressed_stream() -> Result<()> {
        let deb = ar_with_members(&[
            ("debian-binary", b"2.0\n"),
            ("control.tar.xz", &[0xfd, b'7', b'z', b'X', b'Z', 0x00, 0xff, 0xff]),
        ])?;

        let res = extract_control_fields(&deb);
        assert_eq!(res.unwrap_err().category(), ErrorCategory::Format);

        Ok(())
    }

    #[test]
    fn no_control_file() -> Result<()> {
        let tar = tar_only(&[("./md5sums", b"")])?;
        let deb = ar_with_members(&[
            ("debian-binary", b"2.0\n"),
            ("control.tar.gz", &DebCompression::Gzip.compress(&tar)?),
        ])?;

        assert!(matches!(
            extract_control_fields(&deb),
            Err(RepositoryError::DebControlFileNotFound)
        ));

        Ok(())
    }

    /// A raw ar member with the given header fields.
    fn raw_member(name: &str, mtime: &str, mode: &str, size: &str, data: &[u8]) -> Vec<u8> {
        let mut member = format!(
            "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
            name, mtime, "0", "0", mode, size
        )
        .into_bytes();
        assert_eq!(member.len(), 60);

        member.extend_from_slice(data);
        if data.len() % 2 == 1 {
            member.push(b'\n');
        }

        member
    }

    /// A `.deb` whose member headers use the given mtime, mode and size padding.
    fn deb_with_header_fields(mtime: &str, mode: &str, size_padding: &str) -> Result<Vec<u8>> {
        let deb = deb_with_compression(CONTROL, DebCompression::Gzip)?;
        let control_tar = control_archive_bytes(&deb)?;

        let mut deb = AR_MAGIC.to_vec();
        deb.extend(raw_member(
            "debian-binary",
            mtime,
            mode,
            &format!("{}4", size_padding),
            b"2.0\n",
        ));
        deb.extend(raw_member(
            "control.tar.gz",
            mtime,
            mode,
            &format!("{}{}", size_padding, control_tar.len()),
            &control_tar,
        ));

        Ok(deb)
    }

    #[test]
    fn blank_member_mtime() -> Result<()> {
        let deb = deb_with_header_fields("", "100644", "")?;

        assert_eq!(
            extract_control_fields(&deb)?,
            ControlParagraph::parse_str(CONTROL)
        );

        Ok(())
    }

    #[test]
    fn blank_member_mode() -> Result<()> {
        let deb = deb_with_header_fields("1700000000", "", "")?;

        assert_eq!(
            extract_control_fields(&deb)?,
            ControlParagraph::parse_str(CONTROL)
        );

        Ok(())
    }

    #[test]
    fn space_padded_member_size() -> Result<()> {
        let deb = deb_with_header_fields("1700000000", "100644", "  ")?;

        assert_eq!(
            extract_control_fields(&deb)?,
            ControlParagraph::parse_str(CONTROL)
        );

        Ok(())
    }

    #[test]
    fn malformed_member_size() {
        for size in ["12x4", "", "-1"] {
            let mut deb = AR_MAGIC.to_vec();
            deb.extend(raw_member("control.tar.gz", "0", "644", size, &[0u8; 16]));

            let res = extract_control_fields(&deb);
            assert!(
                matches!(res, Err(RepositoryError::DebMalformedMember(_))),
                "size {:?}",
                size
            );
        }
    }

    #[test]
    fn truncated_members() {
        let mut deb = AR_MAGIC.to_vec();
        deb.extend(raw_member("control.tar.gz", "0", "644", "16", &[0u8; 16]));
        deb.truncate(deb.len() - 1);
        assert!(matches!(
            extract_control_fields(&deb),
            Err(RepositoryError::DebMalformedMember(_))
        ));

        let mut deb = AR_MAGIC.to_vec();
        deb.extend_from_slice(b"debian-binary   0");
        assert!(matches!(
            extract_control_fields(&deb),
            Err(RepositoryError::DebMalformedMember(_))
        ));
    }

    #[test]
    fn odd_sized_members_are_padded() -> Result<()> {
        let deb = deb_with_compression(CONTROL, DebCompression::Gzip)?;
        let control_tar = control_archive_bytes(&deb)?;

        // A 3 byte first member forces a padding byte before the control archive.
        let deb = ar_with_members(&[("debian-bin", b"2.0"), ("control.tar.gz", &control_tar)])?;

        assert_eq!(
            extract_control_fields(&deb)?,
            ControlParagraph::parse_str(CONTROL)
        );

        Ok(())
    }
}
