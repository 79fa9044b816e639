// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Coarse classification of [RepositoryError] values.
///
/// Transports map these onto their own failure responses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCategory {
    /// Input is not a well-formed `.deb` archive.
    Format,
    /// The control archive uses a compression we can't decode.
    UnsupportedCompression,
    /// A required control field is absent.
    MissingField,
    /// No usable signing key is available.
    KeyNotFound,
    /// Key file or package store I/O failed.
    Io,
    /// A PGP operation failed.
    Signing,
    /// The repository configuration is invalid.
    Configuration,
}

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("not a deb archive: bad ar magic")]
    DebBadMagic,

    #[error("malformed ar member in deb archive: {0}")]
    DebMalformedMember(String),

    #[error("no control archive found")]
    DebControlArchiveNotFound,

    #[error("no control file found")]
    DebControlFileNotFound,

    #[error("unknown compression in deb archive file: {0}")]
    DebUnknownCompression(String),

    #[error("error decompressing control archive: {0:?}")]
    DebDecompress(std::io::Error),

    #[error("error reading control archive: {0:?}")]
    DebControlTar(std::io::Error),

    #[error("required field missing in binary package control file: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("no signing key found in keyring")]
    SigningKeyNotFound,

    #[error("repository has no signing key configured")]
    SigningNotConfigured,

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),

    #[error("invalid path component: {0}")]
    InvalidPathComponent(String),

    #[error("invalid repository configuration: {0}")]
    Config(String),
}

impl RepositoryError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DebBadMagic
            | Self::DebMalformedMember(_)
            | Self::DebControlArchiveNotFound
            | Self::DebControlFileNotFound
            | Self::DebDecompress(_)
            | Self::DebControlTar(_)
            | Self::ParseInt(_)
            | Self::InvalidPathComponent(_) => ErrorCategory::Format,
            Self::DebUnknownCompression(_) => ErrorCategory::UnsupportedCompression,
            Self::ControlRequiredFieldMissing(_) => ErrorCategory::MissingField,
            Self::SigningKeyNotFound | Self::SigningNotConfigured => ErrorCategory::KeyNotFound,
            Self::Io(_) | Self::RepositoryIoPath(_, _) => ErrorCategory::Io,
            Self::Pgp(_) | Self::SignatureVerification(_) => ErrorCategory::Signing,
            Self::Config(_) => ErrorCategory::Configuration,
        }
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;
