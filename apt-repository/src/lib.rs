// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signed APT repositories served from uploaded `.deb` files.

This crate implements the server side of a minimal APT repository. It accepts
`.deb` packages, extracts their metadata, keeps an in-memory catalog and renders
the files APT clients fetch: `Packages` indices, the `Release` manifest and its
`InRelease` and `Release.gpg` signatures.

The canonical home of this crate is <https://github.com/indygreg/PyOxidizer>. Please file issues
and pull requests there.

# A Tour of Functionality

A `.deb` file is an `ar` archive holding a compressed `control.tar`. The [deb] module
reads the `control` file out of it with [deb::extract_control_fields()]. Control files
consist of *paragraphs* of key-value metadata, defined in the [control] module as
[control::ControlParagraph] and [control::ControlField].

[package_record::PackageRecord] wraps the content of an uploaded `.deb` along with its
identity (package name, version and architecture) and content digests. Records are held by
[catalog::PackageCatalog], keyed by filename, which renders `Packages` indices.

[release::ReleaseBuilder] renders `Release` files from a catalog. The [signing] module
signs them: [signing::SigningContext] produces cleartext signed `InRelease` documents,
detached `Release.gpg` signatures and the public key export clients trust. Keys can be
generated with the [signing_key] module.

[repository::AptRepository] ties the above together with a [config::RepositoryConfig] and
an optional [store::PackageStore] persisting uploaded content. It can also publish the
whole repository as a static directory tree.

# Determinism

Given the same catalog, `Packages` indices and the checksum sections of `Release` files are
byte-for-byte identical. Compressed indices carry no timestamps.
*/

pub mod catalog;
pub mod config;
pub mod control;
pub mod deb;
pub mod error;
pub mod io;
pub mod package_record;
pub mod release;
pub mod repository;
pub mod signing;
pub mod signing_key;
pub mod store;
