// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The set of packages served by a repository.

[PackageCatalog] holds [PackageRecord] instances keyed by their filename. It
is shared between concurrent handlers: a single reader/writer lock guards the
map, mutations replace whole records, and index generation snapshots the
record handles under the read lock before formatting anything.
*/

use {
    crate::{
        error::Result,
        io::Compression,
        package_record::PackageRecord,
    },
    log::{debug, info},
    std::{
        collections::{BTreeMap, BTreeSet},
        sync::{Arc, PoisonError, RwLock},
    },
};

/// A mutable collection of packages keyed by filename.
///
/// At most one record exists per filename. Inserting a record whose filename is
/// already present replaces the prior record.
#[derive(Debug, Default)]
pub struct PackageCatalog {
    packages: RwLock<BTreeMap<String, Arc<PackageRecord>>>,
}

impl PackageCatalog {
    /// Insert a record, replacing any record with the same filename.
    ///
    /// Returns the handle of the stored record and the record it replaced, if any.
    pub fn insert(&self, record: PackageRecord) -> (Arc<PackageRecord>, Option<Arc<PackageRecord>>) {
        let record = Arc::new(record);

        let previous = self
            .packages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.filename().to_string(), record.clone());

        if previous.is_some() {
            info!("replaced {}", record.filename());
        } else {
            info!("added {}", record.filename());
        }

        (record, previous)
    }

    /// Obtain a new catalog holding the records currently in this one.
    ///
    /// Record content is shared, not copied.
    pub fn frozen(&self) -> Self {
        Self {
            packages: RwLock::new(
                self.packages
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            ),
        }
    }

    /// Parse `.deb` content and add it to the catalog.
    ///
    /// Parse failures leave the catalog unchanged.
    pub fn add(&self, content: Vec<u8>) -> Result<Arc<PackageRecord>> {
        let record = PackageRecord::from_deb_bytes(content)?;

        Ok(self.insert(record).0)
    }

    /// Obtain the record with the given filename.
    pub fn get_by_filename(&self, filename: &str) -> Option<Arc<PackageRecord>> {
        self.packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filename)
            .cloned()
    }

    /// Obtain handles to every record, ordered by filename.
    pub fn snapshot(&self) -> Vec<Arc<PackageRecord>> {
        self.packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// The number of records in the catalog.
    pub fn len(&self) -> usize {
        self.packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the catalog holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct architectures of the records in the catalog.
    pub fn architectures(&self) -> BTreeSet<String> {
        self.snapshot()
            .iter()
            .map(|r| r.architecture().to_string())
            .collect()
    }

    /// Records of an architecture in index order.
    ///
    /// Ordered by package name ascending, then by version descending. Versions
    /// compare as plain strings.
    pub fn records_for_architecture(&self, architecture: &str) -> Vec<Arc<PackageRecord>> {
        let mut records = self
            .packages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.architecture() == architecture)
            .cloned()
            .collect::<Vec<_>>();

        records.sort_by(|a, b| {
            a.package()
                .cmp(b.package())
                .then_with(|| b.version_str().cmp(a.version_str()))
        });

        records
    }

    /// Build the `Packages` index text for an architecture.
    ///
    /// Empty if no record has that architecture.
    pub fn build_index(&self, architecture: &str) -> String {
        let records = self.records_for_architecture(architecture);
        debug!(
            "building {} Packages index from {} records",
            architecture,
            records.len()
        );

        let mut index = String::new();
        for record in records {
            index.push_str(&record.index_paragraph().to_string());
            index.push('\n');
        }

        index
    }

    /// Build the `Packages` index content for an architecture in a compression format.
    pub fn build_index_compressed(
        &self,
        architecture: &str,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        Ok(compression.compress(self.build_index(architecture).as_bytes())?)
    }
}
