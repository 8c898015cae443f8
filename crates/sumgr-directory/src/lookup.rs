use std::sync::Arc;
use sumgr_contracts::models::{AppRecord, DirectorySnapshot, PackageIdentity};
use tokio::sync::watch;

/// Read handle over the records of the last published snapshot, for label
/// and icon lookups outside the directory screen.
#[derive(Clone)]
pub struct RecordLookup {
    receiver: watch::Receiver<Arc<DirectorySnapshot>>,
}

impl RecordLookup {
    pub(crate) fn new(receiver: watch::Receiver<Arc<DirectorySnapshot>>) -> Self {
        Self { receiver }
    }

    pub fn records(&self) -> Arc<Vec<AppRecord>> {
        Arc::clone(&self.receiver.borrow().all_records)
    }

    /// First record with this package name, primary user first.
    pub fn find(&self, package_name: &str) -> Option<AppRecord> {
        let records = self.records();
        records
            .iter()
            .filter(|record| record.package_name() == package_name)
            .min_by_key(|record| record.user_index())
            .cloned()
    }

    pub fn find_identity(&self, identity: &PackageIdentity) -> Option<AppRecord> {
        self.records()
            .iter()
            .find(|record| &record.identity == identity)
            .cloned()
    }
}
