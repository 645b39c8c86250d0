//! Organization snapshots stored in a redb database, keyed by name.

use crate::error::{GuildError, GuildResult};
use crate::formats::{from_snapshot_bytes, to_snapshot_bytes};
use crate::organization::Organization;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use tracing::debug;

/// name -> snapshot bytes
const ORGANIZATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("organizations");

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> GuildResult<Self> {
        let db = Database::create(path.as_ref()).map_err(redb::Error::from)?;

        let write_txn = db.begin_write().map_err(redb::Error::from)?;
        {
            let _ = write_txn
                .open_table(ORGANIZATIONS)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;

        Ok(Self { db })
    }

    /// Insert or overwrite the snapshot of `organization`.
    pub fn save(&self, organization: &Organization) -> GuildResult<()> {
        let bytes = to_snapshot_bytes(organization)?;

        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(ORGANIZATIONS)
                .map_err(redb::Error::from)?;
            table
                .insert(organization.name(), bytes.as_slice())
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;

        debug!(name = organization.name(), size = bytes.len(), "organization saved");
        Ok(())
    }

    /// Load the organization stored under `name`.
    pub fn load(&self, name: &str) -> GuildResult<Organization> {
        self.get(name)?
            .ok_or_else(|| GuildError::Storage(format!("organization not found: {name}")))
    }

    pub fn get(&self, name: &str) -> GuildResult<Option<Organization>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(ORGANIZATIONS)
            .map_err(redb::Error::from)?;
        match table.get(name).map_err(redb::Error::from)? {
            Some(guard) => from_snapshot_bytes(guard.value()).map(Some),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.get(name), Ok(Some(_)))
    }

    /// Names of all stored organizations, sorted.
    pub fn list(&self) -> GuildResult<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(ORGANIZATIONS)
            .map_err(redb::Error::from)?;

        let mut names = Vec::new();
        for entry in table.iter().map_err(redb::Error::from)? {
            let (key, _) = entry.map_err(redb::Error::from)?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}
