//! Snapshot encoding.
//!
//! Layout:
//!
//! ```text
//! +--------+---------+-------------------+------------------+
//! | "GHLD" | version | blake3(payload)   | postcard payload |
//! | 4 B    | u16 LE  | 32 B              | ...              |
//! +--------+---------+-------------------+------------------+
//! ```

use crate::error::{GuildError, GuildResult};
use crate::organization::Organization;
use serde::{Deserialize, Serialize};

/// Magic bytes at the start of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"GHLD";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 32;

/// Serialized form of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    pub organization: Organization,
}

impl OrganizationSnapshot {
    #[must_use]
    pub fn capture(organization: &Organization) -> Self {
        Self {
            organization: organization.clone(),
        }
    }

    #[must_use]
    pub fn into_organization(self) -> Organization {
        self.organization
    }
}

/// Encode `organization` into a self-checking snapshot.
pub fn to_snapshot_bytes(organization: &Organization) -> GuildResult<Vec<u8>> {
    let payload = postcard::to_stdvec(&OrganizationSnapshot::capture(organization))?;
    let checksum = blake3::hash(&payload);

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(checksum.as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a snapshot produced by [`to_snapshot_bytes`].
pub fn from_snapshot_bytes(bytes: &[u8]) -> GuildResult<Organization> {
    if bytes.len() < HEADER_LEN {
        return Err(GuildError::Snapshot("truncated header"));
    }
    let (magic, rest) = bytes.split_at(4);
    if magic != SNAPSHOT_MAGIC {
        return Err(GuildError::Snapshot("bad magic"));
    }
    let (version, rest) = rest.split_at(2);
    if u16::from_le_bytes([version[0], version[1]]) != SNAPSHOT_VERSION {
        return Err(GuildError::Snapshot("unsupported version"));
    }
    let (checksum, payload) = rest.split_at(32);
    if blake3::hash(payload).as_bytes() != checksum {
        return Err(GuildError::Snapshot("checksum mismatch"));
    }

    let snapshot: OrganizationSnapshot = postcard::from_bytes(payload)?;
    Ok(snapshot.into_organization())
}
