// ── Guest identity allocation ──
//
// Picks unused guest ids from a snapshot of the cluster inventory. The
// snapshot is fetched fresh for every allocation and the result is only
// advisory: another client can take the id before our create lands.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Numeric guest id. Ids below 100 are reserved by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct GuestId(u32);

impl GuestId {
    pub const MIN: u32 = 100;
    pub const MAX: u32 = 999_999_999;

    pub fn new(id: u32) -> Result<Self, CoreError> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(Self(id))
        } else {
            Err(CoreError::ValidationFailed {
                field: Some("vmid".into()),
                message: format!(
                    "guest id {id} is outside {}..={}",
                    Self::MIN,
                    Self::MAX
                ),
            })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for GuestId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().parse().map_err(|_| CoreError::ValidationFailed {
            field: Some("vmid".into()),
            message: format!("'{s}' is not a guest id"),
        })?;
        Self::new(id)
    }
}

impl TryFrom<u32> for GuestId {
    type Error = CoreError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<GuestId> for u32 {
    fn from(id: GuestId) -> Self {
        id.0
    }
}

/// Allocation view over one inventory snapshot.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    in_use: BTreeSet<u32>,
}

impl IdAllocator {
    pub fn from_inventory(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            in_use: ids.into_iter().collect(),
        }
    }

    pub fn exists(&self, id: GuestId) -> bool {
        self.in_use.contains(&id.get())
    }

    /// First id at or above `starting_from` (never below the reserved
    /// floor) that the snapshot does not contain.
    pub fn next_free(&self, starting_from: u32) -> Result<GuestId, CoreError> {
        let floor = starting_from.max(GuestId::MIN);
        let mut candidate = floor;
        for &used in self.in_use.range(floor..) {
            if used != candidate {
                break;
            }
            candidate += 1;
        }
        GuestId::new(candidate).map_err(|_| CoreError::ValidationFailed {
            field: Some("start".into()),
            message: format!(
                "no free guest id at or above {floor} (highest is {})",
                GuestId::MAX
            ),
        })
    }

    /// Highest id in use, or the floor when the cluster has no guests.
    pub fn max(&self) -> GuestId {
        GuestId(
            self.in_use
                .last()
                .copied()
                .filter(|id| *id >= GuestId::MIN)
                .unwrap_or(GuestId::MIN),
        )
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}
