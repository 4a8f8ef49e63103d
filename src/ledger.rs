//! Persistent placement ledger.
//!
//! One record per confirmed deposit, stored in a Sled tree keyed by the
//! zero-padded element index so iteration order matches print order. After an
//! aborted run the ledger tells the operator where to resume and which
//! running-max height to seed the transit planner with.

use serde::{Deserialize, Serialize};

use crate::error::FabResult;

/// Default on-disk ledger location.
pub const LEDGER_PATH: &str = "clay_fab_ledger";

const PLACEMENTS_TREE: &str = "placements";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub index: usize,
    /// ISO-8601.
    pub placed_timestamp: String,
    /// Deposit height.
    pub z: f64,
}

pub struct PlacementLedger {
    db: sled::Db,
    placements: sled::Tree,
}

impl Drop for PlacementLedger {
    fn drop(&mut self) {
        if let Err(err) = self.db.flush() {
            tracing::warn!(%err, "failed to flush placement ledger on drop");
        }
    }
}

impl std::fmt::Debug for PlacementLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementLedger")
            .field("placements_len", &self.placements.len())
            .finish()
    }
}

impl PlacementLedger {
    /// Opens or creates the ledger at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> FabResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Uses an already-open Sled handle.
    pub fn from_db(db: sled::Db) -> FabResult<Self> {
        let placements = db.open_tree(PLACEMENTS_TREE)?;
        Ok(Self { db, placements })
    }

    fn key(index: usize) -> String {
        format!("{index:020}")
    }

    /// Stores a placement, replacing any earlier record for the same index.
    pub fn record(&self, record: &PlacementRecord) -> FabResult<()> {
        let value = serde_json::to_vec(record)?;
        self.placements.insert(Self::key(record.index).as_bytes(), value)?;
        self.placements.flush()?;
        Ok(())
    }

    fn decode(value: &[u8]) -> FabResult<PlacementRecord> {
        Ok(serde_json::from_slice(value)?)
    }

    /// All records in index order. Fails on the first unreadable entry.
    pub fn records(&self) -> FabResult<Vec<PlacementRecord>> {
        self.placements
            .iter()
            .map(|res| {
                let (_, v) = res?;
                Self::decode(&v)
            })
            .collect()
    }

    pub fn get(&self, index: usize) -> FabResult<Option<PlacementRecord>> {
        self.placements
            .get(Self::key(index).as_bytes())?
            .map(|v| Self::decode(&v))
            .transpose()
    }

    pub fn last_placed_index(&self) -> FabResult<Option<usize>> {
        match self.placements.last()? {
            Some((_, v)) => Ok(Some(Self::decode(&v)?.index)),
            None => Ok(None),
        }
    }

    /// First index after the last recorded placement.
    pub fn resume_index(&self) -> FabResult<usize> {
        Ok(self.last_placed_index()?.map_or(0, |i| i + 1))
    }

    /// Tallest recorded deposit.
    pub fn highest_placed_z(&self) -> FabResult<Option<f64>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| r.z)
            .fold(None, |acc, z| Some(acc.map_or(z, |m: f64| m.max(z)))))
    }

    pub fn clear(&self) -> FabResult<()> {
        self.placements.clear()?;
        self.placements.flush()?;
        Ok(())
    }
}
