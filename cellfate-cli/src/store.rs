//! JSON tracking store
//!
//! One file per plate. Each position lists its tracked objects, the
//! parent → child links between them and the detected events:
//!
//! ```json
//! {
//!   "positions": [
//!     {
//!       "well": "A01",
//!       "site": 1,
//!       "objects": [{ "id": 1, "time_index": 0, "label": 1 }],
//!       "links": [[1, 2]],
//!       "events": [[1, 2, 3, 4, 5]]
//!     }
//!   ]
//! }
//! ```
//!
//! Positions are parsed one at a time; a position that does not parse is
//! reported as corrupt and the rest of the plate is still used.

use cellfate_hmm::{HmmError, Label, LineageLookup, ObjectId, TrackingStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that make a whole plate file unusable
#[derive(Debug, Error)]
pub enum StoreLoadError {
    #[error("Failed to read store {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store {path:?} is not a valid plate file: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct PlateFile {
    positions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PositionRecord {
    well: String,
    site: u32,
    objects: Vec<ObjectRecord>,
    #[serde(default)]
    links: Vec<(ObjectId, ObjectId)>,
    #[serde(default)]
    events: Vec<Vec<ObjectId>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ObjectRecord {
    id: ObjectId,
    time_index: u32,
    label: Label,
}

/// Well and site of a position
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PositionKey {
    pub well: String,
    pub site: u32,
}

impl PositionKey {
    /// Column name used in tabular output, e.g. `A01_03`
    pub fn column_name(&self) -> String {
        format!("{}_{:02}", self.well, self.site)
    }
}

/// A position that could not be read
#[derive(Debug, Clone, Serialize)]
pub struct CorruptPosition {
    /// Index in the plate file's position list
    pub index: usize,
    pub reason: String,
}

/// One position held in memory
#[derive(Debug, Clone)]
pub struct PositionStore {
    index: usize,
    key: PositionKey,
    objects: HashMap<ObjectId, ObjectRecord>,
    links: HashMap<ObjectId, Vec<ObjectId>>,
    events: Vec<Vec<ObjectId>>,
}

impl PositionStore {
    fn from_record(index: usize, record: PositionRecord) -> Result<Self, String> {
        let mut objects = HashMap::with_capacity(record.objects.len());
        for object in record.objects {
            if objects.insert(object.id, object).is_some() {
                return Err(format!("duplicate object id {}", object.id));
            }
        }

        let mut links: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for (parent, child) in record.links {
            links.entry(parent).or_default().push(child);
        }

        Ok(Self {
            index,
            key: PositionKey {
                well: record.well,
                site: record.site,
            },
            objects,
            links,
            events: record.events,
        })
    }

    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    /// Index in the plate file's position list
    pub fn index(&self) -> usize {
        self.index
    }

    fn object(&self, id: ObjectId) -> cellfate_hmm::Result<&ObjectRecord> {
        self.objects.get(&id).ok_or_else(|| {
            HmmError::store(format!(
                "{}: unknown object {}",
                self.key.column_name(),
                id
            ))
        })
    }
}

impl LineageLookup for PositionStore {
    fn descendants(&self, id: ObjectId) -> cellfate_hmm::Result<Vec<ObjectId>> {
        Ok(self.links.get(&id).cloned().unwrap_or_default())
    }
}

impl TrackingStore for PositionStore {
    fn events(&self) -> cellfate_hmm::Result<Vec<Vec<ObjectId>>> {
        Ok(self.events.clone())
    }

    fn time_index(&self, id: ObjectId) -> cellfate_hmm::Result<u32> {
        Ok(self.object(id)?.time_index)
    }

    fn class_labels(&self, ids: &[ObjectId]) -> cellfate_hmm::Result<Vec<Label>> {
        ids.iter().map(|&id| Ok(self.object(id)?.label)).collect()
    }
}

/// All readable positions of one plate
#[derive(Debug, Clone)]
pub struct PlateStore {
    pub positions: Vec<PositionStore>,
    pub corrupt: Vec<CorruptPosition>,
}

impl PlateStore {
    /// Load a plate file
    pub fn load(path: &Path) -> Result<Self, StoreLoadError> {
        let content = fs::read_to_string(path).map_err(|source| StoreLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| StoreLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse plate file content
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: PlateFile = serde_json::from_str(content)?;

        let mut positions = Vec::with_capacity(file.positions.len());
        let mut corrupt = Vec::new();
        for (index, value) in file.positions.into_iter().enumerate() {
            let parsed = serde_json::from_value::<PositionRecord>(value)
                .map_err(|e| e.to_string())
                .and_then(|record| PositionStore::from_record(index, record));
            match parsed {
                Ok(position) => positions.push(position),
                Err(reason) => {
                    log::warn!("Position {} is corrupt, skipping: {}", index, reason);
                    corrupt.push(CorruptPosition { index, reason });
                }
            }
        }

        Ok(Self { positions, corrupt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLATE: &str = r#"{
        "positions": [
            {
                "well": "B02",
                "site": 3,
                "objects": [
                    { "id": 1, "time_index": 0, "label": 1 },
                    { "id": 2, "time_index": 1, "label": 1 },
                    { "id": 3, "time_index": 2, "label": 2 },
                    { "id": 4, "time_index": 3, "label": 3 }
                ],
                "links": [[1, 2], [2, 3], [3, 4]],
                "events": [[1, 2]]
            },
            { "well": "B02", "site": 4, "objects": "broken" },
            {
                "well": "B03",
                "site": 1,
                "objects": [
                    { "id": 7, "time_index": 0, "label": 1 },
                    { "id": 7, "time_index": 1, "label": 1 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_corrupt_positions_are_skipped() {
        let plate = PlateStore::from_json(PLATE).unwrap();
        assert_eq!(plate.positions.len(), 1);

        let indices: Vec<usize> = plate.corrupt.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(plate.corrupt[1].reason.contains("duplicate object id 7"));
    }

    #[test]
    fn test_position_lookup() {
        let plate = PlateStore::from_json(PLATE).unwrap();
        let position = &plate.positions[0];

        assert_eq!(position.key().column_name(), "B02_03");
        assert_eq!(position.index(), 0);
        assert_eq!(position.events().unwrap(), vec![vec![1, 2]]);
        assert_eq!(position.descendants(2).unwrap(), vec![3]);
        assert!(position.descendants(4).unwrap().is_empty());
        assert_eq!(position.time_index(3).unwrap(), 2);
        assert_eq!(position.class_labels(&[1, 3, 4]).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            position.class_labels(&[1, 99]),
            Err(HmmError::StoreError(_))
        ));
    }

    #[test]
    fn test_unreadable_plate() {
        let err = PlateStore::load(Path::new("/nonexistent/plate.json")).unwrap_err();
        assert!(matches!(err, StoreLoadError::Read { .. }));
        assert!(PlateStore::from_json("{ not json").is_err());
    }
}
