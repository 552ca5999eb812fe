//! Region records and the snapshot they are persisted in

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Key the nationwide aggregate is stored under in the snapshot file
pub const TOTAL_KEY: &str = "Total";

/// One column of a region record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LocalCases,
    ImportedCases,
    Recovered,
    Deaths,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::LocalCases,
        Field::ImportedCases,
        Field::Recovered,
        Field::Deaths,
    ];

    /// Heading used in change messages
    pub fn label(&self) -> &'static str {
        match self {
            Field::LocalCases => "Indian Cases",
            Field::ImportedCases => "Foreign Cases",
            Field::Recovered => "Cured",
            Field::Deaths => "Deaths",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Field::LocalCases => 0,
            Field::ImportedCases => 1,
            Field::Recovered => 2,
            Field::Deaths => 3,
        }
    }
}

/// Counts for one region, ordered `[local, imported, recovered, deaths]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionRecord(pub [u64; 4]);

impl RegionRecord {
    pub fn get(&self, field: Field) -> u64 {
        self.0[field.index()]
    }

    /// Signed `self - older` for every field that differs. Widened so any
    /// pair of `u64` counts has an exact difference.
    pub fn deltas_from(&self, older: &RegionRecord) -> Vec<(Field, i128)> {
        Field::ALL
            .iter()
            .filter(|f| self.get(**f) != older.get(**f))
            .map(|f| (*f, i128::from(self.get(*f)) - i128::from(older.get(*f))))
            .collect()
    }
}

impl fmt::Display for RegionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "[{}, {}, {}, {}]", a, b, c, d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub record: RegionRecord,
}

/// Every region on the page plus the nationwide aggregate.
///
/// Regions keep page order. On disk this is a single JSON object keyed by
/// region name with the aggregate stored last under [`TOTAL_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    regions: Vec<Region>,
    pub total: RegionRecord,
}

impl Snapshot {
    pub fn new(total: RegionRecord) -> Self {
        Self {
            regions: Vec::new(),
            total,
        }
    }

    /// Insert or replace a region; a replaced region keeps its position
    pub fn insert(&mut self, name: String, record: RegionRecord) {
        match self.regions.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.record = record,
            None => self.regions.push(Region { name, record }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegionRecord> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.record)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.regions.len() + 1))?;
        for region in &self.regions {
            map.serialize_entry(&region.name, &region.record)?;
        }
        map.serialize_entry(TOTAL_KEY, &self.total)?;
        map.end()
    }
}

struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = Snapshot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object of region name to [local, imported, recovered, deaths]")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
        let mut snapshot = Snapshot::default();
        let mut total = None;
        while let Some((name, record)) = access.next_entry::<String, RegionRecord>()? {
            if name == TOTAL_KEY {
                total = Some(record);
            } else {
                snapshot.insert(name, record);
            }
        }
        snapshot.total = total.ok_or_else(|| <A::Error as de::Error>::missing_field(TOTAL_KEY))?;
        Ok(snapshot)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_only_list_changed_fields() {
        let old = RegionRecord([10, 2, 3, 0]);
        let new = RegionRecord([10, 2, 1, 4]);
        assert_eq!(
            new.deltas_from(&old),
            vec![(Field::Recovered, -2), (Field::Deaths, 4)]
        );
        assert!(new.deltas_from(&new).is_empty());
    }

    #[test]
    fn test_deltas_across_full_count_range() {
        let zero = RegionRecord([0; 4]);
        let huge = RegionRecord([u64::MAX, 0, 0, 0]);
        assert_eq!(
            huge.deltas_from(&zero),
            vec![(Field::LocalCases, u64::MAX as i128)]
        );
        assert_eq!(
            zero.deltas_from(&huge),
            vec![(Field::LocalCases, -(u64::MAX as i128))]
        );
    }

    #[test]
    fn test_snapshot_json_layout() {
        let mut snapshot = Snapshot::new(RegionRecord([9, 9, 9, 9]));
        snapshot.insert("Kerala".to_string(), RegionRecord([1, 2, 3, 4]));
        snapshot.insert("Delhi".to_string(), RegionRecord([5, 6, 7, 8]));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            json,
            r#"{"Kerala":[1,2,3,4],"Delhi":[5,6,7,8],"Total":[9,9,9,9]}"#
        );

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.regions()[0].name, "Kerala");
    }

    #[test]
    fn test_snapshot_requires_total() {
        let result = serde_json::from_str::<Snapshot>(r#"{"Kerala":[1,2,3,4]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_record_must_have_four_counts() {
        assert!(serde_json::from_str::<RegionRecord>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<RegionRecord>("[1,2,3,4,5]").is_err());
        assert!(serde_json::from_str::<RegionRecord>("[1,-2,3,4]").is_err());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut snapshot = Snapshot::default();
        snapshot.insert("A".to_string(), RegionRecord([1, 0, 0, 0]));
        snapshot.insert("B".to_string(), RegionRecord([2, 0, 0, 0]));
        snapshot.insert("A".to_string(), RegionRecord([3, 0, 0, 0]));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.regions()[0].name, "A");
        assert_eq!(snapshot.get("A"), Some(&RegionRecord([3, 0, 0, 0])));
    }

    #[test]
    fn test_record_display() {
        assert_eq!(RegionRecord([1, 22, 333, 0]).to_string(), "[1, 22, 333, 0]");
    }
}
