//! Star registry: the canonical store of reconciled host stars for one run.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::coords::CoordPair;
use crate::model::StarRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StarId(usize);

/// Records are created once per host and never removed; only [`clear`]
/// (the reset between runs) drops them.
///
/// [`clear`]: StarRegistry::clear
#[derive(Debug, Default)]
pub struct StarRegistry {
    records: Vec<StarRecord>,
    by_name: HashMap<String, StarId>,
}

impl StarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register a new host. A name that is already registered is rejected
    /// and the existing id returned as the error.
    pub fn insert(&mut self, record: StarRecord) -> Result<StarId, StarId> {
        if let Some(&existing) = self.by_name.get(&record.name) {
            return Err(existing);
        }
        let id = StarId(self.records.len());
        self.by_name.insert(record.name.clone(), id);
        self.records.push(record);
        Ok(id)
    }

    pub fn get(&self, id: StarId) -> &StarRecord {
        &self.records[id.0]
    }

    /// Mutable access for the merge policy. Renames must go through
    /// [`StarRegistry::rename`] so the name index stays coherent.
    pub fn get_mut(&mut self, id: StarId) -> &mut StarRecord {
        &mut self.records[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = StarId> {
        (0..self.records.len()).map(StarId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StarId, &StarRecord)> {
        self.records.iter().enumerate().map(|(i, r)| (StarId(i), r))
    }

    pub fn find_by_name(&self, name: &str) -> Option<StarId> {
        self.by_name.get(name).copied()
    }

    /// Records whose name starts with `prefix`, ignoring ASCII case. The
    /// prefix must end at the name's end or before a non-digit, so `Kepler-1`
    /// never selects `Kepler-11`. An exact name wins over longer ones.
    pub fn find_by_name_prefix(&self, prefix: &str) -> Vec<StarId> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        let mut exact = Vec::new();
        let mut longer = Vec::new();
        for (id, record) in self.iter() {
            let name = record.name.to_ascii_lowercase();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            match rest.chars().next() {
                None => exact.push(id),
                Some(c) if !c.is_ascii_digit() => longer.push(id),
                Some(_) => {}
            }
        }
        if exact.is_empty() {
            longer
        } else {
            exact
        }
    }

    /// Match on the record's own coordinates or its cross-id anchor.
    pub fn find_by_coordinates(&self, coordinates: &CoordPair) -> Option<StarId> {
        self.iter()
            .find(|(_, r)| {
                r.coordinates.as_ref() == Some(coordinates)
                    || r.crossid_anchor.as_ref() == Some(coordinates)
            })
            .map(|(id, _)| id)
    }

    /// Replace the canonical name. The old name is kept as an alternate.
    pub fn rename(&mut self, id: StarId, new_name: &str) {
        let record = &mut self.records[id.0];
        if record.name == new_name {
            return;
        }
        let old_name = std::mem::replace(&mut record.name, new_name.to_string());
        record.add_alternate_name(&old_name);
        if self.by_name.get(&old_name) == Some(&id) {
            self.by_name.remove(&old_name);
        }
        if let Some(previous) = self.by_name.insert(new_name.to_string(), id) {
            if previous != id {
                log::warn!(
                    "name '{new_name}' now used by two records; lookups return the latest rename"
                );
            }
        }
    }

    /// Records with at least `min_planets` planets, ordered by canonical name.
    pub fn publishable(&self, min_planets: u32) -> Vec<&StarRecord> {
        let mut out: Vec<&StarRecord> =
            self.records.iter().filter(|r| r.planets >= min_planets).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn planet_histogram(&self, min_planets: u32) -> BTreeMap<u32, usize> {
        let mut histogram = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.planets >= min_planets) {
            *histogram.entry(r.planets).or_insert(0) += 1;
        }
        histogram
    }

    /// Full reset between runs.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_name.clear();
    }
}

impl FromIterator<StarRecord> for StarRegistry {
    fn from_iter<I: IntoIterator<Item = StarRecord>>(iter: I) -> Self {
        let mut registry = StarRegistry::new();
        for record in iter {
            if let Err(existing) = registry.insert(record) {
                log::warn!("duplicate star '{}' dropped", registry.get(existing).name);
            }
        }
        registry
    }
}
