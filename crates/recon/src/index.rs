//! Catalog index: in-memory mirror of the cross-identification catalog.
//!
//! Entries are keyed by coordinate pair (the primary identity key) and by
//! identifier-set membership. Identifier lookups are case-insensitive
//! substring matches over the pipe-delimited identifier set, with runs of
//! whitespace collapsed on both sides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::coords::{parsecs_to_light_years, CoordPair};
use crate::names::collapse_whitespace;

/// One row as delivered by the cross-identification service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossIdRow {
    pub main_id: String,
    #[serde(rename = "ra")]
    pub ra_deg: Option<f64>,
    #[serde(rename = "dec")]
    pub dec_deg: Option<f64>,
    #[serde(rename = "dist")]
    pub distance: Option<f64>,
    #[serde(rename = "unit", default)]
    pub distance_unit: Option<String>,
    #[serde(rename = "mag")]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub ids: String,
}

impl CrossIdRow {
    /// Distance normalized to parsecs. Unknown units count as missing.
    pub fn distance_pc(&self) -> Option<f64> {
        let value = self.distance.filter(|d| d.is_finite() && *d > 0.0)?;
        let unit = self.distance_unit.as_deref().map(str::trim).unwrap_or("pc");
        match unit {
            "" | "pc" => Some(value),
            "kpc" => Some(value * 1_000.0),
            "Mpc" => Some(value * 1_000_000.0),
            other => {
                log::debug!("{}: unknown distance unit '{other}'", self.main_id);
                None
            }
        }
    }

    pub fn coordinates(&self) -> Option<CoordPair> {
        CoordPair::from_degrees(self.ra_deg?, self.dec_deg?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossIdEntry {
    pub name: String,
    pub coordinates: CoordPair,
    pub distance_pc: Option<f64>,
    pub magnitude: Option<f64>,
    /// Synonyms, in catalog order. Grows through [`CatalogIndex::merge_synonym`].
    pub identifiers: Vec<String>,
}

impl CrossIdEntry {
    pub fn from_row(row: &CrossIdRow) -> Option<Self> {
        let coordinates = row.coordinates()?;
        let mut identifiers: Vec<String> = row
            .ids
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let main_id = row.main_id.trim();
        if !main_id.is_empty() && !identifiers.iter().any(|i| i == main_id) {
            identifiers.insert(0, main_id.to_string());
        }
        Some(Self {
            name: main_id.to_string(),
            coordinates,
            distance_pc: row.distance_pc(),
            magnitude: row.magnitude.filter(|m| m.is_finite()),
            identifiers,
        })
    }

    pub fn distance_ly(&self) -> Option<f64> {
        self.distance_pc.map(parsecs_to_light_years)
    }

    /// Pipe-delimited identifier set.
    pub fn ids(&self) -> String {
        self.identifiers.join("|")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(EntryId),
    /// The coordinate pair was already indexed; the row was dropped.
    Duplicate(EntryId),
}

impl InsertOutcome {
    pub fn id(&self) -> EntryId {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(EntryId),
    NotFound,
    /// More than one entry survived disambiguation.
    Ambiguous(Vec<EntryId>),
}

#[derive(Debug)]
struct Slot {
    entry: CrossIdEntry,
    /// Lowercased, whitespace-collapsed `ids()`.
    haystack: String,
}

#[derive(Debug, Default)]
pub struct CatalogIndex {
    slots: Vec<Slot>,
    by_coords: HashMap<CoordPair, EntryId>,
    by_token: HashMap<String, Vec<EntryId>>,
}

fn fold(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &CrossIdEntry {
        &self.slots[id.0].entry
    }

    pub fn insert(&mut self, entry: CrossIdEntry) -> InsertOutcome {
        if let Some(&existing) = self.by_coords.get(&entry.coordinates) {
            log::debug!(
                "duplicate cross-id entry '{}' at {} (kept '{}')",
                entry.name,
                entry.coordinates,
                self.entry(existing).name
            );
            return InsertOutcome::Duplicate(existing);
        }

        let id = EntryId(self.slots.len());
        for ident in &entry.identifiers {
            self.by_token.entry(fold(ident)).or_default().push(id);
        }
        self.by_coords.insert(entry.coordinates, id);
        let haystack = fold(&entry.ids());
        self.slots.push(Slot { entry, haystack });
        InsertOutcome::Inserted(id)
    }

    /// Index one service row. `None` when the row has no usable coordinates.
    pub fn ingest_row(&mut self, row: &CrossIdRow) -> Option<InsertOutcome> {
        CrossIdEntry::from_row(row).map(|entry| self.insert(entry))
    }

    pub fn lookup_by_coordinates(&self, coordinates: &CoordPair) -> Option<EntryId> {
        self.by_coords.get(coordinates).copied()
    }

    /// Entries with `search_key` somewhere in their identifier set.
    pub fn lookup_by_identifier(&self, search_key: &str) -> Vec<EntryId> {
        let key = fold(search_key);
        if key.is_empty() {
            return Vec::new();
        }
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.haystack.contains(&key))
            .map(|(i, _)| EntryId(i))
            .collect()
    }

    /// Identifier lookup that never guesses.
    ///
    /// Every substring candidate, even a lone one, is re-filtered: the key must
    /// be a complete identifier, or be followed by a non-digit, so `A-12` does
    /// not select `A-123`.
    pub fn resolve_identifier(&self, search_key: &str) -> Lookup {
        let candidates = self.lookup_by_identifier(search_key);
        if candidates.is_empty() {
            return Lookup::NotFound;
        }

        let key = fold(search_key);
        let exact = self.by_token.get(&key);
        let survivors: Vec<EntryId> = candidates
            .into_iter()
            .filter(|id| {
                exact.is_some_and(|ids| ids.contains(id))
                    || followed_by_non_digit(&self.slots[id.0].haystack, &key)
            })
            .collect();

        match survivors.len() {
            1 => Lookup::Found(survivors[0]),
            0 => {
                log::debug!("identifier '{search_key}': no candidate survived disambiguation");
                Lookup::NotFound
            }
            _ => Lookup::Ambiguous(survivors),
        }
    }

    /// Add `identifier` to an existing entry's synonym set. Returns false when
    /// it was already present.
    pub fn merge_synonym(&mut self, id: EntryId, identifier: &str) -> bool {
        let identifier = collapse_whitespace(identifier);
        if identifier.is_empty() {
            return false;
        }
        let folded = fold(&identifier);
        let slot = &mut self.slots[id.0];
        if slot.entry.identifiers.iter().any(|i| fold(i) == folded) {
            return false;
        }
        log::debug!("merge synonym '{identifier}' into '{}'", slot.entry.name);
        slot.entry.identifiers.push(identifier);
        slot.haystack = fold(&slot.entry.ids());
        self.by_token.entry(folded).or_default().push(id);
        true
    }

    /// Fold an online discovery back into the index so later lookups in the
    /// same run hit locally. An entry already holding the row's coordinates,
    /// or sharing one of its identifiers, absorbs `queried_as` as a synonym;
    /// otherwise the row becomes a new entry.
    pub fn absorb_discovery(&mut self, row: &CrossIdRow, queried_as: &str) -> Option<EntryId> {
        let entry = CrossIdEntry::from_row(row)?;

        let existing = self.lookup_by_coordinates(&entry.coordinates).or_else(|| {
            entry
                .identifiers
                .iter()
                .find_map(|ident| self.by_token.get(&fold(ident)).and_then(|ids| ids.first()))
                .copied()
        });

        let id = match existing {
            Some(id) => id,
            None => self.insert(entry).id(),
        };
        self.merge_synonym(id, queried_as);
        Some(id)
    }
}

fn followed_by_non_digit(haystack: &str, key: &str) -> bool {
    haystack.match_indices(key).any(|(pos, m)| {
        haystack[pos + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_digit())
    })
}
