//! Merge policy: fold one source's values into a StarRecord.
//!
//! Scalars coalesce: an incoming value lands only where the record is null,
//! zero or empty. Two fields are exempt. Distance disagreements beyond the
//! configured threshold keep the higher-precedence value and produce a
//! [`MergeConflict`]. The display-name source always overwrites the name.
//! Planet counts are never touched.

use crate::config::MergeConfig;
use crate::model::{Field, FieldSet, MergeConflict, SourceId, StarRecord};
use crate::registry::{StarId, StarRegistry};

#[derive(Debug, Clone)]
pub struct MergePolicy {
    precedence: Vec<SourceId>,
    distance_conflict_ly: f64,
    display_name_source: SourceId,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(&MergeConfig::default())
    }
}

fn is_blank_num(v: Option<f64>) -> bool {
    v.map_or(true, |x| x == 0.0 || !x.is_finite())
}

fn is_blank_str(v: Option<&str>) -> bool {
    v.map_or(true, |s| s.trim().is_empty())
}

impl MergePolicy {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            precedence: config.precedence.clone(),
            distance_conflict_ly: config.distance_conflict_ly,
            display_name_source: config.display_name_source,
        }
    }

    /// Position in the precedence list; lower wins. Unlisted sources rank last.
    pub fn rank(&self, source: SourceId) -> usize {
        self.precedence
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.precedence.len())
    }

    /// Merge `incoming` from `source` into `target`, returning any distance
    /// conflicts. Merging the same field set twice leaves the record as the
    /// first merge did.
    pub fn merge(
        &self,
        target: &mut StarRecord,
        incoming: &FieldSet,
        source: SourceId,
    ) -> Vec<MergeConflict> {
        let mut conflicts = Vec::new();

        if source == self.display_name_source {
            if let Some(name) = incoming.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                if target.name != name {
                    let old = std::mem::replace(&mut target.name, name.to_string());
                    target.add_alternate_name(&old);
                }
                target.provenance.insert(Field::Name, source);
            }
        }

        if target.coordinates.is_none() {
            if let Some(c) = incoming.coordinates {
                target.coordinates = Some(c);
                target.provenance.insert(Field::Coordinates, source);
            }
        }

        coalesce(&mut target.magnitude, incoming.magnitude, Field::Magnitude, source, &mut target.provenance);
        coalesce(&mut target.mass, incoming.mass, Field::Mass, source, &mut target.provenance);
        coalesce(&mut target.radius, incoming.radius, Field::Radius, source, &mut target.provenance);
        coalesce(&mut target.temperature, incoming.temperature, Field::Temperature, source, &mut target.provenance);
        coalesce(&mut target.age, incoming.age, Field::Age, source, &mut target.provenance);
        coalesce(&mut target.metallicity, incoming.metallicity, Field::Metallicity, source, &mut target.provenance);

        if is_blank_str(target.spectral_type.as_deref()) && !is_blank_str(incoming.spectral_type.as_deref()) {
            target.spectral_type = incoming.spectral_type.as_ref().map(|s| s.trim().to_string());
            target.provenance.insert(Field::SpectralType, source);
        }

        if let Some(conflict) = self.merge_distance(target, incoming.distance_ly, source) {
            log::warn!(
                "{}: distance {} ly ({}) vs {} ly ({}) differ by {:.1} ly; keeping {} ly",
                conflict.star,
                conflict.kept_ly,
                conflict.kept_source.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
                conflict.rejected_ly,
                conflict.rejected_source,
                conflict.difference_ly,
                conflict.kept_ly,
            );
            conflicts.push(conflict);
        }

        for alt in &incoming.alternate_names {
            target.add_alternate_name(alt);
        }

        conflicts
    }

    /// Registry-aware merge: renames go through the registry's name index.
    pub fn merge_into(
        &self,
        registry: &mut StarRegistry,
        id: StarId,
        incoming: &FieldSet,
        source: SourceId,
    ) -> Vec<MergeConflict> {
        if source == self.display_name_source {
            if let Some(name) = incoming.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                registry.rename(id, name);
            }
        }
        self.merge(registry.get_mut(id), incoming, source)
    }

    fn merge_distance(
        &self,
        target: &mut StarRecord,
        incoming: Option<f64>,
        source: SourceId,
    ) -> Option<MergeConflict> {
        if is_blank_num(incoming) {
            return None;
        }
        let incoming = incoming?;

        let current = match target.distance_ly {
            Some(d) if !is_blank_num(Some(d)) => d,
            _ => {
                target.distance_ly = Some(incoming);
                target.provenance.insert(Field::Distance, source);
                return None;
            }
        };

        let difference = (current - incoming).abs();
        if difference <= self.distance_conflict_ly {
            return None;
        }

        // Unknown provenance counts as the strongest claim: keep what is there.
        let current_source = target.provenance.get(&Field::Distance).copied();
        let incoming_wins = current_source.is_some_and(|cs| self.rank(source) < self.rank(cs));

        if incoming_wins {
            target.distance_ly = Some(incoming);
            target.provenance.insert(Field::Distance, source);
            Some(MergeConflict {
                star: target.name.clone(),
                kept_ly: incoming,
                kept_source: Some(source),
                rejected_ly: current,
                rejected_source: current_source.unwrap_or(source),
                difference_ly: difference,
            })
        } else {
            Some(MergeConflict {
                star: target.name.clone(),
                kept_ly: current,
                kept_source: current_source,
                rejected_ly: incoming,
                rejected_source: source,
                difference_ly: difference,
            })
        }
    }
}

fn coalesce(
    slot: &mut Option<f64>,
    incoming: Option<f64>,
    field: Field,
    source: SourceId,
    provenance: &mut std::collections::BTreeMap<Field, SourceId>,
) {
    if is_blank_num(*slot) && !is_blank_num(incoming) {
        *slot = incoming;
        provenance.insert(field, source);
    }
}
