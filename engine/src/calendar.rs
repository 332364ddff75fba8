//! Dose map construction.
//!
//! The calendar is flattened into one descriptor per (vaccine, dose number).
//! Entries are consumed in the order the repository returns them; that order
//! matters whenever a dose assignment leaves its dose number out.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::models::{AgeUnit, CalendarEntry, Vaccine};

/// Age window of one vaccine dose, copied from the calendar entry defining it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseDescriptor {
    pub calendar_id: Uuid,
    pub age_unit: AgeUnit,
    pub specific_age: Option<i32>,
    pub min_age: i32,
    pub max_age: Option<i32>,
}

impl DoseDescriptor {
    fn from_entry(entry: &CalendarEntry) -> Self {
        Self {
            calendar_id: entry.id,
            age_unit: entry.age_unit,
            specific_age: entry.specific_age,
            min_age: entry.min_age,
            max_age: entry.max_age,
        }
    }
}

/// vaccine id -> dose number -> descriptor, doses in ascending order
pub type DoseMap = BTreeMap<Uuid, BTreeMap<i32, DoseDescriptor>>;

/// A (vaccine, dose) pair defined by more than one calendar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseCollision {
    pub vaccine_id: Uuid,
    pub dose: i32,
    /// Entry whose definition was discarded
    pub replaced_calendar_id: Uuid,
    /// Entry whose definition is kept
    pub calendar_id: Uuid,
}

/// Builds the dose map from calendar entries
#[derive(Debug, Default)]
pub struct DoseMapBuilder {
    doses: DoseMap,
    counters: HashMap<Uuid, i32>,
    collisions: Vec<DoseCollision>,
}

impl DoseMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: &CalendarEntry) {
        let descriptor = DoseDescriptor::from_entry(entry);

        for assignment in &entry.doses {
            let vaccine_id = assignment.vaccine.id;
            let dose = match assignment.dose_number {
                Some(number) => number.max(1),
                None => {
                    let counter = self.counters.entry(vaccine_id).or_insert(0);
                    *counter += 1;
                    *counter
                }
            };

            let previous = self
                .doses
                .entry(vaccine_id)
                .or_default()
                .insert(dose, descriptor);

            if let Some(previous) = previous {
                self.collisions.push(DoseCollision {
                    vaccine_id,
                    dose,
                    replaced_calendar_id: previous.calendar_id,
                    calendar_id: descriptor.calendar_id,
                });
            }
        }
    }

    pub fn extend<'a>(&mut self, entries: impl IntoIterator<Item = &'a CalendarEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn finish(self) -> (DoseMap, Vec<DoseCollision>) {
        (self.doses, self.collisions)
    }
}

/// Builds the dose map for `entries`, later definitions of a pair winning
pub fn build_dose_map(entries: &[CalendarEntry]) -> DoseMap {
    let mut builder = DoseMapBuilder::new();
    builder.extend(entries);
    builder.finish().0
}

/// Everything a rebuild needs from the calendar, computed once and shared
/// read-only between children.
#[derive(Debug, Clone, Default)]
pub struct CalendarSnapshot {
    entry_count: usize,
    doses: DoseMap,
    vaccines: HashMap<Uuid, Vaccine>,
    collisions: Vec<DoseCollision>,
}

impl CalendarSnapshot {
    pub fn build(entries: &[CalendarEntry]) -> Self {
        let mut builder = DoseMapBuilder::new();
        builder.extend(entries);
        let (doses, collisions) = builder.finish();

        let vaccines = entries
            .iter()
            .flat_map(|entry| entry.doses.iter())
            .map(|assignment| (assignment.vaccine.id, assignment.vaccine.clone()))
            .collect();

        for collision in &collisions {
            tracing::warn!(
                vaccine_id = %collision.vaccine_id,
                dose = collision.dose,
                kept = %collision.calendar_id,
                replaced = %collision.replaced_calendar_id,
                "dose defined by more than one calendar entry"
            );
        }

        Self {
            entry_count: entries.len(),
            doses,
            vaccines,
            collisions,
        }
    }

    /// No calendar entries at all, as opposed to entries without doses
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn dose_map(&self) -> &DoseMap {
        &self.doses
    }

    pub fn vaccine(&self, vaccine_id: &Uuid) -> Option<&Vaccine> {
        self.vaccines.get(vaccine_id)
    }

    pub fn collisions(&self) -> &[DoseCollision] {
        &self.collisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoseAssignment;

    fn vaccine(id: u128) -> Vaccine {
        Vaccine {
            id: Uuid::from_u128(id),
            name: format!("vaccine-{id}"),
            gender: None,
            doses_required: 3,
        }
    }

    fn entry(id: u128, unit: AgeUnit, doses: Vec<(Vaccine, Option<i32>)>) -> CalendarEntry {
        CalendarEntry {
            id: Uuid::from_u128(id),
            age_unit: unit,
            specific_age: None,
            min_age: 0,
            max_age: Some(6),
            doses: doses
                .into_iter()
                .map(|(vaccine, dose_number)| DoseAssignment {
                    vaccine,
                    dose_number,
                })
                .collect(),
        }
    }

    #[test]
    fn test_explicit_dose_numbers() {
        let v = vaccine(1);
        let map = build_dose_map(&[
            entry(10, AgeUnit::Weeks, vec![(v.clone(), Some(2))]),
            entry(11, AgeUnit::Months, vec![(v.clone(), Some(1))]),
        ]);

        let doses = &map[&v.id];
        assert_eq!(doses.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(doses[&1].calendar_id, Uuid::from_u128(11));
        assert_eq!(doses[&1].age_unit, AgeUnit::Months);
        assert_eq!(doses[&2].calendar_id, Uuid::from_u128(10));
    }

    #[test]
    fn test_dose_number_is_at_least_one() {
        let v = vaccine(1);
        let map = build_dose_map(&[entry(10, AgeUnit::Days, vec![(v.clone(), Some(-4))])]);

        assert!(map[&v.id].contains_key(&1));
    }

    #[test]
    fn test_missing_dose_numbers_follow_processing_order() {
        let a = vaccine(1);
        let b = vaccine(2);
        let map = build_dose_map(&[
            entry(10, AgeUnit::Weeks, vec![(a.clone(), None), (b.clone(), None)]),
            entry(11, AgeUnit::Weeks, vec![(a.clone(), None)]),
            entry(12, AgeUnit::Months, vec![(a.clone(), None), (b.clone(), None)]),
        ]);

        assert_eq!(map[&a.id][&1].calendar_id, Uuid::from_u128(10));
        assert_eq!(map[&a.id][&2].calendar_id, Uuid::from_u128(11));
        assert_eq!(map[&a.id][&3].calendar_id, Uuid::from_u128(12));
        assert_eq!(map[&b.id][&1].calendar_id, Uuid::from_u128(10));
        assert_eq!(map[&b.id][&2].calendar_id, Uuid::from_u128(12));
    }

    #[test]
    fn test_counter_ignores_explicit_numbers() {
        let v = vaccine(1);
        let map = build_dose_map(&[
            entry(10, AgeUnit::Weeks, vec![(v.clone(), Some(1))]),
            entry(11, AgeUnit::Weeks, vec![(v.clone(), None)]),
        ]);

        // the inferred number restarts at 1 and replaces the explicit definition
        assert_eq!(map[&v.id].len(), 1);
        assert_eq!(map[&v.id][&1].calendar_id, Uuid::from_u128(11));
    }

    #[test]
    fn test_later_definition_wins_and_is_reported() {
        let v = vaccine(1);
        let snapshot = CalendarSnapshot::build(&[
            entry(10, AgeUnit::Weeks, vec![(v.clone(), Some(1))]),
            entry(11, AgeUnit::Years, vec![(v.clone(), Some(1))]),
        ]);

        assert_eq!(snapshot.dose_map()[&v.id][&1].age_unit, AgeUnit::Years);
        assert_eq!(
            snapshot.collisions(),
            &[DoseCollision {
                vaccine_id: v.id,
                dose: 1,
                replaced_calendar_id: Uuid::from_u128(10),
                calendar_id: Uuid::from_u128(11),
            }]
        );
    }

    #[test]
    fn test_snapshot_of_entries_without_doses_is_not_empty() {
        let snapshot = CalendarSnapshot::build(&[entry(10, AgeUnit::Weeks, vec![])]);

        assert!(!snapshot.is_empty());
        assert!(snapshot.dose_map().is_empty());
        assert!(CalendarSnapshot::build(&[]).is_empty());
    }

    #[test]
    fn test_snapshot_keeps_vaccine_metadata() {
        let v = vaccine(7);
        let snapshot =
            CalendarSnapshot::build(&[entry(10, AgeUnit::Weeks, vec![(v.clone(), None)])]);

        assert_eq!(snapshot.vaccine(&v.id), Some(&v));
        assert_eq!(snapshot.entry_count(), 1);
    }
}
