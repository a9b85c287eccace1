//! Pairwise schedule conflict detection over the current selection.

use std::collections::{BTreeSet, HashMap};

use super::domain::{ScheduleSlot, Section, SectionId};
use super::selection::EnrollmentSelection;

/// Two slots overlap when they share a weekday and their intervals intersect.
/// Touching intervals (`a.end == b.start`) do not overlap.
pub fn slots_overlap(a: &ScheduleSlot, b: &ScheduleSlot) -> bool {
    let shares_day = a
        .days
        .iter()
        .any(|day| b.days.iter().any(|other| other.id == day.id));

    shares_day && a.start < b.end && a.end > b.start
}

pub fn sections_conflict(a: &Section, b: &Section) -> bool {
    a.slots
        .iter()
        .any(|slot| b.slots.iter().any(|other| slots_overlap(slot, other)))
}

/// Every pair of selected sections whose schedules collide, lower id first.
///
/// Selected ids missing from `sections` have no known schedule and are skipped.
pub fn conflict_pairs(
    selection: &EnrollmentSelection,
    sections: &[Section],
) -> Vec<(SectionId, SectionId)> {
    let by_id: HashMap<SectionId, &Section> =
        sections.iter().map(|section| (section.id, section)).collect();

    let selected: Vec<&Section> = selection
        .section_ids()
        .into_iter()
        .filter_map(|id| by_id.get(&id).copied())
        .collect();

    let mut pairs = Vec::new();
    for (index, first) in selected.iter().enumerate() {
        for second in &selected[index + 1..] {
            if first.id != second.id && sections_conflict(first, second) {
                pairs.push((first.id.min(second.id), first.id.max(second.id)));
            }
        }
    }
    pairs
}

/// Selected section ids that clash with at least one other selected section.
///
/// Always recomputed from scratch; selections are small.
pub fn conflicting_sections(
    selection: &EnrollmentSelection,
    sections: &[Section],
) -> BTreeSet<SectionId> {
    conflict_pairs(selection, sections)
        .into_iter()
        .flat_map(|(first, second)| [first, second])
        .collect()
}
