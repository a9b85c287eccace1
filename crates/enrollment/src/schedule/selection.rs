use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{CourseId, SectionId};

/// What a toggle did to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Selected,
    Replaced { previous: SectionId },
    Deselected,
}

/// The student's in-progress choice of at most one section per course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollmentSelection {
    chosen: BTreeMap<CourseId, SectionId>,
}

impl EnrollmentSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choosing the section already held by `course` clears it; anything else replaces it.
    pub fn toggle(&mut self, course: CourseId, section: SectionId) -> SelectionChange {
        match self.chosen.get(&course).copied() {
            Some(current) if current == section => {
                self.chosen.remove(&course);
                SelectionChange::Deselected
            }
            Some(previous) => {
                self.chosen.insert(course, section);
                SelectionChange::Replaced { previous }
            }
            None => {
                self.chosen.insert(course, section);
                SelectionChange::Selected
            }
        }
    }

    pub fn section_for(&self, course: CourseId) -> Option<SectionId> {
        self.chosen.get(&course).copied()
    }

    pub fn contains_section(&self, section: SectionId) -> bool {
        self.chosen.values().any(|chosen| *chosen == section)
    }

    /// Selected section ids ordered by course id.
    pub fn section_ids(&self) -> Vec<SectionId> {
        self.chosen.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CourseId, SectionId)> + '_ {
        self.chosen
            .iter()
            .map(|(course, section)| (*course, *section))
    }

    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }

    pub fn clear(&mut self) {
        self.chosen.clear();
    }
}
