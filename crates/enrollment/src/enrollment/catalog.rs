use std::collections::HashSet;

use serde::Serialize;

use crate::schedule::{Course, CourseId, Section};

/// A chosen course and the sections offered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseSections {
    pub course: Course,
    pub sections: Vec<Section>,
}

impl CourseSections {
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }
}

/// Groups a flat section listing under the chosen courses, in the order they were chosen.
///
/// Every chosen course gets an entry; one with no offered sections gets a placeholder
/// course record and an empty list. Sections of courses that were not chosen are dropped.
pub fn group_sections_by_course(course_ids: &[CourseId], sections: &[Section]) -> Vec<CourseSections> {
    let mut seen = HashSet::new();
    course_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .map(|course_id| {
            let offered: Vec<Section> = sections
                .iter()
                .filter(|section| section.course_id() == Some(course_id))
                .cloned()
                .collect();
            let course = offered
                .iter()
                .find_map(|section| section.course.clone())
                .unwrap_or_else(|| Course::without_sections(course_id));
            CourseSections {
                course,
                sections: offered,
            }
        })
        .collect()
}

/// All sections across the grouping, for conflict checks.
pub fn flatten_sections(groups: &[CourseSections]) -> Vec<Section> {
    groups
        .iter()
        .flat_map(|group| group.sections.iter().cloned())
        .collect()
}
