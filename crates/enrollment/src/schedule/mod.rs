//! Course, section and schedule data plus pure conflict detection.

pub mod conflict;
pub mod domain;
pub mod selection;

pub use conflict::{conflict_pairs, conflicting_sections, sections_conflict, slots_overlap};
pub use domain::{
    BuildingModule, ClockTime, Course, CourseId, Instructor, Room, ScheduleError, ScheduleSlot,
    Section, SectionId, SectionLabel, Weekday,
};
pub use selection::{EnrollmentSelection, SelectionChange};
