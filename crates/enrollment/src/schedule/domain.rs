use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub i64);

/// Identifier wrapper for offered sections of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub i64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Course reference data as served by the catalog endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "codigo", default)]
    pub code: String,
}

impl Course {
    /// Stand-in for a chosen course the backend returned no sections for.
    pub fn without_sections(id: CourseId) -> Self {
        Self {
            id,
            name: "Course without sections".to_string(),
            code: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// Human-facing section label ("SA", "Z1", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabel {
    pub id: i64,
    #[serde(rename = "sigla", alias = "nombre")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    #[serde(rename = "numero")]
    pub number: i64,
}

/// Campus building module hosting the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingModule {
    pub id: i64,
    #[serde(rename = "codigo")]
    pub code: i64,
}

/// Weekdays are compared by id; the name is display data only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekday {
    pub id: i64,
    #[serde(rename = "nombre", default)]
    pub name: String,
}

impl Weekday {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Wall-clock time of day stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    /// `24:00`, only meaningful as the end of a slot.
    pub const END_OF_DAY: ClockTime = ClockTime(24 * 60);

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::MalformedTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self(hour * 60 + minute))
    }
}

impl FromStr for ClockTime {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if matches!(trimmed, "24:00" | "24:00:00") {
            return Ok(Self::END_OF_DAY);
        }
        let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map_err(|_| ScheduleError::MalformedTime(raw.to_string()))?;
        // Seconds are dropped; slots are compared at minute resolution.
        Ok(Self((parsed.hour() * 60 + parsed.minute()) as u16))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// One recurring weekly block of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScheduleSlot")]
pub struct ScheduleSlot {
    pub id: i64,
    #[serde(rename = "horaInicio")]
    pub start: ClockTime,
    #[serde(rename = "horaFin")]
    pub end: ClockTime,
    #[serde(rename = "aula", skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(rename = "modulo", skip_serializing_if = "Option::is_none")]
    pub module: Option<BuildingModule>,
    #[serde(rename = "dias")]
    pub days: Vec<Weekday>,
}

impl ScheduleSlot {
    pub fn new(
        id: i64,
        start: ClockTime,
        end: ClockTime,
        days: Vec<Weekday>,
    ) -> Result<Self, ScheduleError> {
        if end <= start {
            return Err(ScheduleError::InvertedInterval {
                slot_id: id,
                start,
                end,
            });
        }
        Ok(Self {
            id,
            start,
            end,
            room: None,
            module: None,
            days,
        })
    }
}

#[derive(Deserialize)]
struct RawScheduleSlot {
    id: i64,
    #[serde(rename = "horaInicio")]
    start: ClockTime,
    #[serde(rename = "horaFin")]
    end: ClockTime,
    #[serde(rename = "aula", default)]
    room: Option<Room>,
    #[serde(rename = "modulo", default)]
    module: Option<BuildingModule>,
    #[serde(rename = "dias", default)]
    days: Vec<Weekday>,
}

impl TryFrom<RawScheduleSlot> for ScheduleSlot {
    type Error = ScheduleError;

    fn try_from(raw: RawScheduleSlot) -> Result<Self, Self::Error> {
        let mut slot = ScheduleSlot::new(raw.id, raw.start, raw.end, raw.days)?;
        slot.room = raw.room;
        slot.module = raw.module;
        Ok(slot)
    }
}

/// A section offered for a course, with its weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    /// Remaining seats.
    #[serde(rename = "cupos", default)]
    pub capacity: i32,
    #[serde(rename = "docente", alias = "idDocente", default)]
    pub instructor: Option<Instructor>,
    #[serde(rename = "grupo", alias = "idGrupo", default)]
    pub label: Option<SectionLabel>,
    /// Present on flat section listings; absent when nested under a course.
    #[serde(rename = "idMateria", default, skip_serializing_if = "Option::is_none")]
    pub course: Option<Course>,
    #[serde(rename = "horarios", default)]
    pub slots: Vec<ScheduleSlot>,
}

impl Section {
    pub fn course_id(&self) -> Option<CourseId> {
        self.course.as_ref().map(|course| course.id)
    }

    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.label.clone(),
            None => self.id.to_string(),
        }
    }
}

/// Data-contract violations in schedule payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("malformed schedule time '{0}': expected HH:MM or HH:MM:SS")]
    MalformedTime(String),
    #[error("schedule slot {slot_id} ends at {end}, which is not after its start {start}")]
    InvertedInterval {
        slot_id: i64,
        start: ClockTime,
        end: ClockTime,
    },
}
