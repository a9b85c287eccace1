use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{deserialize_timestamp, Student};
use crate::schedule::{Course, Instructor, SectionLabel};

/// Lowest grade that counts as a pass.
pub const PASSING_GRADE: f64 = 51.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentHistory {
    #[serde(rename = "estudiante")]
    pub student: Student,
    #[serde(rename = "inscripciones", default)]
    pub enrollments: Vec<PastEnrollment>,
}

/// One enrollment period and the courses taken in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastEnrollment {
    pub id: i64,
    #[serde(rename = "fechaInscripcion", deserialize_with = "deserialize_timestamp")]
    pub enrolled_at: DateTime<Utc>,
    #[serde(rename = "periodo", default)]
    pub period: String,
    #[serde(rename = "materias", default)]
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(rename = "nota", default)]
    pub grade: Option<f64>,
    #[serde(rename = "materia")]
    pub course: Course,
    #[serde(rename = "grupo", default)]
    pub label: Option<SectionLabel>,
    #[serde(rename = "docente", default)]
    pub instructor: Option<Instructor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStanding {
    Enrolled,
    Passed,
    Failed,
}

impl CourseStanding {
    pub fn from_grade(grade: Option<f64>) -> Self {
        match grade {
            None => CourseStanding::Enrolled,
            Some(grade) if grade >= PASSING_GRADE => CourseStanding::Passed,
            Some(_) => CourseStanding::Failed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CourseStanding::Enrolled => "enrolled",
            CourseStanding::Passed => "passed",
            CourseStanding::Failed => "failed",
        }
    }
}

impl HistoryEntry {
    pub fn standing(&self) -> CourseStanding {
        CourseStanding::from_grade(self.grade)
    }
}

/// Per-period tally of standings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StandingSummary {
    pub enrolled: usize,
    pub passed: usize,
    pub failed: usize,
}

impl PastEnrollment {
    pub fn summary(&self) -> StandingSummary {
        self.entries
            .iter()
            .fold(StandingSummary::default(), |mut acc, entry| {
                match entry.standing() {
                    CourseStanding::Enrolled => acc.enrolled += 1,
                    CourseStanding::Passed => acc.passed += 1,
                    CourseStanding::Failed => acc.failed += 1,
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_accepts_naive_and_date_only_enrollment_dates() {
        let history: EnrollmentHistory = serde_json::from_value(json!({
            "estudiante": { "id": 1, "nombre": "Ana" },
            "inscripciones": [
                { "id": 1, "fechaInscripcion": "2024-08-01T12:30:00.000", "periodo": "2-2024" },
                { "id": 2, "fechaInscripcion": "2025-02-03", "periodo": "1-2025" }
            ]
        }))
        .expect("history decodes");

        assert_eq!(
            history.enrollments[0].enrolled_at.format("%Y-%m-%d %H:%M").to_string(),
            "2024-08-01 12:30"
        );
        assert_eq!(
            history.enrollments[1].enrolled_at.format("%Y-%m-%d %H:%M").to_string(),
            "2025-02-03 00:00"
        );
        assert!(history.enrollments[1].entries.is_empty());
    }

    #[test]
    fn grade_boundaries_classify_standing() {
        assert_eq!(CourseStanding::from_grade(None), CourseStanding::Enrolled);
        assert_eq!(CourseStanding::from_grade(Some(51.0)), CourseStanding::Passed);
        assert_eq!(CourseStanding::from_grade(Some(50.9)), CourseStanding::Failed);
        assert_eq!(CourseStanding::from_grade(Some(0.0)), CourseStanding::Failed);
    }

    #[test]
    fn history_payload_decodes_and_summarises() {
        let history: EnrollmentHistory = serde_json::from_value(json!({
            "estudiante": { "id": 1, "nombre": "Ana", "ci": 7654321, "registro": 219062851 },
            "inscripciones": [{
                "id": 3,
                "fechaInscripcion": "2024-08-01T12:00:00Z",
                "periodo": "2-2024",
                "materias": [
                    {
                        "id": 1, "nota": 75,
                        "materia": { "id": 1, "nombre": "Calculo I", "codigo": "MAT101" },
                        "grupo": { "id": 1, "sigla": "SA" },
                        "docente": { "id": 2, "nombre": "Ing. Rojas" }
                    },
                    {
                        "id": 2, "nota": null,
                        "materia": { "id": 2, "nombre": "Fisica I", "codigo": "FIS100" },
                        "grupo": { "id": 2, "sigla": "SB" },
                        "docente": { "id": 3, "nombre": "Ing. Perez" }
                    },
                    {
                        "id": 3, "nota": 30,
                        "materia": { "id": 3, "nombre": "Ingles I", "codigo": "LIN100" },
                        "grupo": { "id": 3, "sigla": "Z1" },
                        "docente": { "id": 4, "nombre": "Lic. Vaca" }
                    }
                ]
            }]
        }))
        .expect("history decodes");

        assert_eq!(history.student.ci, Some(7654321));
        let summary = history.enrollments[0].summary();
        assert_eq!(
            summary,
            StandingSummary {
                enrolled: 1,
                passed: 1,
                failed: 1
            }
        );
    }
}
