use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::jobs::domain::JobId;
use crate::schedule::{Course, CourseId, Section, SectionId};

/// Student record as embedded in catalog, outcome and history payloads.
///
/// Each endpoint carries a different subset of the optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registro: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<i64>,
    #[serde(rename = "planEstudio", default, skip_serializing_if = "Option::is_none")]
    pub study_plan: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Confirmed,
    Rejected,
}

/// Enrollment record created by a confirmed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: i64,
    #[serde(rename = "fechaInscripcion", deserialize_with = "deserialize_timestamp")]
    pub enrolled_at: DateTime<Utc>,
    #[serde(rename = "idEstudiante", default, skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
}

/// Reads backend timestamps: RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]`, or a bare date.
/// Naive values are taken as UTC and a bare date as its midnight.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp '{raw}'")))
}

/// Final answer to a seat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "inscripcion", default, skip_serializing_if = "Option::is_none")]
    pub record: Option<EnrollmentRecord>,
    /// Confirmed section ids.
    #[serde(rename = "grupos", default)]
    pub sections: Vec<SectionId>,
}

impl EnrollmentOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Rejected,
            reason: Some(reason.into()),
            record: None,
            sections: Vec::new(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == OutcomeStatus::Confirmed
    }
}

/// Acknowledgement for work the backend finishes asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(rename = "mensaje", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "notificationEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_endpoint: Option<String>,
}

/// Every backend query answers either with its payload or with a job ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply<T> {
    Ready(T),
    Queued(JobTicket),
}

impl<T: DeserializeOwned> BackendReply<T> {
    /// A body carrying a non-empty `jobId` is a ticket; anything else must be the payload.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let queued = matches!(
            value.get("jobId"),
            Some(Value::String(id)) if !id.is_empty()
        );
        if queued {
            serde_json::from_value(value).map(BackendReply::Queued)
        } else {
            serde_json::from_value(value).map(BackendReply::Ready)
        }
    }
}

/// Body of `POST /inscripcions/request-seat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRequest {
    #[serde(rename = "idsGrupoMateria")]
    pub section_ids: Vec<SectionId>,
}

/// Course with the sections offered for it, as nested in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCourse {
    #[serde(flatten)]
    pub course: Course,
    #[serde(rename = "gruposMaterias", default)]
    pub sections: Vec<Section>,
}

/// Courses a student may enroll in, grouped by curriculum level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCatalog {
    #[serde(rename = "estudiante")]
    pub student: Student,
    #[serde(rename = "materiasAprobadas", default)]
    pub passed_count: u32,
    #[serde(rename = "materiasDisponibles", default)]
    pub available_count: u32,
    #[serde(rename = "materiasPorNivel", default)]
    pub by_level: BTreeMap<String, Vec<CatalogCourse>>,
}

impl CourseCatalog {
    pub fn courses(&self) -> impl Iterator<Item = &CatalogCourse> + '_ {
        self.by_level.values().flatten()
    }

    pub fn course(&self, id: CourseId) -> Option<&Course> {
        self.courses()
            .map(|entry| &entry.course)
            .find(|course| course.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_in_body_means_ticket() {
        let reply = BackendReply::<EnrollmentOutcome>::from_value(json!({
            "jobId": "42",
            "mensaje": "queued",
            "notificationEndpoint": "http://localhost:3000/api/callbacks/42"
        }))
        .expect("ticket decodes");

        match reply {
            BackendReply::Queued(ticket) => {
                assert_eq!(ticket.job_id, JobId::new("42"));
                assert_eq!(ticket.message.as_deref(), Some("queued"));
            }
            BackendReply::Ready(_) => panic!("expected ticket"),
        }
    }

    #[test]
    fn direct_outcome_decodes_with_record_and_sections() {
        let reply = BackendReply::<EnrollmentOutcome>::from_value(json!({
            "status": "CONFIRMED",
            "inscripcion": {
                "id": 9,
                "fechaInscripcion": "2025-02-03T14:00:00Z",
                "idEstudiante": { "id": 1, "nombre": "Ana", "registro": 219062851 }
            },
            "grupos": [11, 12]
        }))
        .expect("outcome decodes");

        let BackendReply::Ready(outcome) = reply else {
            panic!("expected direct outcome");
        };
        assert!(outcome.is_confirmed());
        assert_eq!(outcome.sections, vec![SectionId(11), SectionId(12)]);
        let record = outcome.record.expect("record present");
        assert_eq!(record.id, 9);
        assert_eq!(record.student.and_then(|s| s.registro), Some(219062851));
    }

    #[test]
    fn enrollment_date_accepts_naive_and_date_only_forms() {
        for (raw, expected) in [
            ("2025-02-03T14:00:00Z", "2025-02-03T14:00:00Z"),
            ("2025-02-03T10:00:00-04:00", "2025-02-03T14:00:00Z"),
            ("2025-02-03T14:00:00.000", "2025-02-03T14:00:00Z"),
            ("2025-02-03 14:00:00", "2025-02-03T14:00:00Z"),
            ("2025-02-03", "2025-02-03T00:00:00Z"),
        ] {
            let outcome: EnrollmentOutcome = serde_json::from_value(json!({
                "status": "CONFIRMED",
                "inscripcion": { "id": 7, "fechaInscripcion": raw },
                "grupos": [11]
            }))
            .unwrap_or_else(|err| panic!("{raw} should decode: {err}"));

            let record = outcome.record.expect("record present");
            assert_eq!(
                record
                    .enrolled_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                expected
            );
        }
    }

    #[test]
    fn unreadable_enrollment_date_still_fails() {
        let err = serde_json::from_value::<EnrollmentRecord>(json!({
            "id": 7,
            "fechaInscripcion": "last tuesday"
        }))
        .expect_err("must reject");
        assert!(err.to_string().contains("unrecognised timestamp 'last tuesday'"));
    }

    #[test]
    fn rejected_outcome_serializes_reason_without_record() {
        let value = serde_json::to_value(EnrollmentOutcome::rejected("no seats")).expect("ser");
        assert_eq!(
            value,
            json!({ "status": "REJECTED", "reason": "no seats", "grupos": [] })
        );
    }

    #[test]
    fn catalog_flattens_levels_and_nested_sections() {
        let catalog: CourseCatalog = serde_json::from_value(json!({
            "estudiante": { "id": 1, "nombre": "Ana", "registro": 1, "planEstudio": "187-3" },
            "materiasAprobadas": 20,
            "materiasDisponibles": 2,
            "materiasPorNivel": {
                "1": [{ "id": 1, "nombre": "Calculo I", "codigo": "MAT101", "gruposMaterias": [] }],
                "2": [{
                    "id": 2,
                    "nombre": "Fisica I",
                    "codigo": "FIS100",
                    "gruposMaterias": [{
                        "id": 20,
                        "cupos": 15,
                        "docente": { "id": 3, "nombre": "Ing. Perez" },
                        "grupo": { "id": 1, "sigla": "SA" },
                        "horarios": [{
                            "id": 1,
                            "horaInicio": "07:00:00",
                            "horaFin": "09:15:00",
                            "aula": { "id": 1, "numero": 12 },
                            "modulo": { "id": 1, "codigo": 236 },
                            "dias": [{ "id": 1, "nombre": "Lunes" }]
                        }]
                    }]
                }]
            }
        }))
        .expect("catalog decodes");

        assert_eq!(catalog.courses().count(), 2);
        assert_eq!(
            catalog.course(CourseId(2)).map(|c| c.code.as_str()),
            Some("FIS100")
        );
        let physics = catalog.courses().find(|c| c.course.id == CourseId(2)).expect("physics");
        assert_eq!(physics.sections[0].display_label(), "SA");
        assert_eq!(catalog.student.study_plan.as_deref(), Some("187-3"));
    }
}
