use crate::infra::callback_source;
use clap::Args;
use enrollment::config::AppConfig;
use enrollment::enrollment::{
    BackendClient, CourseSections, EnrollmentHistory, EnrollmentOutcome, EnrollmentWorkflow,
    PendingJob, WorkflowError,
};
use enrollment::error::AppError;
use enrollment::jobs::{JobPoller, PollPhase};
use enrollment::schedule::{CourseId, ScheduleSlot, SectionId};
use enrollment::telemetry;
use std::fmt::Write as _;

#[derive(Args, Debug)]
pub(crate) struct EnrollArgs {
    /// Student registration number
    #[arg(long)]
    pub(crate) registro: i64,
    /// Account password
    #[arg(long)]
    pub(crate) password: String,
    /// Course id to enroll in (repeat for several courses)
    #[arg(long = "course", required = true)]
    pub(crate) courses: Vec<i64>,
    /// Section id to request (repeat; omit to only list the offered sections)
    #[arg(long = "section")]
    pub(crate) sections: Vec<i64>,
    /// Callback lookup URL of a running `serve` instance, e.g. http://localhost:3000/api/callbacks
    #[arg(long)]
    pub(crate) callback_server: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct HistoryArgs {
    /// Student registration number
    #[arg(long)]
    pub(crate) registro: i64,
    /// Account password
    #[arg(long)]
    pub(crate) password: String,
    /// Callback lookup URL of a running `serve` instance
    #[arg(long)]
    pub(crate) callback_server: Option<String>,
}

pub(crate) async fn run_enroll(args: EnrollArgs) -> Result<(), AppError> {
    let EnrollArgs {
        registro,
        password,
        courses,
        sections,
        callback_server,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let client = BackendClient::login(&config.backend, registro, &password).await?;
    let callbacks = callback_source(callback_server, config.backend.request_timeout)?;
    let poller = JobPoller::new(callbacks, client.clone());
    let mut workflow = EnrollmentWorkflow::new(client, poller, config.polling);

    let courses: Vec<CourseId> = courses.into_iter().map(CourseId).collect();
    let catalog = workflow.load_courses().await?;
    println!(
        "{} ({} courses passed, {} available)",
        catalog.student.name, catalog.passed_count, catalog.available_count
    );
    for id in &courses {
        if catalog.course(*id).is_none() {
            println!("warning: course {id} is not among your available courses");
        }
    }

    workflow.select_courses(courses)?;
    let groups = workflow.load_sections().await?;
    print!("{}", format_sections(groups));

    if sections.is_empty() {
        println!("\nNo sections requested; pass --section <id> to enroll.");
        return Ok(());
    }

    let mut requested: Vec<SectionId> = Vec::new();
    for section in sections.into_iter().map(SectionId) {
        if !requested.contains(&section) {
            requested.push(section);
        }
    }
    for section in requested {
        let course = workflow
            .sections()
            .iter()
            .find(|group| group.sections.iter().any(|s| s.id == section))
            .map(|group| group.course.id)
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "section {section} is not offered for the chosen courses"
                ))
            })?;
        workflow.toggle_section(course, section)?;
    }

    let mut pending = workflow.watch_pending();
    let reporter = tokio::spawn(async move {
        while pending.changed().await.is_ok() {
            let snapshot = pending.borrow_and_update().clone();
            if let Some(job) = snapshot {
                println!("{}", format_pending(&job));
            }
        }
    });
    let submitted = workflow.submit().await.cloned();
    reporter.abort();

    print!("\n{}", format_outcome(&submitted?));
    Ok(())
}

pub(crate) async fn run_history(args: HistoryArgs) -> Result<(), AppError> {
    let HistoryArgs {
        registro,
        password,
        callback_server,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let client = BackendClient::login(&config.backend, registro, &password).await?;
    let callbacks = callback_source(callback_server, config.backend.request_timeout)?;
    let workflow = EnrollmentWorkflow::new(
        client.clone(),
        JobPoller::new(callbacks, client),
        config.polling,
    );

    let history = workflow.fetch_history().await?;
    print!("{}", format_history(&history));
    Ok(())
}

fn format_slot(slot: &ScheduleSlot) -> String {
    let days = slot
        .days
        .iter()
        .map(|day| {
            if day.name.is_empty() {
                day.id.to_string()
            } else {
                day.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    let mut line = format!("{days} {}-{}", slot.start, slot.end);
    if let Some(room) = &slot.room {
        let _ = write!(line, " room {}", room.number);
    }
    if let Some(module) = &slot.module {
        let _ = write!(line, " module {}", module.code);
    }
    line
}

pub(crate) fn format_sections(groups: &[CourseSections]) -> String {
    let mut out = String::new();
    for group in groups {
        let course = &group.course;
        if course.code.is_empty() {
            let _ = writeln!(out, "\n{} [{}]", course.name, course.id);
        } else {
            let _ = writeln!(out, "\n{} {} [{}]", course.code, course.name, course.id);
        }
        if !group.has_sections() {
            let _ = writeln!(out, "  no sections offered");
            continue;
        }
        for section in &group.sections {
            let instructor = section
                .instructor
                .as_ref()
                .map(|i| i.name.as_str())
                .unwrap_or("TBA");
            let schedule = section
                .slots
                .iter()
                .map(format_slot)
                .collect::<Vec<_>>()
                .join("; ");
            let _ = writeln!(
                out,
                "  [{}] {:<4} {:<24} {:>3} seats  {}",
                section.id,
                section.display_label(),
                instructor,
                section.capacity,
                schedule
            );
        }
    }
    out
}

pub(crate) fn format_pending(job: &PendingJob) -> String {
    match job.phase {
        PollPhase::Submitted => format!(
            "Request queued as job {}{}",
            job.ticket.job_id,
            job.ticket
                .message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        ),
        _ => format!(
            "Processing... {}% (check {}/{})",
            job.percent, job.attempt, job.max_attempts
        ),
    }
}

pub(crate) fn format_outcome(outcome: &EnrollmentOutcome) -> String {
    let mut out = String::new();
    if !outcome.is_confirmed() {
        let reason = outcome.reason.as_deref().unwrap_or("no reason given");
        let _ = writeln!(out, "Enrollment REJECTED: {reason}");
        return out;
    }

    let _ = writeln!(out, "Enrollment CONFIRMED");
    if let Some(record) = &outcome.record {
        let _ = writeln!(
            out,
            "  record #{} on {}",
            record.id,
            record.enrolled_at.format("%Y-%m-%d %H:%M")
        );
    }
    if !outcome.sections.is_empty() {
        let ids = outcome
            .sections
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "  sections: {ids}");
    }
    out
}

pub(crate) fn format_history(history: &EnrollmentHistory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Enrollment history for {}", history.student.name);
    if history.enrollments.is_empty() {
        let _ = writeln!(out, "  no enrollments yet");
        return out;
    }
    for enrollment in &history.enrollments {
        let summary = enrollment.summary();
        let _ = writeln!(
            out,
            "\n{} (enrolled {}): {} passed, {} failed, {} in progress",
            enrollment.period,
            enrollment.enrolled_at.format("%Y-%m-%d"),
            summary.passed,
            summary.failed,
            summary.enrolled
        );
        for entry in &enrollment.entries {
            let grade = entry
                .grade
                .map(|g| format!("{g:.0}"))
                .unwrap_or_else(|| "-".to_string());
            let label = entry
                .label
                .as_ref()
                .map(|l| l.label.as_str())
                .unwrap_or("");
            let _ = writeln!(
                out,
                "  {:<8} {:<28} {:<4} {:>3}  {}",
                entry.course.code,
                entry.course.name,
                label,
                grade,
                entry.standing().label()
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollment::enrollment::{group_sections_by_course, JobTicket};
    use enrollment::jobs::JobId;
    use enrollment::schedule::{ClockTime, Course, Section, Weekday};
    use serde_json::json;

    fn section(id: i64, course: i64) -> Section {
        let slot = ScheduleSlot::new(
            id,
            ClockTime::from_hm(7, 0).expect("start"),
            ClockTime::from_hm(9, 15).expect("end"),
            vec![Weekday::new(1, "Lun"), Weekday::new(3, "Mie")],
        )
        .expect("slot");
        Section {
            id: SectionId(id),
            capacity: 25,
            instructor: None,
            label: None,
            course: Some(Course {
                id: CourseId(course),
                name: "Calculo I".to_string(),
                code: "MAT101".to_string(),
            }),
            slots: vec![slot],
        }
    }

    #[test]
    fn section_listing_shows_schedule_and_placeholder_courses() {
        let groups = group_sections_by_course(&[CourseId(1), CourseId(9)], &[section(11, 1)]);

        let listing = format_sections(&groups);

        assert!(listing.contains("MAT101 Calculo I [1]"));
        assert!(listing.contains("[11]"));
        assert!(listing.contains("Lun/Mie 07:00-09:15"));
        assert!(listing.contains("no sections offered"));
    }

    #[test]
    fn rejected_outcome_prints_reason() {
        let text = format_outcome(&EnrollmentOutcome::rejected("Grupo sin cupos"));
        assert_eq!(text, "Enrollment REJECTED: Grupo sin cupos\n");
    }

    #[test]
    fn confirmed_outcome_lists_record_and_sections() {
        let outcome: EnrollmentOutcome = serde_json::from_value(json!({
            "status": "CONFIRMED",
            "inscripcion": { "id": 5, "fechaInscripcion": "2025-02-10T13:05:00Z" },
            "grupos": [11, 21]
        }))
        .expect("outcome");

        let text = format_outcome(&outcome);

        assert!(text.starts_with("Enrollment CONFIRMED"));
        assert!(text.contains("record #5 on 2025-02-10 13:05"));
        assert!(text.contains("sections: 11, 21"));
    }

    #[test]
    fn pending_job_lines_track_phase() {
        let mut job = PendingJob {
            ticket: JobTicket {
                job_id: JobId::new("seat-1"),
                message: Some("queued".to_string()),
                notification_endpoint: None,
            },
            phase: PollPhase::Submitted,
            attempt: 0,
            max_attempts: 60,
            percent: 0,
        };
        assert_eq!(format_pending(&job), "Request queued as job seat-1: queued");

        job.phase = PollPhase::Polling;
        job.attempt = 4;
        job.percent = 40;
        assert_eq!(format_pending(&job), "Processing... 40% (check 4/60)");
    }

    #[test]
    fn history_lists_standings_per_period() {
        let history: EnrollmentHistory = serde_json::from_value(json!({
            "estudiante": { "id": 1, "nombre": "Ana" },
            "inscripciones": [{
                "id": 1,
                "fechaInscripcion": "2024-08-01T12:00:00Z",
                "periodo": "2-2024",
                "materias": [{
                    "id": 1, "nota": 64,
                    "materia": { "id": 1, "nombre": "Calculo I", "codigo": "MAT101" },
                    "grupo": { "id": 1, "sigla": "SA" },
                    "docente": { "id": 2, "nombre": "Ing. Rojas" }
                }]
            }]
        }))
        .expect("history");

        let text = format_history(&history);

        assert!(text.contains("2-2024 (enrolled 2024-08-01): 1 passed, 0 failed, 0 in progress"));
        assert!(text.contains("passed"));
        assert!(text.contains("64"));
    }
}
