use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dedup::{self, Duplicate};
use crate::err::Error;
use crate::models::{CandidateStudent, RosterUpload, Student};
use crate::{breaks, proceeds, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub database: &'static str,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAdded {
    pub id: Uuid,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    pub unique: Vec<CandidateStudent>,
    pub duplicates: Vec<Duplicate>,
}

pub async fn health(Extension(pg): Extension<PgPool>) -> Payload<HealthReport> {
    let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT NOW()")
        .fetch_one(&pg)
        .await
        .map_err(Error::from)?;
    proceeds(HealthReport {
        database: "ok",
        now,
    })
}

pub async fn list_students(Extension(pg): Extension<PgPool>) -> Payload<StudentList> {
    let students =
        sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY created_at DESC")
            .fetch_all(&pg)
            .await
            .map_err(Error::from)?;
    proceeds(StudentList { students })
}

pub async fn add_student(
    Json(body): Json<CandidateStudent>,
    Extension(pg): Extension<PgPool>,
) -> Payload<StudentAdded> {
    let candidate = body.normalized();
    if !candidate.has_required_fields() {
        return breaks(Error::invalid("Missing required fields"));
    }

    let existing = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE email = $1 OR roll_number = $2 LIMIT 1",
    )
    .bind(&candidate.email)
    .bind(&candidate.roll_number)
    .fetch_optional(&pg)
    .await
    .map_err(Error::from)?;
    if existing.is_some() {
        return breaks(Error::DuplicateStudent {
            message: "Student with this email or roll number already exists".to_string(),
        });
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO students (id, name, email, roll_number, class_section) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(&candidate.name)
    .bind(&candidate.email)
    .bind(&candidate.roll_number)
    .bind(&candidate.class_section)
    .execute(&pg)
    .await
    .map_err(Error::from)?;

    proceeds(StudentAdded {
        id,
        message: "Student added successfully",
    })
}

/// Classifies an uploaded roster against the current directory so the
/// operator can review conflicts before issuing. Advisory: nothing is
/// written here.
pub async fn resolve_upload(
    Json(body): Json<RosterUpload>,
    Extension(pg): Extension<PgPool>,
) -> Payload<ResolveReport> {
    if body.students.is_empty() {
        return breaks(Error::invalid("No students provided"));
    }
    let directory =
        sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY created_at DESC")
            .fetch_all(&pg)
            .await
            .map_err(Error::from)?;
    let resolved = dedup::resolve_batch(body.students, &directory);
    proceeds(ResolveReport {
        unique: resolved.unique,
        duplicates: resolved.duplicates,
    })
}
