use std::sync::Arc;

use axum::{Extension, Json};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::err::Error;
use crate::mail::PassMailer;
use crate::models::{CandidateStudent, RosterUpload};
use crate::qr::{self, QrPayload};
use crate::{breaks, proceeds, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub summary: IssueSummary,
    pub results: Vec<ItemReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub email: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug)]
pub enum IssueOutcome {
    Issued,
    Skipped,
}

/// Issues passes for a whole roster. Outcomes are collected per candidate;
/// one bad row never aborts the batch, and candidates already committed are
/// never rolled back by a later failure.
pub async fn generate_passes(
    Json(batch): Json<RosterUpload>,
    Extension(pg): Extension<PgPool>,
    Extension(mailer): Extension<Arc<dyn PassMailer>>,
) -> Payload<IssueReport> {
    if batch.students.is_empty() {
        return breaks(Error::invalid("No students provided"));
    }

    let total = batch.students.len();
    let mut results = Vec::with_capacity(total);
    for student in batch.students {
        let email = if student.email.trim().is_empty() {
            "unknown".to_string()
        } else {
            student.email.trim().to_lowercase()
        };
        let report = match issue_one(&pg, mailer.as_ref(), &student).await {
            Ok(IssueOutcome::Issued) => ItemReport {
                email,
                status: ItemStatus::Success,
                message: None,
            },
            Ok(IssueOutcome::Skipped) => ItemReport {
                email,
                status: ItemStatus::Skipped,
                message: Some("Pass already generated".to_string()),
            },
            Err(err) => {
                log::warn!("Pass issuance failed for {}: {}", email, err.message());
                ItemReport {
                    email,
                    status: ItemStatus::Failed,
                    message: Some(err.message().to_string()),
                }
            }
        };
        results.push(report);
    }

    let successful = results
        .iter()
        .filter(|r| r.status == ItemStatus::Success)
        .count();
    let failed = results
        .iter()
        .filter(|r| r.status == ItemStatus::Failed)
        .count();
    proceeds(IssueReport {
        summary: IssueSummary {
            total,
            successful,
            failed,
        },
        results,
    })
}

/// Issues a single pass inside its own transaction. The student row is
/// resolved against the live store, not an upload-time snapshot, so the
/// second sibling of an in-batch duplicate lands on the first sibling's
/// committed row instead of double-issuing.
pub async fn issue_one(
    pg: &PgPool,
    mailer: &dyn PassMailer,
    raw: &CandidateStudent,
) -> Result<IssueOutcome, Error> {
    let candidate = raw.normalized();
    if !candidate.has_required_fields() {
        return Err(Error::invalid("Missing required fields"));
    }

    let mut tx = pg.begin().await?;

    let existing: Option<(Uuid, bool)> = sqlx::query_as(
        "SELECT id, pass_generated FROM students WHERE email = $1 OR roll_number = $2 LIMIT 1",
    )
    .bind(&candidate.email)
    .bind(&candidate.roll_number)
    .fetch_optional(&mut tx)
    .await?;

    let student_id = match existing {
        Some((_, true)) => return Ok(IssueOutcome::Skipped),
        Some((id, false)) => id,
        None => {
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
            .execute(&mut tx)
            .await?;
            id
        }
    };

    let pass_id = Uuid::new_v4().to_string();
    let payload = QrPayload {
        id: pass_id,
        student_id,
        name: candidate.name.clone(),
        email: candidate.email.clone(),
        roll_number: candidate.roll_number.clone(),
    };
    let encoded = serde_json::to_string(&payload)?;
    let qr_png = qr::render_png(&encoded)?;

    let history_id = Uuid::new_v4();
    sqlx::query("INSERT INTO pass_history (id, student_id) VALUES ($1, $2)")
        .bind(history_id)
        .bind(student_id)
        .execute(&mut tx)
        .await?;

    // The student row is only marked issued after the email goes out; a
    // delivery failure drops the transaction and rolls everything back.
    mailer.send_pass(&candidate, &qr_png).await?;

    sqlx::query(
        "UPDATE students SET pass_generated = TRUE, pass_generated_at = NOW(), qr_payload = $1 \
         WHERE id = $2",
    )
    .bind(&encoded)
    .bind(student_id)
    .execute(&mut tx)
    .await?;
    sqlx::query("UPDATE pass_history SET email_sent_at = NOW(), email_status = 'sent' WHERE id = $1")
        .bind(history_id)
        .execute(&mut tx)
        .await?;

    tx.commit().await?;
    Ok(IssueOutcome::Issued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Mutex;

    struct RecordingMailer {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PassMailer for RecordingMailer {
        async fn send_pass(&self, student: &CandidateStudent, _qr_png: &[u8]) -> Result<(), Error> {
            self.sent.lock().unwrap().push(student.email.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl PassMailer for FailingMailer {
        async fn send_pass(&self, student: &CandidateStudent, _qr_png: &[u8]) -> Result<(), Error> {
            Err(Error::MailDelivery {
                message: format!("Could not deliver pass email to {}", student.email),
            })
        }
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        crate::store::init_schema(&pool).await.unwrap();
        pool
    }

    fn fresh_candidate() -> CandidateStudent {
        let tag = Uuid::new_v4().simple().to_string();
        CandidateStudent {
            name: "Ada Lovelace".to_string(),
            email: format!("{}@example.com", tag),
            roll_number: tag,
            class_section: None,
        }
    }

    #[test]
    fn item_statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ItemStatus::Success).unwrap(),
            serde_json::json!("success")
        );
        assert_eq!(
            serde_json::to_value(ItemStatus::Skipped).unwrap(),
            serde_json::json!("skipped")
        );
        assert_eq!(
            serde_json::to_value(ItemStatus::Failed).unwrap(),
            serde_json::json!("failed")
        );
    }

    #[tokio::test]
    async fn blank_candidate_fails_before_touching_the_store() {
        // The pool is never used for an invalid candidate, so a disconnected
        // one is fine here.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let err = issue_one(&pool, &FailingMailer, &CandidateStudent {
            name: String::new(),
            email: "ada@example.com".to_string(),
            roll_number: "1".to_string(),
            class_section: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn issuance_marks_the_student_only_after_delivery() {
        let pool = test_pool().await;
        let mailer = RecordingMailer {
            sent: Mutex::new(Vec::new()),
        };
        let candidate = fresh_candidate();

        let outcome = issue_one(&pool, &mailer, &candidate).await.unwrap();
        assert!(matches!(outcome, IssueOutcome::Issued));
        assert_eq!(*mailer.sent.lock().unwrap(), vec![candidate.email.clone()]);

        let (pass_generated, qr_payload): (bool, Option<String>) = sqlx::query_as(
            "SELECT pass_generated, qr_payload FROM students WHERE email = $1",
        )
        .bind(&candidate.email)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(pass_generated);
        let payload: QrPayload = serde_json::from_str(&qr_payload.unwrap()).unwrap();
        assert_eq!(payload.email, candidate.email);
        assert_eq!(payload.roll_number, candidate.roll_number);
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn failed_delivery_rolls_the_candidate_back() {
        let pool = test_pool().await;
        let candidate = fresh_candidate();

        let err = issue_one(&pool, &FailingMailer, &candidate).await.unwrap_err();
        assert!(matches!(err, Error::MailDelivery { .. }));

        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM students WHERE email = $1")
                .bind(&candidate.email)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn reissuing_an_issued_pass_is_skipped() {
        let pool = test_pool().await;
        let mailer = RecordingMailer {
            sent: Mutex::new(Vec::new()),
        };
        let candidate = fresh_candidate();

        let first = issue_one(&pool, &mailer, &candidate).await.unwrap();
        assert!(matches!(first, IssueOutcome::Issued));
        let second = issue_one(&pool, &mailer, &candidate).await.unwrap();
        assert!(matches!(second, IssueOutcome::Skipped));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn sibling_collision_is_caught_by_the_live_recheck() {
        let pool = test_pool().await;
        let mailer = RecordingMailer {
            sent: Mutex::new(Vec::new()),
        };
        let first = fresh_candidate();
        let mut second = fresh_candidate();
        // Same roll number, different email: both classify unique against a
        // stale snapshot, but the live re-check lands the second on the
        // first's committed row.
        second.roll_number = first.roll_number.clone();

        let outcome = issue_one(&pool, &mailer, &first).await.unwrap();
        assert!(matches!(outcome, IssueOutcome::Issued));
        let outcome = issue_one(&pool, &mailer, &second).await.unwrap();
        assert!(matches!(outcome, IssueOutcome::Skipped));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
