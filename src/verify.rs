use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use crate::err::Error;
use crate::models::{PassVerification, StudentPublic, VerificationInfo};
use crate::{bails, breaks, proceeds, Payload};

/// Upper bound on one verification transaction. Hitting it drops the
/// transaction (rolled back on drop) and answers with an internal error.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, rename = "passId")]
    pub pass_id: String,
    #[serde(default, rename = "studentId")]
    pub student_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub message: &'static str,
    pub student: StudentPublic,
    pub verification: VerificationInfo,
}

#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Accepted {
        student: StudentPublic,
        count: i32,
        verified_at: DateTime<Utc>,
    },
    AlreadyUsed {
        student: StudentPublic,
        count: i32,
        last_verified_at: DateTime<Utc>,
    },
    InvalidPass,
}

pub async fn verify_pass(
    Json(req): Json<VerifyRequest>,
    Extension(pg): Extension<PgPool>,
) -> Payload<VerifyReport> {
    if req.pass_id.trim().is_empty() || req.student_id.trim().is_empty() {
        return breaks(Error::invalid("Missing pass ID or student ID"));
    }
    let student_id: Uuid = req.student_id.trim().parse().map_err(Error::from)?;

    let outcome = match timeout(VERIFY_TIMEOUT, verify_once(&pg, req.pass_id.trim(), student_id)).await
    {
        Ok(result) => result?,
        Err(_) => {
            log::error!("Verification timed out for pass {}", req.pass_id);
            return bails("Failed to verify pass");
        }
    };

    match outcome {
        VerifyOutcome::Accepted {
            student,
            count,
            verified_at,
        } => proceeds(VerifyReport {
            message: "Pass verified successfully",
            student,
            verification: VerificationInfo {
                count,
                last_verified_at: verified_at,
            },
        }),
        VerifyOutcome::AlreadyUsed {
            student,
            count,
            last_verified_at,
        } => breaks(Error::PassAlreadyUsed {
            message: format!(
                "Pass already used at {}",
                last_verified_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            student,
            verification: VerificationInfo {
                count,
                last_verified_at,
            },
        }),
        VerifyOutcome::InvalidPass => breaks(Error::InvalidPass {
            message: "Invalid pass or student not found".to_string(),
        }),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VerifyLookup {
    id: Uuid,
    name: String,
    email: String,
    roll_number: String,
    class_section: Option<String>,
    verification_count: Option<i32>,
    last_verified_at: Option<DateTime<Utc>>,
}

impl VerifyLookup {
    fn public(&self) -> StudentPublic {
        StudentPublic {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            roll_number: self.roll_number.clone(),
            class_section: self.class_section.clone(),
        }
    }
}

/// Runs the whole check-then-set inside one transaction. The commit is an
/// upsert guarded on verification_count = 0, so of any number of concurrent
/// scans of the same pass exactly one write lands; the losers get an empty
/// RETURNING set, re-read the winner's committed row, and report it.
pub async fn verify_once(
    pg: &PgPool,
    pass_id: &str,
    student_id: Uuid,
) -> Result<VerifyOutcome, Error> {
    let mut tx = pg.begin().await?;

    let found = sqlx::query_as::<_, VerifyLookup>(
        "SELECT s.id, s.name, s.email, s.roll_number, s.class_section, \
                p.verification_count, p.last_verified_at \
         FROM students s \
         LEFT JOIN pass_verifications p ON p.student_id = s.id AND p.pass_id = $1 \
         WHERE s.id = $2 AND s.pass_generated = TRUE",
    )
    .bind(pass_id)
    .bind(student_id)
    .fetch_optional(&mut tx)
    .await?;

    let found = match found {
        // Rejections write nothing; the transaction rolls back on drop.
        None => return Ok(VerifyOutcome::InvalidPass),
        Some(row) => row,
    };

    if let (Some(count), Some(last_verified_at)) =
        (found.verification_count, found.last_verified_at)
    {
        if count > 0 {
            return Ok(VerifyOutcome::AlreadyUsed {
                student: found.public(),
                count,
                last_verified_at,
            });
        }
    }

    let committed: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
        "INSERT INTO pass_verifications (pass_id, student_id, verification_count, last_verified_at) \
         VALUES ($1, $2, 1, NOW()) \
         ON CONFLICT (pass_id, student_id) DO UPDATE \
         SET verification_count = 1, last_verified_at = NOW() \
         WHERE pass_verifications.verification_count = 0 \
         RETURNING verification_count, last_verified_at",
    )
    .bind(pass_id)
    .bind(student_id)
    .fetch_optional(&mut tx)
    .await?;

    match committed {
        Some((count, verified_at)) => {
            tx.commit().await?;
            Ok(VerifyOutcome::Accepted {
                student: found.public(),
                count,
                verified_at,
            })
        }
        None => {
            // Lost the race to a concurrent scan of the same pass.
            let record = sqlx::query_as::<_, PassVerification>(
                "SELECT pass_id, student_id, verification_count, last_verified_at \
                 FROM pass_verifications WHERE pass_id = $1 AND student_id = $2",
            )
            .bind(pass_id)
            .bind(student_id)
            .fetch_one(&mut tx)
            .await?;
            Ok(VerifyOutcome::AlreadyUsed {
                student: found.public(),
                count: record.verification_count,
                last_verified_at: record.last_verified_at.unwrap_or_else(Utc::now),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&url)
            .await
            .unwrap();
        crate::store::init_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_student(pool: &PgPool, issued: bool) -> Uuid {
        let id = Uuid::new_v4();
        let tag = id.simple().to_string();
        sqlx::query(
            "INSERT INTO students (id, name, email, roll_number, pass_generated, \
                                   pass_generated_at, qr_payload) \
             VALUES ($1, $2, $3, $4, $5, \
                     CASE WHEN $5 THEN NOW() END, CASE WHEN $5 THEN '{}' END)",
        )
        .bind(id)
        .bind("Ada Lovelace")
        .bind(format!("{}@example.com", tag))
        .bind(tag)
        .bind(issued)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[test]
    fn scan_requests_tolerate_missing_fields() {
        let req: VerifyRequest = serde_json::from_str("{}").unwrap();
        assert!(req.pass_id.is_empty());
        assert!(req.student_id.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn unknown_student_is_an_invalid_pass() {
        let pool = test_pool().await;
        let outcome = verify_once(&pool, "no-such-pass", Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::InvalidPass));
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn unissued_student_rejects_any_pass() {
        let pool = test_pool().await;
        let student_id = seed_student(&pool, false).await;
        let outcome = verify_once(&pool, "some-pass", student_id).await.unwrap();
        assert!(matches!(outcome, VerifyOutcome::InvalidPass));
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn second_scan_reports_the_first_timestamp() {
        let pool = test_pool().await;
        let student_id = seed_student(&pool, true).await;
        let pass_id = Uuid::new_v4().to_string();

        let first = verify_once(&pool, &pass_id, student_id).await.unwrap();
        let verified_at = match first {
            VerifyOutcome::Accepted {
                count, verified_at, ..
            } => {
                assert_eq!(count, 1);
                verified_at
            }
            other => panic!("expected acceptance, got {:?}", other),
        };

        let second = verify_once(&pool, &pass_id, student_id).await.unwrap();
        match second {
            VerifyOutcome::AlreadyUsed {
                count,
                last_verified_at,
                ..
            } => {
                assert_eq!(count, 1);
                assert_eq!(last_verified_at, verified_at);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn concurrent_scans_admit_exactly_once() {
        let pool = test_pool().await;
        let student_id = seed_student(&pool, true).await;
        let pass_id = Uuid::new_v4().to_string();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let pass_id = pass_id.clone();
            handles.push(tokio::spawn(async move {
                verify_once(&pool, &pass_id, student_id).await.unwrap()
            }));
        }

        let mut accepted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.unwrap() {
                VerifyOutcome::Accepted { .. } => accepted += 1,
                VerifyOutcome::AlreadyUsed { .. } => already_used += 1,
                VerifyOutcome::InvalidPass => panic!("pass vanished mid-test"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(already_used, 7);

        let (count,): (i32,) = sqlx::query_as(
            "SELECT verification_count FROM pass_verifications \
             WHERE pass_id = $1 AND student_id = $2",
        )
        .bind(&pass_id)
        .bind(student_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
