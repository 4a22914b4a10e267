use std::collections::HashMap;

use serde::Serialize;

use crate::models::{CandidateStudent, Student, StudentPublic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    Email,
    RollNumber,
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct Duplicate {
    pub candidate: CandidateStudent,
    pub reason: DuplicateReason,
    pub existing: StudentPublic,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedBatch {
    pub unique: Vec<CandidateStudent>,
    pub duplicates: Vec<Duplicate>,
}

fn comparable(field: &str) -> String {
    field.trim().to_lowercase()
}

/// Classifies an uploaded batch against a directory snapshot. Pure: the
/// snapshot is never written, and the classification is advisory only.
///
/// Candidates are compared against the directory, not against each other;
/// sibling duplicates inside one batch are caught later by issuance, which
/// re-resolves every candidate against the live store.
pub fn resolve_batch(candidates: Vec<CandidateStudent>, directory: &[Student]) -> ResolvedBatch {
    let mut by_email = HashMap::with_capacity(directory.len());
    let mut by_roll = HashMap::with_capacity(directory.len());
    for (idx, student) in directory.iter().enumerate() {
        by_email.entry(comparable(&student.email)).or_insert(idx);
        by_roll.entry(comparable(&student.roll_number)).or_insert(idx);
    }

    let mut resolved = ResolvedBatch::default();
    for candidate in candidates {
        let email_hit = by_email.get(&comparable(&candidate.email)).copied();
        let roll_hit = by_roll.get(&comparable(&candidate.roll_number)).copied();
        match (email_hit, roll_hit) {
            (None, None) => resolved.unique.push(candidate),
            (Some(idx), None) => {
                let existing = directory[idx].public();
                resolved.duplicates.push(Duplicate {
                    candidate,
                    reason: DuplicateReason::Email,
                    existing,
                });
            }
            (None, Some(idx)) => {
                let existing = directory[idx].public();
                resolved.duplicates.push(Duplicate {
                    candidate,
                    reason: DuplicateReason::RollNumber,
                    existing,
                });
            }
            // A candidate can collide with two different rows on different
            // fields; the email-match row is the one reported.
            (Some(idx), Some(_)) => {
                let existing = directory[idx].public();
                resolved.duplicates.push(Duplicate {
                    candidate,
                    reason: DuplicateReason::Both,
                    existing,
                });
            }
        }
    }
    resolved
}
