use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roll_number: String,
    pub class_section: Option<String>,
    pub pass_generated: bool,
    pub pass_generated_at: Option<DateTime<Utc>>,
    pub qr_payload: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn public(&self) -> StudentPublic {
        StudentPublic {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            roll_number: self.roll_number.clone(),
            class_section: self.class_section.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roll_number: String,
    pub class_section: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PassVerification {
    pub pass_id: String,
    pub student_id: Uuid,
    pub verification_count: i32,
    pub last_verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationInfo {
    pub count: i32,
    #[serde(rename = "lastVerifiedAt")]
    pub last_verified_at: DateTime<Utc>,
}

/// Roster row pending duplicate-check and issuance. Fields default to empty
/// so one malformed row cannot abort deserialization of a whole batch; the
/// per-item validation rejects it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStudent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roll_number: String,
    #[serde(default)]
    pub class_section: Option<String>,
}

impl CandidateStudent {
    /// Storage form: every field trimmed, email lower-cased, roll number
    /// casing preserved.
    pub fn normalized(&self) -> CandidateStudent {
        let class_section = self
            .class_section
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        CandidateStudent {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            roll_number: self.roll_number.trim().to_string(),
            class_section,
        }
    }

    pub fn has_required_fields(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.roll_number.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterUpload {
    #[serde(default)]
    pub students: Vec<CandidateStudent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases_email_only() {
        let candidate = CandidateStudent {
            name: "  Ada Lovelace ".to_string(),
            email: " Ada@Example.COM ".to_string(),
            roll_number: " CS-01A ".to_string(),
            class_section: Some("  ".to_string()),
        };
        let normalized = candidate.normalized();
        assert_eq!(normalized.name, "Ada Lovelace");
        assert_eq!(normalized.email, "ada@example.com");
        assert_eq!(normalized.roll_number, "CS-01A");
        assert_eq!(normalized.class_section, None);
    }

    #[test]
    fn required_fields_reject_blank_values() {
        let mut candidate = CandidateStudent {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roll_number: "1".to_string(),
            class_section: None,
        };
        assert!(candidate.has_required_fields());

        candidate.roll_number = "   ".to_string();
        assert!(!candidate.has_required_fields());
    }

    #[test]
    fn missing_upload_columns_default_to_empty() {
        let candidate: CandidateStudent =
            serde_json::from_str(r#"{"name": "Ada"}"#).unwrap();
        assert_eq!(candidate.name, "Ada");
        assert_eq!(candidate.email, "");
        assert!(!candidate.has_required_fields());
    }
}
