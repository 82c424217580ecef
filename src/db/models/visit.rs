//! Visit models: the record, its status machine, and request DTOs.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::{format_timestamp, parse_timestamp};

/// Separator placed between existing notes and an appended annotation
pub const NOTE_DELIMITER: &str = " | ";

/// Lifecycle status of a visit.
///
/// `Active` is the only initial state. `Completed` and `Cancelled` are
/// terminal and there is no transition between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VisitStatus {
    Active,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub const ALL: [VisitStatus; 3] = [Self::Active, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether the state machine has an edge from `self` to `next`
    pub fn can_transition_to(&self, next: VisitStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown visit status: {}", s)),
        }
    }
}

/// Kind of identity document presented at the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Cpf,
    Rg,
    Cnh,
    Outro,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [Self::Cpf, Self::Rg, Self::Cnh, Self::Outro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpf => "CPF",
            Self::Rg => "RG",
            Self::Cnh => "CNH",
            Self::Outro => "OUTRO",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CPF" => Ok(Self::Cpf),
            "RG" => Ok(Self::Rg),
            "CNH" => Ok(Self::Cnh),
            "OUTRO" => Ok(Self::Outro),
            _ => Err(format!(
                "Invalid document type. Must be one of: {}",
                DocumentType::ALL.map(|d| d.as_str()).join(", ")
            )),
        }
    }
}

/// The user who registered a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitOwner {
    pub name: String,
    pub email: String,
}

/// A visit with its owner attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: i64,
    pub name: String,
    pub document: String,
    pub document_type: DocumentType,
    pub phone: Option<String>,
    pub relationship: String,
    pub patient_name: String,
    pub notes: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub user: VisitOwner,
}

/// A validated visit ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub name: String,
    pub document: String,
    pub document_type: DocumentType,
    pub phone: Option<String>,
    pub relationship: String,
    pub patient_name: String,
    pub notes: Option<String>,
    pub user_id: i64,
    pub check_in: DateTime<Utc>,
}

/// Terminal transition applied to an active visit
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    CheckOut { at: DateTime<Utc> },
    Cancel { at: DateTime<Utc> },
}

impl Transition {
    pub fn target(&self) -> VisitStatus {
        match self {
            Self::CheckOut { .. } => VisitStatus::Completed,
            Self::Cancel { .. } => VisitStatus::Cancelled,
        }
    }
}

/// Annotation appended to the notes of a cancelled visit
pub fn cancellation_marker(at: &DateTime<Utc>) -> String {
    format!("[CANCELADO: {}]", format_timestamp(at))
}

/// Append `annotation` to existing notes without overwriting them
pub fn append_note(existing: Option<&str>, annotation: &str) -> String {
    match existing {
        Some(prior) if !prior.is_empty() => format!("{}{}{}", prior, NOTE_DELIMITER, annotation),
        _ => annotation.to_string(),
    }
}

/// Request body for registering a visit.
///
/// Fields default to empty so that a missing field is reported by validation
/// rather than rejected by the JSON extractor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVisitRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Row shape of the visits/users join
#[derive(Debug, Clone, FromRow)]
pub struct VisitRow {
    pub id: i64,
    pub name: String,
    pub document: String,
    pub document_type: String,
    pub phone: Option<String>,
    pub relationship: String,
    pub patient_name: String,
    pub notes: Option<String>,
    pub check_in: String,
    pub check_out: Option<String>,
    pub status: String,
    pub user_id: i64,
    pub created_at: String,
    pub owner_name: String,
    pub owner_email: String,
}

impl TryFrom<VisitRow> for Visit {
    type Error = anyhow::Error;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            document: row.document,
            document_type: row.document_type.parse().map_err(|e: String| anyhow!(e))?,
            phone: row.phone,
            relationship: row.relationship,
            patient_name: row.patient_name,
            notes: row.notes,
            check_in: parse_timestamp(&row.check_in)?,
            check_out: row.check_out.as_deref().map(parse_timestamp).transpose()?,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            user_id: row.user_id,
            created_at: parse_timestamp(&row.created_at)?,
            user: VisitOwner {
                name: row.owner_name,
                email: row.owner_email,
            },
        })
    }
}
