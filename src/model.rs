//! Domain types: users, leads, documents, message logs, list filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ── Leads ───────────────────────────────────────────────────────────

/// Which intake flow produced a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadSource {
    QuickQuestion,
    Consultation,
    DocumentReview,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickQuestion => "quick-question",
            Self::Consultation => "consultation",
            Self::DocumentReview => "document-review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick-question" => Some(Self::QuickQuestion),
            "consultation" => Some(Self::Consultation),
            "document-review" => Some(Self::DocumentReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead workflow status. Any status is reachable from any other; values
/// outside this set are rejected at the parse boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    New,
    InReview,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InReview => "in-review",
            Self::Closed => "closed",
        }
    }

    /// Parse a raw status string, rejecting anything outside the allowed set.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "new" => Ok(Self::New),
            "in-review" => Ok(Self::InReview),
            "closed" => Ok(Self::Closed),
            other => Err(StoreError::InvalidTransition {
                status: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consultation delivery format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultFormat {
    Phone,
    ChatCall,
    Video,
}

impl ConsultFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::ChatCall => "chat-call",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phone" => Some(Self::Phone),
            "chat-call" => Some(Self::ChatCall),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConsultFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted lead — one completed intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub user_id: i64,
    pub source: LeadSource,
    pub category: Option<String>,
    pub brief: Option<String>,
    pub urgency: Option<String>,
    pub consult_format: Option<ConsultFormat>,
    pub duration_min: Option<u16>,
    pub slot: Option<String>,
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Lead data as assembled by a completed dialog, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub user_id: i64,
    pub source: LeadSource,
    pub category: Option<String>,
    pub brief: Option<String>,
    pub urgency: Option<String>,
    pub consult_format: Option<ConsultFormat>,
    pub duration_min: Option<u16>,
    pub slot: Option<String>,
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
}

impl NewLead {
    /// Empty lead skeleton for the given user and source.
    pub fn new(user_id: i64, source: LeadSource) -> Self {
        Self {
            user_id,
            source,
            category: None,
            brief: None,
            urgency: None,
            consult_format: None,
            duration_min: None,
            slot: None,
            name: None,
            contact: None,
            email: None,
        }
    }

    /// Check the source-specific required fields and the consultation-field
    /// invariant. Called by the store before any row is written.
    pub fn validate(&self, document_count: usize) -> Result<(), StoreError> {
        let missing = |field: &str| {
            StoreError::Validation(format!(
                "{} lead is missing required field: {field}",
                self.source
            ))
        };

        match self.source {
            LeadSource::QuickQuestion => {
                if self.category.is_none() {
                    return Err(missing("category"));
                }
                if self.brief.is_none() {
                    return Err(missing("brief"));
                }
                if self.urgency.is_none() {
                    return Err(missing("urgency"));
                }
                if self.name.is_none() {
                    return Err(missing("name"));
                }
                if self.contact.is_none() {
                    return Err(missing("contact"));
                }
                if document_count > crate::dialog::MAX_QUICK_ATTACHMENTS {
                    return Err(StoreError::Validation(format!(
                        "quick-question lead has {document_count} documents, limit is {}",
                        crate::dialog::MAX_QUICK_ATTACHMENTS
                    )));
                }
            }
            LeadSource::Consultation => {
                if self.consult_format.is_none() {
                    return Err(missing("consult_format"));
                }
                if self.duration_min.is_none() {
                    return Err(missing("duration_min"));
                }
                if self.name.is_none() {
                    return Err(missing("name"));
                }
                if self.contact.is_none() {
                    return Err(missing("contact"));
                }
            }
            LeadSource::DocumentReview => {
                if self.category.is_none() {
                    return Err(missing("category"));
                }
            }
        }

        // Consultation-specific fields are non-null iff source is consultation.
        if self.source != LeadSource::Consultation
            && (self.consult_format.is_some() || self.duration_min.is_some())
        {
            return Err(StoreError::Validation(format!(
                "{} lead must not carry consultation fields",
                self.source
            )));
        }

        if let Some(brief) = &self.brief {
            if brief.chars().count() > crate::dialog::MAX_BRIEF_CHARS {
                return Err(StoreError::Validation(format!(
                    "brief exceeds {} characters",
                    crate::dialog::MAX_BRIEF_CHARS
                )));
            }
        }

        if let Some(d) = self.duration_min {
            if d != 30 && d != 60 {
                return Err(StoreError::Validation(format!(
                    "duration must be 30 or 60 minutes, got {d}"
                )));
            }
        }

        Ok(())
    }
}

// ── Documents ───────────────────────────────────────────────────────

/// Kind of a stored attachment reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    File,
    Photo,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Photo => "photo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "photo" => Some(Self::Photo),
            _ => None,
        }
    }
}

/// A stored attachment. Owned exclusively by its lead; destroyed with it.
/// `file_ref` is an opaque transport reference, never raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub lead_id: i64,
    pub file_ref: String,
    pub kind: DocumentKind,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Attachment data buffered during a dialog, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub file_ref: String,
    pub kind: DocumentKind,
    pub caption: Option<String>,
}

// ── Users ───────────────────────────────────────────────────────────

/// An end user of the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub platform_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Profile snapshot used for the per-message upsert.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub platform_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

// ── Message log ─────────────────────────────────────────────────────

/// Direction of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// One append-only audit row per inbound/outbound message.
#[derive(Debug, Clone)]
pub struct NewMessageLog {
    pub user_id: i64,
    pub direction: Direction,
    pub text: Option<String>,
    pub payload: Option<serde_json::Value>,
}

// ── Listing ─────────────────────────────────────────────────────────

/// Creation-time window for lead listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SincePeriod {
    Days7,
    #[default]
    Days30,
    Days90,
    All,
}

impl SincePeriod {
    /// Number of days covered, or `None` for the unbounded window.
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Days7 => Some(7),
            Self::Days30 => Some(30),
            Self::Days90 => Some(90),
            Self::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days7 => "7d",
            Self::Days30 => "30d",
            Self::Days90 => "90d",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "7d" => Some(Self::Days7),
            "30d" => Some(Self::Days30),
            "90d" => Some(Self::Days90),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Lead list filter. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub since: SincePeriod,
}

/// One page of a filtered listing plus the total match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Whether a further page exists after this one.
    pub fn has_next(&self) -> bool {
        let seen = (self.page as u64 + 1) * self.per_page as u64;
        seen < self.total
    }
}
