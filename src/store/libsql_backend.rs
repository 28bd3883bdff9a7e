//! libSQL backend — async `LeadStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! serializes writes, so no two status updates on the same lead row can
//! interleave.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{
    Document, DocumentKind, Lead, LeadFilter, LeadSource, LeadStatus, NewDocument, NewLead,
    NewMessageLog, Page, User, UserProfile,
};
use crate::store::migrations;
use crate::store::traits::LeadStore;

/// libSQL store backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Pool(format!("Failed to create database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_db(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;
        Self::from_db(db).await
    }

    async fn from_db(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        // SQLite only honors ON DELETE CASCADE with this pragma on.
        conn.execute("PRAGMA foreign_keys=ON", ())
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_user_by_platform_id(&self, platform_id: i64) -> Result<Option<User>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE platform_id = ?1"),
                params![platform_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_user_by_platform_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| StoreError::Query(format!("user row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_user_by_platform_id: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const USER_COLUMNS: &str =
    "id, platform_id, username, first_name, last_name, language_code, created_at, last_seen_at";

const LEAD_COLUMNS: &str = "id, user_id, source, category, brief, urgency, consult_format, \
     duration_min, slot, name, contact, email, status, created_at";

const DOCUMENT_COLUMNS: &str = "id, lead_id, file_ref, kind, caption, created_at";

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let created_str: String = row.get(6)?;
    let seen_str: String = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        platform_id: row.get(1)?,
        username: row.get(2).ok(),
        first_name: row.get(3).ok(),
        last_name: row.get(4).ok(),
        language_code: row.get(5).ok(),
        created_at: parse_datetime(&created_str),
        last_seen_at: parse_datetime(&seen_str),
    })
}

fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let source_str: String = row.get(2)?;
    let format_str: Option<String> = row.get(6).ok();
    let duration: Option<i64> = row.get(7).ok();
    let status_str: String = row.get(12)?;
    let created_str: String = row.get(13)?;

    Ok(Lead {
        id: row.get(0)?,
        user_id: row.get(1)?,
        source: LeadSource::parse(&source_str).unwrap_or(LeadSource::QuickQuestion),
        category: row.get(3).ok(),
        brief: row.get(4).ok(),
        urgency: row.get(5).ok(),
        consult_format: format_str.as_deref().and_then(crate::model::ConsultFormat::parse),
        duration_min: duration.map(|d| d as u16),
        slot: row.get(8).ok(),
        name: row.get(9).ok(),
        contact: row.get(10).ok(),
        email: row.get(11).ok(),
        status: LeadStatus::parse(&status_str).unwrap_or(LeadStatus::New),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_document(row: &libsql::Row) -> Result<Document, libsql::Error> {
    let kind_str: String = row.get(3)?;
    let created_str: String = row.get(5)?;
    Ok(Document {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        file_ref: row.get(2)?,
        kind: DocumentKind::parse(&kind_str).unwrap_or(DocumentKind::File),
        caption: row.get(4).ok(),
        created_at: parse_datetime(&created_str),
    })
}

/// Build the WHERE clause and parameter list for a lead filter.
fn filter_clause(filter: &LeadFilter) -> (String, Vec<libsql::Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(libsql::Value::Text(status.as_str().to_string()));
    }
    if let Some(source) = filter.source {
        clauses.push("source = ?");
        values.push(libsql::Value::Text(source.as_str().to_string()));
    }
    if let Some(days) = filter.since.days() {
        clauses.push("created_at >= ?");
        let cutoff = Utc::now() - Duration::days(days);
        values.push(libsql::Value::Text(cutoff.to_rfc3339()));
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        // libsql positional params are 1-based in order of appearance
        let mut numbered = Vec::with_capacity(clauses.len());
        for (i, c) in clauses.iter().enumerate() {
            numbered.push(c.replace('?', &format!("?{}", i + 1)));
        }
        format!(" WHERE {}", numbered.join(" AND "))
    };

    (clause, values)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl LeadStore for LibSqlBackend {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (platform_id, username, first_name, last_name, language_code,
                        created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(platform_id) DO UPDATE SET
                        username = excluded.username,
                        first_name = excluded.first_name,
                        last_name = excluded.last_name,
                        language_code = excluded.language_code,
                        last_seen_at = excluded.last_seen_at",
                params![
                    profile.platform_id,
                    opt_text(profile.username.as_deref()),
                    opt_text(profile.first_name.as_deref()),
                    opt_text(profile.last_name.as_deref()),
                    opt_text(profile.language_code.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_user: {e}")))?;

        self.get_user_by_platform_id(profile.platform_id)
            .await?
            .ok_or_else(|| StoreError::Query("upsert_user: row missing after upsert".into()))
    }

    async fn create_lead(
        &self,
        lead: &NewLead,
        documents: &[NewDocument],
    ) -> Result<Lead, StoreError> {
        lead.validate(documents.len())?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("create_lead begin: {e}")))?;

        tx.execute(
            "INSERT INTO leads (user_id, source, category, brief, urgency, consult_format,
                    duration_min, slot, name, contact, email, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'new', ?12)",
            params![
                lead.user_id,
                lead.source.as_str(),
                opt_text(lead.category.as_deref()),
                opt_text(lead.brief.as_deref()),
                opt_text(lead.urgency.as_deref()),
                opt_text(lead.consult_format.map(|f| f.as_str())),
                match lead.duration_min {
                    Some(d) => libsql::Value::Integer(d as i64),
                    None => libsql::Value::Null,
                },
                opt_text(lead.slot.as_deref()),
                opt_text(lead.name.as_deref()),
                opt_text(lead.contact.as_deref()),
                opt_text(lead.email.as_deref()),
                now_str.clone(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("create_lead insert: {e}")))?;

        let lead_id = tx.last_insert_rowid();

        for doc in documents {
            tx.execute(
                "INSERT INTO documents (lead_id, file_ref, kind, caption, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    lead_id,
                    doc.file_ref.as_str(),
                    doc.kind.as_str(),
                    opt_text(doc.caption.as_deref()),
                    now_str.clone(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create_lead document insert: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(format!("create_lead commit: {e}")))?;

        debug!(lead_id, source = %lead.source, documents = documents.len(), "Lead created");

        Ok(Lead {
            id: lead_id,
            user_id: lead.user_id,
            source: lead.source,
            category: lead.category.clone(),
            brief: lead.brief.clone(),
            urgency: lead.urgency.clone(),
            consult_format: lead.consult_format,
            duration_min: lead.duration_min,
            slot: lead.slot.clone(),
            name: lead.name.clone(),
            contact: lead.contact.clone(),
            email: lead.email.clone(),
            status: LeadStatus::New,
            created_at: now,
        })
    }

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let lead = row_to_lead(&row)
                    .map_err(|e| StoreError::Query(format!("get_lead row parse: {e}")))?;
                Ok(Some(lead))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn update_lead_status(&self, id: i64, status: LeadStatus) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_lead_status: {e}")))?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "lead".into(),
                id,
            });
        }
        debug!(lead_id = id, status = %status, "Lead status updated");
        Ok(())
    }

    async fn delete_lead(&self, id: i64) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute("DELETE FROM leads WHERE id = ?1", params![id])
            .await
            .map_err(|e| StoreError::Query(format!("delete_lead: {e}")))?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "lead".into(),
                id,
            });
        }
        debug!(lead_id = id, "Lead deleted (documents cascaded)");
        Ok(())
    }

    async fn list_leads(
        &self,
        filter: &LeadFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Lead>, StoreError> {
        let (clause, values) = filter_clause(filter);

        let mut count_rows = self
            .conn()
            .query(
                &format!("SELECT COUNT(*) FROM leads{clause}"),
                values.clone(),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_leads count: {e}")))?;

        let total: i64 = match count_rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| StoreError::Query(format!("list_leads count parse: {e}")))?,
            Ok(None) => 0,
            Err(e) => return Err(StoreError::Query(format!("list_leads count: {e}"))),
        };

        let offset = page as i64 * per_page as i64;
        let mut page_values = values;
        let limit_idx = page_values.len() + 1;
        let offset_idx = page_values.len() + 2;
        page_values.push(libsql::Value::Integer(per_page as i64));
        page_values.push(libsql::Value::Integer(offset));

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads{clause} \
                     ORDER BY created_at DESC, id DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
                ),
                page_values,
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_leads: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => items.push(lead),
                Err(e) => tracing::warn!("Skipping lead row: {e}"),
            }
        }

        Ok(Page {
            items,
            total: total as u64,
            page,
            per_page,
        })
    }

    async fn list_documents(&self, lead_id: i64) -> Result<Vec<Document>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE lead_id = ?1 ORDER BY id ASC"
                ),
                params![lead_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_documents: {e}")))?;

        let mut docs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_document(&row) {
                Ok(doc) => docs.push(doc),
                Err(e) => tracing::warn!("Skipping document row: {e}"),
            }
        }
        Ok(docs)
    }

    async fn append_message_log(&self, entry: &NewMessageLog) -> Result<(), StoreError> {
        let payload_str = entry
            .payload
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());

        self.conn()
            .execute(
                "INSERT INTO message_logs (user_id, direction, text, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.user_id,
                    entry.direction.as_str(),
                    opt_text(entry.text.as_deref()),
                    opt_text(payload_str.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_message_log: {e}")))?;
        Ok(())
    }
}
