//! Admin panel: filtered lead listing, lead cards, status actions, export.
//!
//! Driven entirely by operator callbacks. Filter state is per operator and
//! lives only in memory; it resets on restart, which is fine for a panel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::admin::export;
use crate::channels::{Button, Channel, Keyboard, OutgoingResponse};
use crate::error::{Error, StoreError};
use crate::model::{Lead, LeadFilter, LeadSource, LeadStatus, Page, SincePeriod};
use crate::store::LeadStore;

/// Leads per listing page.
pub const PAGE_SIZE: u32 = 10;

pub struct AdminService {
    store: Arc<dyn LeadStore>,
    channel: Arc<dyn Channel>,
    operator_ids: Vec<i64>,
    filters: Mutex<HashMap<i64, LeadFilter>>,
    export_dir: PathBuf,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn LeadStore>,
        channel: Arc<dyn Channel>,
        operator_ids: Vec<i64>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            channel,
            operator_ids,
            filters: Mutex::new(HashMap::new()),
            export_dir,
        }
    }

    pub fn is_operator(&self, platform_id: i64) -> bool {
        self.operator_ids.contains(&platform_id)
    }

    /// Active filter for an operator (defaults if never set).
    pub fn filter_for(&self, operator_id: i64) -> LeadFilter {
        self.filters
            .lock()
            .expect("filter map poisoned")
            .get(&operator_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_filter_field(&self, operator_id: i64, key: &str, value: &str) -> Result<(), String> {
        let mut filters = self.filters.lock().expect("filter map poisoned");
        let filter = filters.entry(operator_id).or_default();
        match key {
            "status" => {
                filter.status = match value {
                    "any" => None,
                    other => Some(
                        LeadStatus::parse(other).map_err(|_| format!("unknown status: {other}"))?,
                    ),
                };
            }
            "source" => {
                filter.source = match value {
                    "any" => None,
                    other => Some(
                        LeadSource::parse(other).ok_or_else(|| format!("unknown source: {other}"))?,
                    ),
                };
            }
            "period" => {
                filter.since =
                    SincePeriod::parse(value).ok_or_else(|| format!("unknown period: {value}"))?;
            }
            other => return Err(format!("unknown filter key: {other}")),
        }
        Ok(())
    }

    fn clear_filter(&self, operator_id: i64) {
        self.filters
            .lock()
            .expect("filter map poisoned")
            .remove(&operator_id);
    }

    /// The `/admin` command: show the menu, or refuse non-operators.
    pub async fn handle_command(
        &self,
        conversation_id: i64,
        sender_id: i64,
    ) -> Result<(), Error> {
        if !self.is_operator(sender_id) {
            self.channel
                .respond(conversation_id, OutgoingResponse::text("Access denied."))
                .await?;
            return Ok(());
        }
        self.send_menu(conversation_id).await
    }

    /// Route one `admin:*` callback.
    pub async fn handle_callback(
        &self,
        conversation_id: i64,
        sender_id: i64,
        data: &str,
    ) -> Result<(), Error> {
        if !self.is_operator(sender_id) {
            warn!(sender_id, data, "Non-operator admin callback refused");
            self.channel
                .respond(conversation_id, OutgoingResponse::text("Access denied."))
                .await?;
            return Ok(());
        }

        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            ["admin", "menu"] => self.send_menu(conversation_id).await,

            ["admin", "list", scope, page] => {
                let page = page.parse::<u32>().unwrap_or(0);
                self.send_list(conversation_id, sender_id, scope, page).await
            }

            ["admin", "lead", "open", id] => {
                let id = id.parse::<i64>().unwrap_or(0);
                self.send_lead_card(conversation_id, id).await
            }

            ["admin", "lead", "status", id, status] => {
                let id = id.parse::<i64>().unwrap_or(0);
                self.set_status(conversation_id, id, status).await
            }

            ["admin", "lead", "delete", id] => {
                let id = id.parse::<i64>().unwrap_or(0);
                self.delete_lead(conversation_id, sender_id, id).await
            }

            ["admin", "files", id] => {
                let id = id.parse::<i64>().unwrap_or(0);
                self.send_attachments(conversation_id, id).await
            }

            ["admin", "filters"] => self.send_filters(conversation_id, sender_id, None).await,

            ["admin", "filters", "set", key, value] => {
                let note = match self.set_filter_field(sender_id, key, value) {
                    Ok(()) => "Filters updated.",
                    Err(e) => {
                        warn!(sender_id, "Bad filter callback: {e}");
                        "That filter value was not recognized."
                    }
                };
                self.send_filters(conversation_id, sender_id, Some(note)).await
            }

            ["admin", "filters", "clear"] => {
                self.clear_filter(sender_id);
                self.send_filters(conversation_id, sender_id, Some("Filters cleared."))
                    .await
            }

            ["admin", "export"] => self.export(conversation_id, sender_id).await,

            _ => {
                warn!(data, "Unknown admin callback");
                Ok(())
            }
        }
    }

    async fn send_menu(&self, conversation_id: i64) -> Result<(), Error> {
        let keyboard = Keyboard::new()
            .row(vec![
                Button::new("🆕 New", "admin:list:new:0"),
                Button::new("📄 All", "admin:list:all:0"),
            ])
            .row(vec![
                Button::new("⚙️ Filters", "admin:filters"),
                Button::new("📤 Export CSV", "admin:export"),
            ]);
        self.channel
            .respond(
                conversation_id,
                OutgoingResponse::text("Admin panel:").with_keyboard(keyboard),
            )
            .await?;
        Ok(())
    }

    async fn send_list(
        &self,
        conversation_id: i64,
        operator_id: i64,
        scope: &str,
        page: u32,
    ) -> Result<(), Error> {
        let mut filter = self.filter_for(operator_id);
        if scope == "new" {
            filter.status = Some(LeadStatus::New);
        }

        let leads = self.store.list_leads(&filter, page, PAGE_SIZE).await?;
        let title = if scope == "new" { "New leads" } else { "All leads" };
        let text = format!(
            "{title} (page {}, {} total)\n{}",
            page + 1,
            leads.total,
            filter_summary(&filter)
        );
        let keyboard = list_keyboard(&leads, scope, page);
        self.channel
            .respond(
                conversation_id,
                OutgoingResponse::text(text).with_keyboard(keyboard),
            )
            .await?;
        Ok(())
    }

    async fn send_lead_card(&self, conversation_id: i64, lead_id: i64) -> Result<(), Error> {
        let Some(lead) = self.store.get_lead(lead_id).await? else {
            self.channel
                .respond(conversation_id, OutgoingResponse::text("Lead not found."))
                .await?;
            return Ok(());
        };
        let documents = self.store.list_documents(lead_id).await?;
        let text = render_lead_card(&lead, documents.len());
        self.channel
            .respond(
                conversation_id,
                OutgoingResponse::text(text).with_keyboard(card_keyboard(lead_id)),
            )
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        conversation_id: i64,
        lead_id: i64,
        status_raw: &str,
    ) -> Result<(), Error> {
        // Raw callback text is parsed at the boundary
        let status = match LeadStatus::parse(status_raw) {
            Ok(s) => s,
            Err(e) => {
                self.channel
                    .respond(conversation_id, OutgoingResponse::text(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        match self.store.update_lead_status(lead_id, status).await {
            Ok(()) => {
                info!(lead_id, status = %status, "Lead status set by operator");
                self.send_lead_card(conversation_id, lead_id).await
            }
            Err(StoreError::NotFound { .. }) => {
                self.channel
                    .respond(conversation_id, OutgoingResponse::text("Lead not found."))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_lead(
        &self,
        conversation_id: i64,
        operator_id: i64,
        lead_id: i64,
    ) -> Result<(), Error> {
        match self.store.delete_lead(lead_id).await {
            Ok(()) => {
                info!(lead_id, "Lead deleted by operator");
                self.channel
                    .respond(
                        conversation_id,
                        OutgoingResponse::text(format!("Lead #{lead_id} deleted.")),
                    )
                    .await?;
                self.send_list(conversation_id, operator_id, "all", 0).await
            }
            Err(StoreError::NotFound { .. }) => {
                self.channel
                    .respond(conversation_id, OutgoingResponse::text("Lead not found."))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_attachments(&self, conversation_id: i64, lead_id: i64) -> Result<(), Error> {
        let documents = self.store.list_documents(lead_id).await?;
        if documents.is_empty() {
            self.channel
                .respond(
                    conversation_id,
                    OutgoingResponse::text("No attachments on this lead."),
                )
                .await?;
            return Ok(());
        }
        for doc in &documents {
            if let Err(e) = self
                .channel
                .send_document_ref(
                    conversation_id,
                    &doc.file_ref,
                    doc.kind,
                    doc.caption.as_deref(),
                )
                .await
            {
                warn!(lead_id, document_id = doc.id, "Failed to send attachment: {e}");
            }
        }
        Ok(())
    }

    async fn send_filters(
        &self,
        conversation_id: i64,
        operator_id: i64,
        note: Option<&str>,
    ) -> Result<(), Error> {
        let filter = self.filter_for(operator_id);
        let mut text = String::new();
        if let Some(note) = note {
            text.push_str(note);
            text.push('\n');
        }
        text.push_str("Filters (applied to listings):\n");
        text.push_str(&filter_summary(&filter));
        self.channel
            .respond(
                conversation_id,
                OutgoingResponse::text(text).with_keyboard(filters_keyboard(&filter)),
            )
            .await?;
        Ok(())
    }

    async fn export(&self, conversation_id: i64, operator_id: i64) -> Result<(), Error> {
        let filter = self.filter_for(operator_id);
        // Single page large enough for a full dump
        let leads = self.store.list_leads(&filter, 0, u32::MAX).await?;

        let (file_name, bytes) = match export::write_export(&leads.items, &self.export_dir) {
            Ok(result) => result,
            Err(e) => {
                warn!("CSV export failed: {e:#}");
                self.channel
                    .respond(
                        conversation_id,
                        OutgoingResponse::text("Export failed; nothing was changed."),
                    )
                    .await?;
                return Ok(());
            }
        };

        if let Err(e) = self
            .channel
            .send_file_bytes(
                conversation_id,
                bytes,
                &file_name,
                Some(&format!("{} leads", leads.items.len())),
            )
            .await
        {
            warn!("Failed to deliver export: {e:#}");
            self.channel
                .respond(
                    conversation_id,
                    OutgoingResponse::text("Export was written but could not be delivered."),
                )
                .await?;
        }
        Ok(())
    }
}

// ── Rendering ───────────────────────────────────────────────────────

fn filter_summary(filter: &LeadFilter) -> String {
    let status = filter
        .status
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "any".into());
    let source = filter
        .source
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "any".into());
    format!(
        "Status: {status} • Source: {source} • Period: {}",
        filter.since.as_str()
    )
}

fn render_lead_card(lead: &Lead, document_count: usize) -> String {
    let v = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).unwrap_or("—").to_string();

    let mut lines = vec![
        format!("*Lead #{}* ({})", lead.id, lead.status),
        format!("Source: {}", lead.source),
        format!("Created: {}", lead.created_at.format("%d.%m.%Y %H:%M")),
        format!("Name: {}", v(lead.name.as_deref())),
        format!("Contact: {}", v(lead.contact.as_deref())),
        format!("Email: {}", v(lead.email.as_deref())),
        format!("Category: {}", v(lead.category.as_deref())),
        format!("Urgency: {}", v(lead.urgency.as_deref())),
    ];
    if let Some(format) = lead.consult_format {
        lines.push(format!("Format: {format}"));
    }
    if let Some(duration) = lead.duration_min {
        lines.push(format!("Duration: {duration} min"));
    }
    if document_count > 0 {
        lines.push(format!("Attachments: {document_count}"));
    }
    if let Some(brief) = &lead.brief {
        lines.push(format!("\nBrief:\n{brief}"));
    }
    lines.join("\n")
}

fn card_keyboard(lead_id: i64) -> Keyboard {
    Keyboard::new()
        .row(vec![
            Button::new("🟡 In review", format!("admin:lead:status:{lead_id}:in-review")),
            Button::new("✅ Close", format!("admin:lead:status:{lead_id}:closed")),
        ])
        .row(vec![
            Button::new("📎 Attachments", format!("admin:files:{lead_id}")),
            Button::new("🗑 Delete", format!("admin:lead:delete:{lead_id}")),
        ])
        .row(vec![Button::new("⬅️ Back to list", "admin:list:all:0")])
}

fn list_keyboard(page: &Page<Lead>, scope: &str, page_idx: u32) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for lead in &page.items {
        let who = lead
            .name
            .as_deref()
            .or(lead.contact.as_deref())
            .unwrap_or("anonymous");
        let mut title = format!("#{} • {} • {} • {}", lead.id, lead.source, who, lead.status);
        title.truncate(64);
        keyboard = keyboard.row(vec![Button::new(
            title,
            format!("admin:lead:open:{}", lead.id),
        )]);
    }

    let mut nav = Vec::new();
    if page_idx > 0 {
        nav.push(Button::new(
            "⬅️ Prev",
            format!("admin:list:{scope}:{}", page_idx - 1),
        ));
    }
    nav.push(Button::new("🏠 Menu", "admin:menu"));
    if page.has_next() {
        nav.push(Button::new(
            "Next ➡️",
            format!("admin:list:{scope}:{}", page_idx + 1),
        ));
    }
    keyboard.row(nav)
}

fn filters_keyboard(filter: &LeadFilter) -> Keyboard {
    let mark = |label: &str, selected: bool| {
        if selected {
            format!("✅ {label}")
        } else {
            label.to_string()
        }
    };
    let status = |s: Option<LeadStatus>| filter.status == s;
    let source = |s: Option<LeadSource>| filter.source == s;

    Keyboard::new()
        .row(vec![Button::new(
            mark("All statuses", status(None)),
            "admin:filters:set:status:any",
        )])
        .row(vec![
            Button::new(
                mark("New", status(Some(LeadStatus::New))),
                "admin:filters:set:status:new",
            ),
            Button::new(
                mark("In review", status(Some(LeadStatus::InReview))),
                "admin:filters:set:status:in-review",
            ),
            Button::new(
                mark("Closed", status(Some(LeadStatus::Closed))),
                "admin:filters:set:status:closed",
            ),
        ])
        .row(vec![Button::new(
            mark("All sources", source(None)),
            "admin:filters:set:source:any",
        )])
        .row(vec![
            Button::new(
                mark("Quick", source(Some(LeadSource::QuickQuestion))),
                "admin:filters:set:source:quick-question",
            ),
            Button::new(
                mark("Consultation", source(Some(LeadSource::Consultation))),
                "admin:filters:set:source:consultation",
            ),
            Button::new(
                mark("Documents", source(Some(LeadSource::DocumentReview))),
                "admin:filters:set:source:document-review",
            ),
        ])
        .row(vec![
            Button::new(
                mark("7d", filter.since == SincePeriod::Days7),
                "admin:filters:set:period:7d",
            ),
            Button::new(
                mark("30d", filter.since == SincePeriod::Days30),
                "admin:filters:set:period:30d",
            ),
            Button::new(
                mark("90d", filter.since == SincePeriod::Days90),
                "admin:filters:set:period:90d",
            ),
            Button::new(
                mark("All time", filter.since == SincePeriod::All),
                "admin:filters:set:period:all",
            ),
        ])
        .row(vec![
            Button::new("📄 Show leads", "admin:list:all:0"),
            Button::new("🧼 Clear", "admin:filters:clear"),
            Button::new("🏠 Menu", "admin:menu"),
        ])
}
