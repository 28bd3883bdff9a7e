//! Operator notifications for new leads and storage failures.
//!
//! Delivery is best-effort per operator: one unreachable operator is logged
//! and skipped, and nothing here can roll back a persisted lead.

use std::sync::Arc;

use tracing::warn;

use crate::channels::{Button, Channel, Keyboard, OutgoingResponse};
use crate::model::{Document, Lead};

pub struct Notifier {
    channel: Arc<dyn Channel>,
    operator_ids: Vec<i64>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn Channel>, operator_ids: Vec<i64>) -> Self {
        Self {
            channel,
            operator_ids,
        }
    }

    /// Announce a freshly persisted lead to every operator, with quick
    /// actions and forwarded attachments.
    pub async fn notify_new_lead(
        &self,
        lead: &Lead,
        documents: &[Document],
        review_plan: Option<&str>,
    ) {
        let text = render_lead_summary(lead, documents.len(), review_plan);
        let keyboard = lead_actions_keyboard(lead.id);

        for &operator_id in &self.operator_ids {
            let response = OutgoingResponse::text(text.clone()).with_keyboard(keyboard.clone());
            if let Err(e) = self.channel.respond(operator_id, response).await {
                warn!(operator_id, lead_id = lead.id, "Failed to notify operator: {e}");
                continue;
            }
            for doc in documents {
                if let Err(e) = self
                    .channel
                    .send_document_ref(
                        operator_id,
                        &doc.file_ref,
                        doc.kind,
                        doc.caption.as_deref(),
                    )
                    .await
                {
                    warn!(
                        operator_id,
                        lead_id = lead.id,
                        document_id = doc.id,
                        "Failed to forward attachment: {e}"
                    );
                }
            }
        }
    }

    /// Surface a storage failure so operators know collected data is
    /// waiting on a retry.
    pub async fn notify_storage_failure(&self, conversation_id: i64, detail: &str) {
        let text = format!(
            "⚠️ Failed to save a completed intake (conversation {conversation_id}): {detail}\n\
             The answers are kept; the user can retry the submission."
        );
        for &operator_id in &self.operator_ids {
            if let Err(e) = self
                .channel
                .respond(operator_id, OutgoingResponse::text(text.clone()))
                .await
            {
                warn!(operator_id, "Failed to deliver storage-failure alert: {e}");
            }
        }
    }
}

/// Quick-action keyboard attached to every new-lead notification.
pub fn lead_actions_keyboard(lead_id: i64) -> Keyboard {
    Keyboard::new()
        .row(vec![Button::new(
            "📂 Open card",
            format!("admin:lead:open:{lead_id}"),
        )])
        .row(vec![Button::new(
            "📎 Attachments",
            format!("admin:files:{lead_id}"),
        )])
        .row(vec![
            Button::new("🟡 In review", format!("admin:lead:status:{lead_id}:in-review")),
            Button::new("✅ Close", format!("admin:lead:status:{lead_id}:closed")),
        ])
}

fn render_lead_summary(lead: &Lead, document_count: usize, review_plan: Option<&str>) -> String {
    let v = |s: Option<&str>| s.filter(|s| !s.is_empty()).unwrap_or("—").to_string();

    let mut lines = vec![
        format!("🔔 *New lead* #{}", lead.id),
        format!("Source: {}", lead.source),
        format!("Name: {}", v(lead.name.as_deref())),
        format!("Contact: {}", v(lead.contact.as_deref())),
    ];
    if let Some(format) = lead.consult_format {
        lines.push(format!("Format: {format}"));
    }
    if let Some(duration) = lead.duration_min {
        lines.push(format!("Duration: {duration} min"));
    }
    if let Some(plan) = review_plan {
        lines.push(format!("Review plan: {plan}"));
    }
    if document_count > 0 {
        lines.push(format!("Attachments: {document_count}"));
    }
    if let Some(brief) = &lead.brief {
        let short: String = brief.chars().take(200).collect();
        lines.push(format!("Brief: {short}"));
    }
    lines.join("\n")
}
