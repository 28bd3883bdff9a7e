//! Telegram channel — long-polls the Bot API for updates.
//!
//! Handles plain messages, inline-keyboard callback queries, document and
//! photo attachments, and shared contact cards, all normalized into
//! [`IncomingMessage`] for the layers above.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::channels::{
    Channel, IncomingMessage, InputPayload, Keyboard, MessageStream, OutgoingResponse,
};
use crate::error::ChannelError;
use crate::model::DocumentKind;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit; the
    /// keyboard, if any, is attached to the final chunk.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            let kb = if i == last { keyboard } else { None };
            self.send_message_chunk(chat_id, chunk, kb).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(kb) = keyboard {
            markdown_body["reply_markup"] = keyboard_markup(kb);
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        let _markdown_err = markdown_resp.text().await.unwrap_or_default();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = keyboard_markup(kb);
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{}/getUpdates", bot_token);
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(incoming) = parse_update(update) else {
                            continue;
                        };

                        if tx.send(incoming).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        conversation_id: i64,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.send_message(conversation_id, &response.text, response.keyboard.as_ref())
            .await
    }

    async fn send_document_ref(
        &self,
        conversation_id: i64,
        file_ref: &str,
        kind: DocumentKind,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        // A stored file_id re-sends without re-uploading
        let (method, field) = match kind {
            DocumentKind::File => ("sendDocument", "document"),
            DocumentKind::Photo => ("sendPhoto", "photo"),
        };

        let mut body = serde_json::json!({
            "chat_id": conversation_id,
            field: file_ref,
        });
        if let Some(cap) = caption {
            body["caption"] = serde_json::Value::String(cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed: {err}"),
            });
        }
        Ok(())
    }

    async fn send_file_bytes(
        &self,
        conversation_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());

        let mut form = Form::new()
            .text("chat_id", conversation_id.to_string())
            .part("document", part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!("Telegram document sent to {conversation_id}: {file_name}");
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            // Stale callbacks expire server-side; not worth surfacing
            tracing::debug!(status = ?resp.status(), "answerCallbackQuery failed");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Render an inline keyboard as a Telegram reply_markup value.
fn keyboard_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Normalize one getUpdates entry. Returns None for update shapes the bot
/// doesn't handle (edits, channel posts, stickers, ...).
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    if let Some(callback) = update.get("callback_query") {
        return parse_callback_query(callback);
    }
    let message = update.get("message")?;
    parse_message(message)
}

fn parse_callback_query(callback: &serde_json::Value) -> Option<IncomingMessage> {
    let id = callback.get("id")?.as_str()?.to_string();
    let data = callback.get("data")?.as_str()?.to_string();
    let from = callback.get("from")?;
    let chat_id = callback
        .get("message")
        .and_then(|m| m.get("chat"))
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    Some(IncomingMessage {
        channel: "telegram",
        conversation_id: chat_id,
        sender_id: from.get("id")?.as_i64()?,
        username: json_str(from, "username"),
        first_name: json_str(from, "first_name"),
        last_name: json_str(from, "last_name"),
        language_code: json_str(from, "language_code"),
        payload: InputPayload::Callback { id, data },
    })
}

fn parse_message(message: &serde_json::Value) -> Option<IncomingMessage> {
    let from = message.get("from")?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    let caption = json_str(message, "caption");

    let payload = if let Some(document) = message.get("document") {
        InputPayload::Attachment {
            file_ref: document.get("file_id")?.as_str()?.to_string(),
            kind: DocumentKind::File,
            caption,
        }
    } else if let Some(photos) = message.get("photo").and_then(serde_json::Value::as_array) {
        // Telegram sends multiple sizes; the last is the largest
        let largest = photos.last()?;
        InputPayload::Attachment {
            file_ref: largest.get("file_id")?.as_str()?.to_string(),
            kind: DocumentKind::Photo,
            caption,
        }
    } else if let Some(contact) = message.get("contact") {
        InputPayload::Contact {
            phone: contact.get("phone_number")?.as_str()?.to_string(),
        }
    } else if let Some(text) = message.get("text").and_then(serde_json::Value::as_str) {
        InputPayload::Text(text.to_string())
    } else {
        return None;
    };

    Some(IncomingMessage {
        channel: "telegram",
        conversation_id: chat_id,
        sender_id: from.get("id")?.as_i64()?,
        username: json_str(from, "username"),
        first_name: json_str(from, "first_name"),
        last_name: json_str(from, "last_name"),
        language_code: json_str(from, "language_code"),
        payload,
    })
}

fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Snap the cut back onto a char boundary before slicing
        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Button;

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_text_message() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "from": {"id": 77, "username": "asmith", "first_name": "A.",
                         "language_code": "en"},
                "chat": {"id": 500},
                "text": "hello"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.conversation_id, 500);
        assert_eq!(msg.sender_id, 77);
        assert_eq!(msg.username.as_deref(), Some("asmith"));
        assert!(matches!(msg.payload, InputPayload::Text(ref t) if t == "hello"));
    }

    #[test]
    fn parse_callback() {
        let update = serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "data": "flow:quick",
                "from": {"id": 77, "first_name": "A."},
                "message": {"chat": {"id": 500}}
            }
        });
        let msg = parse_update(&update).unwrap();
        assert!(matches!(
            msg.payload,
            InputPayload::Callback { ref id, ref data } if id == "cb-1" && data == "flow:quick"
        ));
    }

    #[test]
    fn parse_document_attachment() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "from": {"id": 77},
                "chat": {"id": 500},
                "document": {"file_id": "BQAD-abc", "file_name": "lease.pdf"},
                "caption": "the lease"
            }
        });
        let msg = parse_update(&update).unwrap();
        let InputPayload::Attachment {
            file_ref,
            kind,
            caption,
        } = msg.payload
        else {
            panic!("expected attachment");
        };
        assert_eq!(file_ref, "BQAD-abc");
        assert_eq!(kind, DocumentKind::File);
        assert_eq!(caption.as_deref(), Some("the lease"));
    }

    #[test]
    fn parse_photo_picks_largest_size() {
        let update = serde_json::json!({
            "update_id": 4,
            "message": {
                "from": {"id": 77},
                "chat": {"id": 500},
                "photo": [
                    {"file_id": "small", "width": 90},
                    {"file_id": "large", "width": 1280}
                ]
            }
        });
        let msg = parse_update(&update).unwrap();
        assert!(matches!(
            msg.payload,
            InputPayload::Attachment { ref file_ref, kind: DocumentKind::Photo, .. }
                if file_ref == "large"
        ));
    }

    #[test]
    fn parse_contact_card() {
        let update = serde_json::json!({
            "update_id": 5,
            "message": {
                "from": {"id": 77},
                "chat": {"id": 500},
                "contact": {"phone_number": "+15550100", "first_name": "A."}
            }
        });
        let msg = parse_update(&update).unwrap();
        assert!(matches!(
            msg.payload,
            InputPayload::Contact { ref phone } if phone == "+15550100"
        ));
    }

    #[test]
    fn parse_skips_unhandled_updates() {
        assert!(parse_update(&serde_json::json!({"update_id": 6})).is_none());
        // Sticker-only message: no text, document, photo or contact
        let update = serde_json::json!({
            "update_id": 7,
            "message": {
                "from": {"id": 77},
                "chat": {"id": 500},
                "sticker": {"file_id": "st-1"}
            }
        });
        assert!(parse_update(&update).is_none());
    }

    // ── Keyboard rendering ──────────────────────────────────────────

    #[test]
    fn keyboard_markup_shape() {
        let kb = Keyboard::new()
            .row(vec![Button::new("Yes", "yes"), Button::new("No", "no")])
            .row(vec![Button::new("Cancel", "common:cancel")]);
        let markup = keyboard_markup(&kb);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1]["callback_data"], "no");
        assert_eq!(rows[1][0]["text"], "Cancel");
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_multibyte_at_limit() {
        // No spaces or newlines, and the limit lands mid-character
        let msg = "é".repeat(3000); // 2 bytes each, 6000 bytes total
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), msg);
        for chunk in &chunks {
            assert!(chunk.len() <= 4095);
        }
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    // ── Network error tests (no server behind the fake token) ───────

    #[tokio::test]
    async fn send_file_bytes_fails_without_server() {
        let ch = TelegramChannel::new("fake-token".into());
        let result = ch
            .send_file_bytes(123456, b"a;b;c\n".to_vec(), "export.csv", Some("Export"))
            .await;
        assert!(result.is_err());
    }
}
