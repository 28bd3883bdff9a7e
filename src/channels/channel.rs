//! Channel abstraction — a transport delivers normalized messages and
//! accepts normalized responses, so nothing above this layer knows about
//! Telegram payload shapes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::model::DocumentKind;

/// Stream of incoming messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// What the user actually sent, normalized.
#[derive(Debug, Clone)]
pub enum InputPayload {
    Text(String),
    /// Inline-button press. `id` is needed to acknowledge the press.
    Callback { id: String, data: String },
    /// File or photo; `file_ref` is an opaque re-sendable reference.
    Attachment {
        file_ref: String,
        kind: DocumentKind,
        caption: Option<String>,
    },
    /// Shared contact card.
    Contact { phone: String },
}

/// One normalized inbound message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: &'static str,
    /// Conversation (chat) to reply into.
    pub conversation_id: i64,
    /// Platform identity of the sender.
    pub sender_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub payload: InputPayload,
}

/// One inline-keyboard button.
#[derive(Debug, Clone)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Inline keyboard: rows of buttons.
#[derive(Debug, Clone, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// One button per row, in order.
    pub fn column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One normalized outbound response.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        if !keyboard.is_empty() {
            self.keyboard = Some(keyboard);
        }
        self
    }
}

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving; returns the stream of normalized messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a response into a conversation.
    async fn respond(
        &self,
        conversation_id: i64,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Re-send a stored attachment by its opaque reference.
    async fn send_document_ref(
        &self,
        conversation_id: i64,
        file_ref: &str,
        kind: DocumentKind,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Deliver an in-memory file (export downloads).
    async fn send_file_bytes(
        &self,
        conversation_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Acknowledge an inline-button press so the client stops spinning.
    async fn ack_callback(&self, callback_id: &str) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
