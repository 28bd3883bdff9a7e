//! Messaging channels.

pub mod channel;
pub mod telegram;

pub use channel::{
    Button, Channel, IncomingMessage, InputPayload, Keyboard, MessageStream, OutgoingResponse,
};
pub use telegram::TelegramChannel;
