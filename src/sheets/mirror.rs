//! Fire-and-forget lead mirror.
//!
//! The bot enqueues persisted leads; a background task appends them to the
//! spreadsheet. Failures are logged and dropped. A mirror failure never
//! reaches the user and never rolls anything back.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::model::Lead;
use crate::sheets::client::SheetsClient;

#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::UnboundedSender<Lead>,
}

impl MirrorHandle {
    /// Queue a lead for mirroring. Never blocks, never fails the caller.
    pub fn enqueue(&self, lead: Lead) {
        if self.tx.send(lead).is_err() {
            warn!("Sheets mirror task is gone; lead not mirrored");
        }
    }
}

/// Handle plus the raw receiving end, for asserting on enqueued leads.
#[cfg(test)]
pub(crate) fn test_pair() -> (MirrorHandle, mpsc::UnboundedReceiver<Lead>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MirrorHandle { tx }, rx)
}

/// Spawn the mirror task. With no client configured the handle still works;
/// enqueued leads are discarded quietly.
pub fn spawn_mirror_task(client: Option<SheetsClient>) -> MirrorHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Lead>();

    tokio::spawn(async move {
        let Some(client) = client else {
            info!("Sheets mirror disabled (no credentials configured)");
            while rx.recv().await.is_some() {}
            return;
        };

        info!("Sheets mirror task started");
        while let Some(lead) = rx.recv().await {
            match client.append_lead(&lead).await {
                Ok(()) => debug!(lead_id = lead.id, "Lead mirrored to sheet"),
                // Log-only; no retry queue
                Err(e) => warn!(lead_id = lead.id, "Sheets mirror append failed: {e}"),
            }
        }
        info!("Sheets mirror task stopped");
    });

    MirrorHandle { tx }
}
