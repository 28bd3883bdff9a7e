//! Message loop: routes channel traffic to the dialog engine, the admin
//! panel, and persistence.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info};

use crate::admin::AdminService;
use crate::channels::{
    Button, Channel, IncomingMessage, InputPayload, Keyboard, OutgoingResponse,
};
use crate::dialog::{DialogEngine, DialogInput, EngineEvent, FlowKind, Step, StepId};
use crate::error::Error;
use crate::model::{Direction, NewDocument, NewLead, NewMessageLog, UserProfile};
use crate::notify::Notifier;
use crate::sheets::MirrorHandle;
use crate::store::LeadStore;

const GREETING: &str = "Hello! I can take a quick question, book a consultation, \
                        or arrange a document review. Pick an option:";

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub struct Bot {
    store: Arc<dyn LeadStore>,
    channel: Arc<dyn Channel>,
    engine: Arc<DialogEngine>,
    notifier: Notifier,
    admin: AdminService,
    mirror: MirrorHandle,
}

impl Bot {
    pub fn new(
        store: Arc<dyn LeadStore>,
        channel: Arc<dyn Channel>,
        engine: Arc<DialogEngine>,
        notifier: Notifier,
        admin: AdminService,
        mirror: MirrorHandle,
    ) -> Self {
        Self {
            store,
            channel,
            engine,
            notifier,
            admin,
            mirror,
        }
    }

    /// Run until the message stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.channel.health_check().await?;

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                ticker.tick().await;
                let pruned = engine.prune_idle();
                if pruned > 0 {
                    info!(pruned, "Abandoned idle dialog sessions");
                }
            }
        });

        let mut stream = self.channel.start().await?;
        info!("Bot message loop started");

        while let Some(message) = stream.next().await {
            if let Err(e) = self.handle_message(message).await {
                error!("Failed to handle message: {e}");
            }
        }

        info!("Message stream ended; shutting down");
        self.channel.shutdown().await?;
        Ok(())
    }

    async fn handle_message(&self, message: IncomingMessage) -> Result<(), Error> {
        let user = self
            .store
            .upsert_user(&UserProfile {
                platform_id: message.sender_id,
                username: message.username.clone(),
                first_name: message.first_name.clone(),
                last_name: message.last_name.clone(),
                language_code: message.language_code.clone(),
            })
            .await?;

        if let Err(e) = self
            .store
            .append_message_log(&NewMessageLog {
                user_id: user.id,
                direction: Direction::In,
                text: inbound_log_text(&message.payload),
                payload: Some(serde_json::json!({
                    "channel": message.channel,
                    "conversation_id": message.conversation_id,
                })),
            })
            .await
        {
            error!(user_id = user.id, "Failed to log inbound message: {e}");
        }

        let conversation = message.conversation_id;

        match message.payload {
            InputPayload::Callback { id, data } => {
                self.channel.ack_callback(&id).await?;

                if data.starts_with("admin:") {
                    return self
                        .admin
                        .handle_callback(conversation, message.sender_id, &data)
                        .await;
                }
                if let Some(flow) = FlowKind::from_callback(&data) {
                    let event = self.engine.start_flow(conversation, flow);
                    return self.dispatch_event(conversation, user.id, event).await;
                }
                match data.as_str() {
                    "common:cancel" => self.cancel(conversation, user.id).await,
                    "common:skip" => {
                        self.feed_dialog(conversation, user.id, DialogInput::Skip)
                            .await
                    }
                    "common:done" => {
                        self.feed_dialog(conversation, user.id, DialogInput::Done)
                            .await
                    }
                    _ => {
                        self.feed_dialog(conversation, user.id, DialogInput::Choice(data))
                            .await
                    }
                }
            }

            InputPayload::Text(text) => {
                let trimmed = text.trim();
                match trimmed {
                    "/start" | "/menu" => self.send_menu(conversation, user.id).await,
                    "/admin" => {
                        self.admin
                            .handle_command(conversation, message.sender_id)
                            .await
                    }
                    "/cancel" => self.cancel(conversation, user.id).await,
                    "/quick" => self.start_flow(conversation, user.id, FlowKind::QuickQuestion).await,
                    "/consult" => self.start_flow(conversation, user.id, FlowKind::Consultation).await,
                    "/review" => self.start_flow(conversation, user.id, FlowKind::DocumentReview).await,
                    _ => {
                        let input = if trimmed.eq_ignore_ascii_case("skip") {
                            DialogInput::Skip
                        } else if trimmed.eq_ignore_ascii_case("done") {
                            DialogInput::Done
                        } else {
                            DialogInput::Text(text)
                        };
                        self.feed_dialog(conversation, user.id, input).await
                    }
                }
            }

            InputPayload::Attachment {
                file_ref,
                kind,
                caption,
            } => {
                self.feed_dialog(
                    conversation,
                    user.id,
                    DialogInput::Attachment {
                        file_ref,
                        kind,
                        caption,
                    },
                )
                .await
            }

            InputPayload::Contact { phone } => {
                self.feed_dialog(conversation, user.id, DialogInput::Contact { phone })
                    .await
            }
        }
    }

    async fn start_flow(
        &self,
        conversation: i64,
        user_id: i64,
        flow: FlowKind,
    ) -> Result<(), Error> {
        let event = self.engine.start_flow(conversation, flow);
        self.dispatch_event(conversation, user_id, event).await
    }

    async fn feed_dialog(
        &self,
        conversation: i64,
        user_id: i64,
        input: DialogInput,
    ) -> Result<(), Error> {
        let event = self.engine.handle_input(conversation, user_id, input);
        self.dispatch_event(conversation, user_id, event).await
    }

    async fn dispatch_event(
        &self,
        conversation: i64,
        user_id: i64,
        event: EngineEvent,
    ) -> Result<(), Error> {
        match event {
            EngineEvent::Prompt { text, step } | EngineEvent::Invalid { text, step } => {
                let response =
                    OutgoingResponse::text(text).with_keyboard(step_keyboard(step));
                self.send(conversation, user_id, response).await
            }

            EngineEvent::Completed {
                flow,
                lead,
                documents,
                review_plan,
            } => {
                self.commit(conversation, user_id, flow, lead, documents, review_plan)
                    .await
            }

            EngineEvent::NoSession => self.send_menu(conversation, user_id).await,
        }
    }

    /// Persist a completed dialog. On storage failure the session keeps its
    /// buffer; only this commit is retried on the user's next message.
    async fn commit(
        &self,
        conversation: i64,
        user_id: i64,
        flow: FlowKind,
        lead: NewLead,
        documents: Vec<NewDocument>,
        review_plan: Option<String>,
    ) -> Result<(), Error> {
        match self.store.create_lead(&lead, &documents).await {
            Ok(persisted) => {
                self.engine.finish(conversation);
                info!(lead_id = persisted.id, source = %persisted.source, "Lead committed");

                // The lead is durable from here on; operators and the mirror
                // hear about it even if later sends fail.
                let stored_docs = match self.store.list_documents(persisted.id).await {
                    Ok(docs) => docs,
                    Err(e) => {
                        error!(lead_id = persisted.id, "Failed to load stored documents: {e}");
                        Vec::new()
                    }
                };
                self.notifier
                    .notify_new_lead(&persisted, &stored_docs, review_plan.as_deref())
                    .await;
                self.mirror.enqueue(persisted);

                if let Err(e) = self
                    .send(
                        conversation,
                        user_id,
                        OutgoingResponse::text(confirmation_text(flow)),
                    )
                    .await
                {
                    error!(conversation, "Failed to send commit confirmation: {e}");
                }
                Ok(())
            }
            Err(e) if e.is_storage_failure() => {
                error!(conversation, "Lead commit failed: {e}");
                self.notifier
                    .notify_storage_failure(conversation, &e.to_string())
                    .await;
                self.send(
                    conversation,
                    user_id,
                    OutgoingResponse::text(
                        "We couldn't save your request just now. Your answers are kept \
                         — send any message to retry.",
                    ),
                )
                .await
            }
            Err(e) => {
                // A completed buffer failing validation is a programming
                // error; drop the session rather than loop forever.
                error!(conversation, "Lead rejected at commit: {e}");
                self.engine.finish(conversation);
                self.send(
                    conversation,
                    user_id,
                    OutgoingResponse::text(
                        "Something went wrong with this request. Please start over from the menu.",
                    ),
                )
                .await
            }
        }
    }

    async fn cancel(&self, conversation: i64, user_id: i64) -> Result<(), Error> {
        let text = if self.engine.cancel(conversation) {
            "Cancelled. Nothing was saved."
        } else {
            "Nothing to cancel."
        };
        self.send(conversation, user_id, OutgoingResponse::text(text))
            .await?;
        self.send_menu(conversation, user_id).await
    }

    async fn send_menu(&self, conversation: i64, user_id: i64) -> Result<(), Error> {
        let keyboard = Keyboard::column([
            Button::new("⚡️ Quick question", FlowKind::QuickQuestion.callback_data()),
            Button::new("📞 Book a consultation", FlowKind::Consultation.callback_data()),
            Button::new("📄 Document review", FlowKind::DocumentReview.callback_data()),
        ]);
        self.send(
            conversation,
            user_id,
            OutgoingResponse::text(GREETING).with_keyboard(keyboard),
        )
        .await
    }

    /// Send a response and append the outbound audit row.
    async fn send(
        &self,
        conversation: i64,
        user_id: i64,
        response: OutgoingResponse,
    ) -> Result<(), Error> {
        let text = response.text.clone();
        self.channel.respond(conversation, response).await?;
        if let Err(e) = self
            .store
            .append_message_log(&NewMessageLog {
                user_id,
                direction: Direction::Out,
                text: Some(text),
                payload: None,
            })
            .await
        {
            error!(user_id, "Failed to log outbound message: {e}");
        }
        Ok(())
    }
}

/// Render a dialog step's buttons, plus skip/done controls where the step
/// accepts them.
fn step_keyboard(step: &Step) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for pair in step.choices.chunks(2) {
        keyboard = keyboard.row(
            pair.iter()
                .map(|c| Button::new(c.label, c.data))
                .collect(),
        );
    }
    let mut controls = Vec::new();
    if step.optional {
        controls.push(Button::new("⏭️ Skip", "common:skip"));
    }
    if matches!(step.id, StepId::Uploads | StepId::Attachments) {
        controls.push(Button::new("✅ Done", "common:done"));
    }
    if !controls.is_empty() {
        keyboard = keyboard.row(controls);
    }
    keyboard
}

fn inbound_log_text(payload: &InputPayload) -> Option<String> {
    match payload {
        InputPayload::Text(t) => Some(t.clone()),
        InputPayload::Callback { data, .. } => Some(format!("[callback] {data}")),
        InputPayload::Attachment { kind, .. } => Some(format!("[attachment:{}]", kind.as_str())),
        InputPayload::Contact { .. } => Some("[contact]".to_string()),
    }
}

fn confirmation_text(flow: FlowKind) -> &'static str {
    match flow {
        FlowKind::QuickQuestion => {
            "Done! We've recorded your question. A lawyer will reply shortly."
        }
        FlowKind::Consultation => {
            "Done! Your consultation request is in. We'll confirm the details soon."
        }
        FlowKind::DocumentReview => {
            "Received. We'll take it on after confirming terms and pricing. \
             A manager will message you."
        }
    }
}
