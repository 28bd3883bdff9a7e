//! Shared stepping engine driving all three flows.
//!
//! One engine instance serves every conversation; per-conversation state
//! lives in the [`SessionRegistry`]. The engine never talks to the store —
//! it hands a finished `NewLead` to the caller and holds the session in a
//! `Completed` state until the caller confirms the commit with [`finish`].
//!
//! [`finish`]: DialogEngine::finish

use std::time::Duration;

use tracing::debug;

use crate::dialog::buffer::{Applied, DialogInput};
use crate::dialog::flow::{FlowKind, Step, StepId};
use crate::dialog::session::{SessionRegistry, SessionState};
use crate::model::{NewDocument, NewLead};

/// What the engine wants sent back to the conversation.
#[derive(Debug)]
pub enum EngineEvent {
    /// Ask the current step's question.
    Prompt { text: String, step: &'static Step },
    /// Input was rejected; corrective message for the same step.
    Invalid { text: String, step: &'static Step },
    /// All steps answered. The caller persists `lead` + `documents`
    /// atomically, then calls [`DialogEngine::finish`]. On storage failure
    /// the session keeps its buffer and the next input re-emits this event.
    Completed {
        flow: FlowKind,
        lead: NewLead,
        documents: Vec<NewDocument>,
        /// Chosen review format (document-review flow only). Shown to
        /// operators; not a lead column.
        review_plan: Option<String>,
    },
    /// No active flow for this conversation.
    NoSession,
}

pub struct DialogEngine {
    registry: SessionRegistry,
}

impl DialogEngine {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            registry: SessionRegistry::new(idle_timeout),
        }
    }

    /// Begin a flow for this conversation, abandoning any active one.
    pub fn start_flow(&self, conversation_id: i64, flow: FlowKind) -> EngineEvent {
        self.registry.start(conversation_id, flow);
        debug!(conversation_id, ?flow, "Dialog flow started");
        let step = &flow.steps()[0];
        EngineEvent::Prompt {
            text: step.prompt.to_string(),
            step,
        }
    }

    /// Feed one input to the conversation's current step.
    pub fn handle_input(
        &self,
        conversation_id: i64,
        user_id: i64,
        input: DialogInput,
    ) -> EngineEvent {
        let outcome = self.registry.with_session(conversation_id, |session| {
            session.touch();
            let steps = session.flow.steps();

            let step_idx = match session.state {
                SessionState::InProgress { step_idx } => step_idx,
                // Commit previously failed; re-emit with the intact buffer,
                // attributed to whoever completed the flow.
                SessionState::Completed { user_id: owner } => {
                    let (lead, documents) = session
                        .buffer
                        .clone()
                        .into_lead(owner, session.flow.source());
                    return EngineEvent::Completed {
                        flow: session.flow,
                        lead,
                        documents,
                        review_plan: session.buffer.review_plan.clone(),
                    };
                }
            };

            let step = &steps[step_idx];
            match session.buffer.apply(step, &input) {
                Applied::Invalid => EngineEvent::Invalid {
                    text: step.reprompt.to_string(),
                    step,
                },
                Applied::Stay => EngineEvent::Prompt {
                    text: upload_ack(step.id).to_string(),
                    step,
                },
                Applied::Advance => {
                    let next_idx = step_idx + 1;
                    if next_idx < steps.len() {
                        session.state = SessionState::InProgress { step_idx: next_idx };
                        let next = &steps[next_idx];
                        EngineEvent::Prompt {
                            text: next.prompt.to_string(),
                            step: next,
                        }
                    } else {
                        session.state = SessionState::Completed { user_id };
                        let (lead, documents) = session
                            .buffer
                            .clone()
                            .into_lead(user_id, session.flow.source());
                        debug!(conversation_id, flow = ?session.flow, "Dialog flow completed");
                        EngineEvent::Completed {
                            flow: session.flow,
                            lead,
                            documents,
                            review_plan: session.buffer.review_plan.clone(),
                        }
                    }
                }
            }
        });

        outcome.unwrap_or(EngineEvent::NoSession)
    }

    /// Destroy the session after a successful commit (or explicit cancel).
    /// Returns whether a session existed.
    pub fn finish(&self, conversation_id: i64) -> bool {
        self.registry.remove(conversation_id)
    }

    /// Explicit cancel; persists nothing.
    pub fn cancel(&self, conversation_id: i64) -> bool {
        let existed = self.registry.remove(conversation_id);
        if existed {
            debug!(conversation_id, "Dialog flow cancelled");
        }
        existed
    }

    pub fn is_active(&self, conversation_id: i64) -> bool {
        self.registry.contains(conversation_id)
    }

    /// Abandon idle sessions; returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        self.registry.prune_idle()
    }
}

/// Acknowledgment for a repeated step that accepted input and stays put.
fn upload_ack(step: StepId) -> &'static str {
    match step {
        StepId::Attachments => "Attached. You can send one more, or skip to finish.",
        _ => "File received. Send more, or a short comment to continue.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentKind, LeadSource};

    fn engine() -> DialogEngine {
        DialogEngine::new(Duration::from_secs(1800))
    }

    fn text(s: &str) -> DialogInput {
        DialogInput::Text(s.to_string())
    }

    fn choice(s: &str) -> DialogInput {
        DialogInput::Choice(s.to_string())
    }

    #[test]
    fn quick_question_happy_path_with_skipped_email() {
        let eng = engine();
        let conv = 10;
        let user = 7;

        assert!(matches!(
            eng.start_flow(conv, FlowKind::QuickQuestion),
            EngineEvent::Prompt { .. }
        ));

        for input in [
            choice("contract review"),
            text("Need help reviewing a lease"),
            choice("this week"),
            choice("no"),
            text("A. Smith"),
            text("+1-555-0100"),
        ] {
            assert!(matches!(
                eng.handle_input(conv, user, input),
                EngineEvent::Prompt { .. }
            ));
        }
        // Skip email, then skip attachments: flow completes
        assert!(matches!(
            eng.handle_input(conv, user, DialogInput::Skip),
            EngineEvent::Prompt { .. }
        ));
        let event = eng.handle_input(conv, user, DialogInput::Skip);
        let EngineEvent::Completed {
            lead, documents, ..
        } = event
        else {
            panic!("expected Completed, got {event:?}");
        };

        assert_eq!(lead.source, LeadSource::QuickQuestion);
        assert_eq!(lead.category.as_deref(), Some("contract review"));
        assert_eq!(lead.brief.as_deref(), Some("Need help reviewing a lease"));
        assert_eq!(lead.urgency.as_deref(), Some("this week"));
        assert_eq!(lead.name.as_deref(), Some("A. Smith"));
        assert_eq!(lead.contact.as_deref(), Some("+1-555-0100"));
        assert_eq!(lead.email, None);
        assert_eq!(lead.consult_format, None);
        assert_eq!(lead.duration_min, None);
        assert!(documents.is_empty());
        assert!(lead.validate(documents.len()).is_ok());

        assert!(eng.finish(conv));
        assert!(!eng.is_active(conv));
    }

    #[test]
    fn invalid_input_reprompts_without_advancing() {
        let eng = engine();
        eng.start_flow(1, FlowKind::Consultation);

        // Format step rejects free text that matches no option
        assert!(matches!(
            eng.handle_input(1, 1, text("in person")),
            EngineEvent::Invalid { .. }
        ));
        // Still on the format step; a valid choice advances to duration
        let event = eng.handle_input(1, 1, choice("video"));
        let EngineEvent::Prompt { text: prompt, .. } = event else {
            panic!("expected Prompt");
        };
        assert!(prompt.contains("Duration"));
    }

    #[test]
    fn completed_session_reemits_until_finished() {
        let eng = engine();
        let conv = 2;
        eng.start_flow(conv, FlowKind::Consultation);
        for input in [
            choice("video"),
            choice("60"),
            text("B. Jones"),
            text("@bjones99"),
        ] {
            eng.handle_input(conv, 3, input);
        }
        let event = eng.handle_input(conv, 3, DialogInput::Skip);
        assert!(matches!(event, EngineEvent::Completed { .. }));

        // Commit failed upstream; any further input re-emits the same lead
        let retry = eng.handle_input(conv, 3, text("retry"));
        let EngineEvent::Completed { lead, .. } = retry else {
            panic!("expected re-emitted Completed");
        };
        assert_eq!(lead.consult_format, Some(crate::model::ConsultFormat::Video));
        assert_eq!(lead.duration_min, Some(60));
        assert_eq!(lead.contact.as_deref(), Some("@bjones99"));

        assert!(eng.finish(conv));
        assert!(matches!(
            eng.handle_input(conv, 3, text("hello")),
            EngineEvent::NoSession
        ));
    }

    #[test]
    fn retry_keeps_the_completing_users_attribution() {
        let eng = engine();
        let conv = 8;
        eng.start_flow(conv, FlowKind::Consultation);
        for input in [
            choice("phone"),
            choice("30"),
            text("C. Ray"),
            text("+1-555-0199"),
        ] {
            eng.handle_input(conv, 41, input);
        }
        let event = eng.handle_input(conv, 41, DialogInput::Skip);
        let EngineEvent::Completed { lead, .. } = event else {
            panic!("expected Completed");
        };
        assert_eq!(lead.user_id, 41);

        // Another group member nudges the stalled commit; the lead still
        // belongs to whoever answered the questions
        let retry = eng.handle_input(conv, 99, text("anything"));
        let EngineEvent::Completed { lead, .. } = retry else {
            panic!("expected re-emitted Completed");
        };
        assert_eq!(lead.user_id, 41);
    }

    #[test]
    fn document_review_flow_carries_plan_and_uploads() {
        let eng = engine();
        let conv = 3;
        eng.start_flow(conv, FlowKind::DocumentReview);

        eng.handle_input(conv, 5, choice("contract"));
        // Two uploads, then a context comment closes the step
        for file_ref in ["f1", "f2"] {
            let event = eng.handle_input(
                conv,
                5,
                DialogInput::Attachment {
                    file_ref: file_ref.into(),
                    kind: DocumentKind::File,
                    caption: None,
                },
            );
            assert!(matches!(event, EngineEvent::Prompt { .. }));
        }
        eng.handle_input(conv, 5, text("NDA for review"));
        let event = eng.handle_input(conv, 5, choice("express"));

        let EngineEvent::Completed {
            lead,
            documents,
            review_plan,
            ..
        } = event
        else {
            panic!("expected Completed");
        };
        assert_eq!(lead.source, LeadSource::DocumentReview);
        assert_eq!(lead.category.as_deref(), Some("contract"));
        assert_eq!(lead.brief.as_deref(), Some("NDA for review"));
        assert_eq!(documents.len(), 2);
        assert_eq!(review_plan.as_deref(), Some("express"));
    }

    #[test]
    fn cancel_discards_everything() {
        let eng = engine();
        eng.start_flow(4, FlowKind::QuickQuestion);
        eng.handle_input(4, 1, choice("other"));
        assert!(eng.cancel(4));
        assert!(matches!(
            eng.handle_input(4, 1, text("anything")),
            EngineEvent::NoSession
        ));
    }
}
