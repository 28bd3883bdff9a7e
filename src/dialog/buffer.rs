//! Per-conversation answer buffer.
//!
//! Holds partially collected answers while a flow is in progress and turns
//! them into a `NewLead` + documents at the end. The buffer is transient;
//! nothing here touches the store.

use crate::dialog::flow::{Step, StepId};
use crate::dialog::validate;
use crate::dialog::{MAX_BRIEF_CHARS, MAX_QUICK_ATTACHMENTS, MAX_REVIEW_UPLOADS};
use crate::model::{ConsultFormat, DocumentKind, LeadSource, NewDocument, NewLead};

/// Normalized user input fed to the current step.
#[derive(Debug, Clone)]
pub enum DialogInput {
    Text(String),
    /// Inline-button press; carries the button's data payload.
    Choice(String),
    Attachment {
        file_ref: String,
        kind: DocumentKind,
        caption: Option<String>,
    },
    /// Shared contact card (phone number).
    Contact { phone: String },
    Skip,
    Done,
}

/// Outcome of applying one input to the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Answer stored; advance to the next step.
    Advance,
    /// Answer stored; stay on the same step (repeated uploads).
    Stay,
    /// Input rejected; re-prompt the same step.
    Invalid,
}

#[derive(Debug, Default, Clone)]
pub struct DialogBuffer {
    pub category: Option<String>,
    pub brief: Option<String>,
    pub urgency: Option<String>,
    /// Asked in the quick flow but never persisted on the lead.
    pub offer_consultation: Option<bool>,
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub consult_format: Option<ConsultFormat>,
    pub duration_min: Option<u16>,
    pub review_plan: Option<String>,
    pub attachments: Vec<NewDocument>,
}

impl DialogBuffer {
    /// Validate `input` against `step` and store the answer on success.
    pub fn apply(&mut self, step: &Step, input: &DialogInput) -> Applied {
        match step.id {
            StepId::Category | StepId::DocumentType => match input {
                DialogInput::Choice(data) if step.accepts_choice(data) => {
                    self.category = Some(data.clone());
                    Applied::Advance
                }
                DialogInput::Text(t) if !t.trim().is_empty() => {
                    self.category = Some(t.trim().to_string());
                    Applied::Advance
                }
                _ => Applied::Invalid,
            },

            StepId::Brief => match input {
                DialogInput::Text(t)
                    if !t.trim().is_empty() && t.trim().chars().count() <= MAX_BRIEF_CHARS =>
                {
                    self.brief = Some(t.trim().to_string());
                    Applied::Advance
                }
                _ => Applied::Invalid,
            },

            StepId::Urgency => match self.pick_choice(step, input) {
                Some(data) => {
                    self.urgency = Some(data);
                    Applied::Advance
                }
                None => Applied::Invalid,
            },

            StepId::OfferConsultation => match self.pick_choice(step, input) {
                Some(data) => {
                    self.offer_consultation = Some(data == "yes");
                    Applied::Advance
                }
                None => Applied::Invalid,
            },

            StepId::Name => match input {
                DialogInput::Text(t) if !t.trim().is_empty() => {
                    self.name = Some(t.trim().to_string());
                    Applied::Advance
                }
                _ => Applied::Invalid,
            },

            StepId::Contact => match input {
                DialogInput::Text(t) if validate::is_valid_contact(t) => {
                    self.contact = Some(t.trim().to_string());
                    Applied::Advance
                }
                DialogInput::Contact { phone } => {
                    self.contact = Some(phone.clone());
                    Applied::Advance
                }
                _ => Applied::Invalid,
            },

            StepId::Email => match input {
                DialogInput::Skip => Applied::Advance,
                // "-" is the typed skip the original intake accepted
                DialogInput::Text(t) if t.trim() == "-" => Applied::Advance,
                DialogInput::Text(t) if validate::is_valid_email(t) => {
                    self.email = Some(t.trim().to_string());
                    Applied::Advance
                }
                _ => Applied::Invalid,
            },

            StepId::Attachments => match input {
                DialogInput::Skip | DialogInput::Done => Applied::Advance,
                DialogInput::Attachment {
                    file_ref,
                    kind,
                    caption,
                } if self.attachments.len() < MAX_QUICK_ATTACHMENTS => {
                    self.attachments.push(NewDocument {
                        file_ref: file_ref.clone(),
                        kind: *kind,
                        caption: caption.clone(),
                    });
                    if self.attachments.len() >= MAX_QUICK_ATTACHMENTS {
                        Applied::Advance
                    } else {
                        Applied::Stay
                    }
                }
                _ => Applied::Invalid,
            },

            StepId::Format => match self.pick_choice(step, input) {
                Some(data) => match ConsultFormat::parse(&data) {
                    Some(format) => {
                        self.consult_format = Some(format);
                        Applied::Advance
                    }
                    None => Applied::Invalid,
                },
                None => Applied::Invalid,
            },

            StepId::Duration => match self.pick_choice(step, input) {
                Some(data) => match data.parse::<u16>() {
                    Ok(minutes) => {
                        self.duration_min = Some(minutes);
                        Applied::Advance
                    }
                    Err(_) => Applied::Invalid,
                },
                None => Applied::Invalid,
            },

            StepId::Uploads => match input {
                DialogInput::Attachment {
                    file_ref,
                    kind,
                    caption,
                } => {
                    self.attachments.push(NewDocument {
                        file_ref: file_ref.clone(),
                        kind: *kind,
                        caption: caption.clone(),
                    });
                    if self.attachments.len() >= MAX_REVIEW_UPLOADS {
                        Applied::Advance
                    } else {
                        Applied::Stay
                    }
                }
                // A text comment doubles as the done signal
                DialogInput::Text(t) if !t.trim().is_empty() => {
                    self.brief = Some(t.trim().to_string());
                    Applied::Advance
                }
                DialogInput::Done => Applied::Advance,
                _ => Applied::Invalid,
            },

            StepId::ReviewPlan => match self.pick_choice(step, input) {
                Some(data) => {
                    self.review_plan = Some(data);
                    Applied::Advance
                }
                None => Applied::Invalid,
            },
        }
    }

    /// Resolve a choice step's answer from a button press or matching text.
    fn pick_choice(&self, step: &Step, input: &DialogInput) -> Option<String> {
        match input {
            DialogInput::Choice(data) if step.accepts_choice(data) => Some(data.clone()),
            DialogInput::Text(t) => {
                let t = t.trim();
                step.choices
                    .iter()
                    .find(|c| c.data.eq_ignore_ascii_case(t) || c.label.eq_ignore_ascii_case(t))
                    .map(|c| c.data.to_string())
            }
            _ => None,
        }
    }

    /// Assemble the immutable lead + documents for the given source.
    pub fn into_lead(self, user_id: i64, source: LeadSource) -> (NewLead, Vec<NewDocument>) {
        let mut lead = NewLead::new(user_id, source);
        match source {
            LeadSource::QuickQuestion => {
                lead.category = self.category;
                lead.brief = self.brief;
                lead.urgency = self.urgency;
                lead.name = self.name;
                lead.contact = self.contact;
                lead.email = self.email;
            }
            LeadSource::Consultation => {
                lead.consult_format = self.consult_format;
                lead.duration_min = self.duration_min;
                lead.name = self.name;
                lead.contact = self.contact;
                lead.email = self.email;
            }
            LeadSource::DocumentReview => {
                lead.category = self.category;
                lead.brief = self.brief;
            }
        }
        (lead, self.attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::flow::FlowKind;

    fn step(flow: FlowKind, id: StepId) -> &'static Step {
        flow.steps().iter().find(|s| s.id == id).unwrap()
    }

    #[test]
    fn brief_rejects_over_limit() {
        let mut buf = DialogBuffer::default();
        let s = step(FlowKind::QuickQuestion, StepId::Brief);
        let long = "x".repeat(MAX_BRIEF_CHARS + 1);
        assert_eq!(buf.apply(s, &DialogInput::Text(long)), Applied::Invalid);
        assert_eq!(
            buf.apply(s, &DialogInput::Text("Need help reviewing a lease".into())),
            Applied::Advance
        );
        assert_eq!(buf.brief.as_deref(), Some("Need help reviewing a lease"));
    }

    #[test]
    fn urgency_accepts_button_and_matching_text() {
        let mut buf = DialogBuffer::default();
        let s = step(FlowKind::QuickQuestion, StepId::Urgency);
        assert_eq!(
            buf.apply(s, &DialogInput::Choice("this week".into())),
            Applied::Advance
        );
        assert_eq!(buf.urgency.as_deref(), Some("this week"));

        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(s, &DialogInput::Text("Today".into())),
            Applied::Advance
        );
        assert_eq!(buf.urgency.as_deref(), Some("today"));

        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(s, &DialogInput::Text("whenever".into())),
            Applied::Invalid
        );
    }

    #[test]
    fn contact_accepts_phone_handle_or_shared_card() {
        let s = step(FlowKind::QuickQuestion, StepId::Contact);

        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(s, &DialogInput::Text("+1-555-0100".into())),
            Applied::Advance
        );

        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(s, &DialogInput::Contact { phone: "+380501234567".into() }),
            Applied::Advance
        );
        assert_eq!(buf.contact.as_deref(), Some("+380501234567"));

        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(s, &DialogInput::Text("call me maybe".into())),
            Applied::Invalid
        );
    }

    #[test]
    fn email_skip_stores_null() {
        let s = step(FlowKind::QuickQuestion, StepId::Email);
        let mut buf = DialogBuffer::default();
        assert_eq!(buf.apply(s, &DialogInput::Skip), Applied::Advance);
        assert_eq!(buf.email, None);

        let mut buf = DialogBuffer::default();
        assert_eq!(buf.apply(s, &DialogInput::Text("-".into())), Applied::Advance);
        assert_eq!(buf.email, None);
    }

    #[test]
    fn quick_attachments_cap_at_two() {
        let s = step(FlowKind::QuickQuestion, StepId::Attachments);
        let mut buf = DialogBuffer::default();
        let file = |n: &str| DialogInput::Attachment {
            file_ref: n.into(),
            kind: DocumentKind::File,
            caption: None,
        };
        assert_eq!(buf.apply(s, &file("a")), Applied::Stay);
        assert_eq!(buf.apply(s, &file("b")), Applied::Advance);
        assert_eq!(buf.attachments.len(), 2);
    }

    #[test]
    fn review_uploads_text_comment_finishes_step() {
        let s = step(FlowKind::DocumentReview, StepId::Uploads);
        let mut buf = DialogBuffer::default();
        assert_eq!(
            buf.apply(
                s,
                &DialogInput::Attachment {
                    file_ref: "f1".into(),
                    kind: DocumentKind::Photo,
                    caption: None,
                }
            ),
            Applied::Stay
        );
        assert_eq!(
            buf.apply(s, &DialogInput::Text("NDA for a contractor".into())),
            Applied::Advance
        );
        assert_eq!(buf.brief.as_deref(), Some("NDA for a contractor"));
        assert_eq!(buf.attachments.len(), 1);
    }

    #[test]
    fn into_lead_never_leaks_consult_fields_into_quick() {
        let mut buf = DialogBuffer::default();
        buf.category = Some("contract review".into());
        buf.brief = Some("brief".into());
        buf.urgency = Some("today".into());
        buf.offer_consultation = Some(true);
        buf.name = Some("A".into());
        buf.contact = Some("+1-555-0100".into());
        // Stray consultation data must never reach a quick lead
        buf.consult_format = Some(ConsultFormat::Video);
        buf.duration_min = Some(60);

        let (lead, docs) = buf.into_lead(7, LeadSource::QuickQuestion);
        assert_eq!(lead.consult_format, None);
        assert_eq!(lead.duration_min, None);
        assert!(docs.is_empty());
        assert!(lead.validate(docs.len()).is_ok());
    }
}
