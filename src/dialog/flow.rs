//! Flow definitions: one ordered step table per intake flow.
//!
//! The stepping logic lives in the engine; these tables only declare what
//! each flow asks, in what order, and which answers a step accepts.

use crate::model::LeadSource;

/// One of the three fixed conversational flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    QuickQuestion,
    Consultation,
    DocumentReview,
}

impl FlowKind {
    pub fn source(&self) -> LeadSource {
        match self {
            FlowKind::QuickQuestion => LeadSource::QuickQuestion,
            FlowKind::Consultation => LeadSource::Consultation,
            FlowKind::DocumentReview => LeadSource::DocumentReview,
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self {
            FlowKind::QuickQuestion => QUICK_QUESTION_STEPS,
            FlowKind::Consultation => CONSULTATION_STEPS,
            FlowKind::DocumentReview => DOCUMENT_REVIEW_STEPS,
        }
    }

    /// Callback data that starts this flow.
    pub fn callback_data(&self) -> &'static str {
        match self {
            FlowKind::QuickQuestion => "flow:quick",
            FlowKind::Consultation => "flow:consult",
            FlowKind::DocumentReview => "flow:review",
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "flow:quick" => Some(FlowKind::QuickQuestion),
            "flow:consult" => Some(FlowKind::Consultation),
            "flow:review" => Some(FlowKind::DocumentReview),
            _ => None,
        }
    }
}

/// Identity of a step within a flow. The buffer keys answers off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    Category,
    Brief,
    Urgency,
    OfferConsultation,
    Name,
    Contact,
    Email,
    Attachments,
    Format,
    Duration,
    DocumentType,
    Uploads,
    ReviewPlan,
}

/// A choice button offered at a step.
#[derive(Debug, Clone, Copy)]
pub struct Choice {
    pub label: &'static str,
    pub data: &'static str,
}

/// One step of a flow.
#[derive(Debug)]
pub struct Step {
    pub id: StepId,
    pub prompt: &'static str,
    /// Corrective message naming the expected format, sent on invalid input.
    pub reprompt: &'static str,
    /// Non-empty means the step offers inline buttons.
    pub choices: &'static [Choice],
    /// Optional steps accept a skip signal that stores nothing.
    pub optional: bool,
}

impl Step {
    /// Whether a choice payload belongs to this step's option set.
    pub fn accepts_choice(&self, data: &str) -> bool {
        self.choices.iter().any(|c| c.data == data)
    }

    pub fn choice_label(&self, data: &str) -> Option<&'static str> {
        self.choices.iter().find(|c| c.data == data).map(|c| c.label)
    }
}

const YES_NO: &[Choice] = &[
    Choice { label: "Yes", data: "yes" },
    Choice { label: "No", data: "no" },
];

static QUICK_QUESTION_STEPS: &[Step] = &[
    Step {
        id: StepId::Category,
        prompt: "What is your question about?",
        reprompt: "Please pick a topic from the buttons below.",
        choices: &[
            Choice { label: "Contract review", data: "contract review" },
            Choice { label: "Labor dispute", data: "labor dispute" },
            Choice { label: "Debt / payments", data: "debt" },
            Choice { label: "Other", data: "other" },
        ],
        optional: false,
    },
    Step {
        id: StepId::Brief,
        prompt: "Describe your situation in a few sentences (up to 500 characters).",
        reprompt: "Please send a short text description, up to 500 characters.",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::Urgency,
        prompt: "How urgent is it?",
        reprompt: "Please pick one of the urgency options below.",
        choices: &[
            Choice { label: "Today", data: "today" },
            Choice { label: "This week", data: "this week" },
            Choice { label: "Just asking", data: "just asking" },
        ],
        optional: false,
    },
    Step {
        id: StepId::OfferConsultation,
        prompt: "Would you like us to offer a consultation slot as well?",
        reprompt: "Please answer with Yes or No.",
        choices: YES_NO,
        optional: false,
    },
    Step {
        id: StepId::Name,
        prompt: "How should we address you?",
        reprompt: "Please send your name as text.",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::Contact,
        prompt: "Phone in +… format or a @username handle, or share your contact:",
        reprompt: "That doesn't look like a phone number or @handle. \
                   Expected +<digits> or @username (5+ characters).",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::Email,
        prompt: "Email for the reply (or skip):",
        reprompt: "That doesn't look like an email address. Try again or skip.",
        choices: &[],
        optional: true,
    },
    Step {
        id: StepId::Attachments,
        prompt: "You can attach up to 2 files or photos, or skip.",
        reprompt: "Send a file or photo, or skip / finish.",
        choices: &[],
        optional: true,
    },
];

static CONSULTATION_STEPS: &[Step] = &[
    Step {
        id: StepId::Format,
        prompt: "Pick a consultation format:",
        reprompt: "Please pick one of the formats below.",
        choices: &[
            Choice { label: "Phone call", data: "phone" },
            Choice { label: "Chat call", data: "chat-call" },
            Choice { label: "Video", data: "video" },
        ],
        optional: false,
    },
    Step {
        id: StepId::Duration,
        prompt: "Duration?",
        reprompt: "Please pick 30 or 60 minutes.",
        choices: &[
            Choice { label: "30 minutes", data: "30" },
            Choice { label: "60 minutes", data: "60" },
        ],
        optional: false,
    },
    Step {
        id: StepId::Name,
        prompt: "How should we address you?",
        reprompt: "Please send your name as text.",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::Contact,
        prompt: "Phone in +… format or a @username handle, or share your contact:",
        reprompt: "That doesn't look like a phone number or @handle. \
                   Expected +<digits> or @username (5+ characters).",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::Email,
        prompt: "Email for the confirmation (or skip):",
        reprompt: "That doesn't look like an email address. Try again or skip.",
        choices: &[],
        optional: true,
    },
];

static DOCUMENT_REVIEW_STEPS: &[Step] = &[
    Step {
        id: StepId::DocumentType,
        prompt: "What kind of document is it?",
        reprompt: "Please pick a document type from the buttons below.",
        choices: &[
            Choice { label: "Contract", data: "contract" },
            Choice { label: "Claim / lawsuit", data: "claim" },
            Choice { label: "Agreement", data: "agreement" },
            Choice { label: "Other", data: "other" },
        ],
        optional: false,
    },
    Step {
        id: StepId::Uploads,
        prompt: "Send the file(s) (PDF/JPG/PNG/DOCX) and a short comment with context. \
                 Text finishes the upload step.",
        reprompt: "Send a file or photo, or a short text comment to continue.",
        choices: &[],
        optional: false,
    },
    Step {
        id: StepId::ReviewPlan,
        prompt: "Pick a review format:",
        reprompt: "Please pick one of the review formats below.",
        choices: &[
            Choice { label: "Express (written)", data: "express" },
            Choice { label: "Call with a lawyer", data: "call" },
        ],
        optional: false,
    },
];
