//! End-to-end flow tests: dialog engine driving the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lead_intake::dialog::{DialogEngine, DialogInput, EngineEvent, FlowKind};
use lead_intake::error::StoreError;
use lead_intake::model::{
    ConsultFormat, Document, DocumentKind, Lead, LeadFilter, LeadSource, LeadStatus, NewDocument,
    NewLead, NewMessageLog, Page, User, UserProfile,
};
use lead_intake::store::{LeadStore, LibSqlBackend};

fn text(s: &str) -> DialogInput {
    DialogInput::Text(s.to_string())
}

fn choice(s: &str) -> DialogInput {
    DialogInput::Choice(s.to_string())
}

async fn store_with_user() -> (Arc<LibSqlBackend>, User) {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let user = store
        .upsert_user(&UserProfile {
            platform_id: 42,
            username: Some("asmith".into()),
            first_name: Some("A.".into()),
            last_name: None,
            language_code: Some("en".into()),
        })
        .await
        .unwrap();
    (store, user)
}

fn engine() -> DialogEngine {
    DialogEngine::new(Duration::from_secs(1800))
}

/// Drive a flow to completion and return the final event.
fn run_flow(eng: &DialogEngine, conv: i64, user_id: i64, flow: FlowKind, inputs: Vec<DialogInput>) -> EngineEvent {
    eng.start_flow(conv, flow);
    let mut last = EngineEvent::NoSession;
    for input in inputs {
        last = eng.handle_input(conv, user_id, input);
    }
    last
}

#[tokio::test]
async fn quick_question_flow_persists_the_expected_lead() {
    let (store, user) = store_with_user().await;
    let eng = engine();

    let event = run_flow(
        &eng,
        1,
        user.id,
        FlowKind::QuickQuestion,
        vec![
            choice("contract review"),
            text("Need help reviewing a lease"),
            choice("this week"),
            choice("no"),
            text("A. Smith"),
            text("+1-555-0100"),
            DialogInput::Skip, // email
            DialogInput::Skip, // attachments
        ],
    );

    let EngineEvent::Completed {
        lead, documents, ..
    } = event
    else {
        panic!("flow did not complete");
    };

    let persisted = store.create_lead(&lead, &documents).await.unwrap();
    eng.finish(1);

    assert_eq!(persisted.source, LeadSource::QuickQuestion);
    assert_eq!(persisted.urgency.as_deref(), Some("this week"));
    assert_eq!(persisted.email, None);
    assert_eq!(persisted.status, LeadStatus::New);
    assert!(store.list_documents(persisted.id).await.unwrap().is_empty());

    // Round-trip through the store keeps every field
    let fetched = store.get_lead(persisted.id).await.unwrap().unwrap();
    assert_eq!(fetched.category.as_deref(), Some("contract review"));
    assert_eq!(fetched.brief.as_deref(), Some("Need help reviewing a lease"));
    assert_eq!(fetched.name.as_deref(), Some("A. Smith"));
    assert_eq!(fetched.contact.as_deref(), Some("+1-555-0100"));
    assert_eq!(fetched.consult_format, None);
    assert_eq!(fetched.duration_min, None);
}

/// Store wrapper that fails the next `create_lead` with an I/O-level error.
struct FlakyStore {
    inner: Arc<LibSqlBackend>,
    fail_next: AtomicBool,
}

#[async_trait]
impl LeadStore for FlakyStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        self.inner.upsert_user(profile).await
    }

    async fn create_lead(
        &self,
        lead: &NewLead,
        documents: &[NewDocument],
    ) -> Result<Lead, StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Query("disk I/O error".into()));
        }
        self.inner.create_lead(lead, documents).await
    }

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>, StoreError> {
        self.inner.get_lead(id).await
    }

    async fn update_lead_status(&self, id: i64, status: LeadStatus) -> Result<(), StoreError> {
        self.inner.update_lead_status(id, status).await
    }

    async fn delete_lead(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_lead(id).await
    }

    async fn list_leads(
        &self,
        filter: &LeadFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Lead>, StoreError> {
        self.inner.list_leads(filter, page, per_page).await
    }

    async fn list_documents(&self, lead_id: i64) -> Result<Vec<Document>, StoreError> {
        self.inner.list_documents(lead_id).await
    }

    async fn append_message_log(&self, entry: &NewMessageLog) -> Result<(), StoreError> {
        self.inner.append_message_log(entry).await
    }
}

#[tokio::test]
async fn consultation_commit_retries_with_intact_buffer() {
    let (backend, user) = store_with_user().await;
    let store = FlakyStore {
        inner: backend,
        fail_next: AtomicBool::new(true),
    };
    let eng = engine();

    let event = run_flow(
        &eng,
        7,
        user.id,
        FlowKind::Consultation,
        vec![
            choice("video"),
            choice("60"),
            text("A. Smith"),
            text("@asmith_99"),
            DialogInput::Skip,
        ],
    );
    let EngineEvent::Completed { lead, documents, .. } = event else {
        panic!("flow did not complete");
    };

    // First commit hits the injected storage failure; nothing is persisted
    let err = store.create_lead(&lead, &documents).await.unwrap_err();
    assert!(err.is_storage_failure());
    let page = store
        .list_leads(&LeadFilter::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    // The session held its buffer: any further input re-emits the same lead
    let retry = eng.handle_input(7, user.id, text("retry please"));
    let EngineEvent::Completed {
        lead: retried,
        documents: retried_docs,
        ..
    } = retry
    else {
        panic!("session did not hold the completed buffer");
    };
    assert_eq!(retried, lead);

    let persisted = store.create_lead(&retried, &retried_docs).await.unwrap();
    eng.finish(7);

    assert_eq!(persisted.consult_format, Some(ConsultFormat::Video));
    assert_eq!(persisted.duration_min, Some(60));
    let page = store
        .list_leads(&LeadFilter::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1, "retry must produce exactly one lead");
}

#[tokio::test]
async fn abandoned_flow_persists_nothing() {
    let (store, user) = store_with_user().await;
    let eng = engine();

    eng.start_flow(3, FlowKind::DocumentReview);
    eng.handle_input(3, user.id, choice("contract"));
    eng.handle_input(
        3,
        user.id,
        DialogInput::Attachment {
            file_ref: "f1".into(),
            kind: DocumentKind::File,
            caption: None,
        },
    );
    assert!(eng.cancel(3));

    let page = store
        .list_leads(&LeadFilter::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn starting_a_new_flow_discards_the_old_buffer() {
    let (store, user) = store_with_user().await;
    let eng = engine();

    // Half-finished quick question
    eng.start_flow(9, FlowKind::QuickQuestion);
    eng.handle_input(9, user.id, choice("contract review"));
    eng.handle_input(9, user.id, text("Old brief that must not survive"));

    // Switch to consultation and complete it
    let event = run_flow(
        &eng,
        9,
        user.id,
        FlowKind::Consultation,
        vec![
            choice("phone"),
            choice("30"),
            text("B"),
            text("+380501234567"),
            text("b@example.com"),
        ],
    );
    let EngineEvent::Completed { lead, documents, .. } = event else {
        panic!("flow did not complete");
    };
    let persisted = store.create_lead(&lead, &documents).await.unwrap();

    assert_eq!(persisted.source, LeadSource::Consultation);
    assert_eq!(persisted.brief, None);
    assert_eq!(persisted.category, None);
    assert_eq!(persisted.email.as_deref(), Some("b@example.com"));
}

#[tokio::test]
async fn review_flow_commits_lead_and_documents_together() {
    let (store, user) = store_with_user().await;
    let eng = engine();

    let event = run_flow(
        &eng,
        4,
        user.id,
        FlowKind::DocumentReview,
        vec![
            choice("agreement"),
            DialogInput::Attachment {
                file_ref: "file-1".into(),
                kind: DocumentKind::File,
                caption: Some("page 1".into()),
            },
            DialogInput::Attachment {
                file_ref: "photo-1".into(),
                kind: DocumentKind::Photo,
                caption: None,
            },
            text("Supplier agreement, unsure about clause 7"),
            choice("call"),
        ],
    );
    let EngineEvent::Completed {
        lead,
        documents,
        review_plan,
        ..
    } = event
    else {
        panic!("flow did not complete");
    };
    assert_eq!(review_plan.as_deref(), Some("call"));

    let persisted = store.create_lead(&lead, &documents).await.unwrap();
    let stored = store.list_documents(persisted.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].file_ref, "file-1");
    assert_eq!(stored[1].kind, DocumentKind::Photo);

    // Deleting the lead removes its documents with it
    store.delete_lead(persisted.id).await.unwrap();
    assert!(store.list_documents(persisted.id).await.unwrap().is_empty());
}
