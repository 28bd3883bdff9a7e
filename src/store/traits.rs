//! `LeadStore` — single async interface for all persistence.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    Document, Lead, LeadFilter, LeadStatus, NewDocument, NewLead, NewMessageLog, Page, User,
    UserProfile,
};

/// Backend-agnostic store covering users, leads, documents and message logs.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert the user if absent, otherwise refresh profile and last-seen.
    /// Idempotent; repeat calls never error.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, StoreError>;

    /// Insert a lead and its documents in one transaction (all-or-nothing).
    /// Fails with `Validation` before any row is written if required fields
    /// are missing or the consultation-field invariant is violated.
    async fn create_lead(
        &self,
        lead: &NewLead,
        documents: &[NewDocument],
    ) -> Result<Lead, StoreError>;

    /// Fetch one lead by id.
    async fn get_lead(&self, id: i64) -> Result<Option<Lead>, StoreError>;

    /// Set a lead's status. Fails with `NotFound` if the lead is absent.
    /// Status values are already parsed — anything outside the allowed set
    /// is rejected with `InvalidTransition` at [`LeadStatus::parse`].
    async fn update_lead_status(&self, id: i64, status: LeadStatus) -> Result<(), StoreError>;

    /// Delete a lead, cascading to its documents. Fails with `NotFound` if
    /// absent (a repeat delete is an error, not a no-op).
    async fn delete_lead(&self, id: i64) -> Result<(), StoreError>;

    /// List leads matching the filter, newest first, with the total match
    /// count. An empty result is an empty page, not an error.
    async fn list_leads(
        &self,
        filter: &LeadFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Lead>, StoreError>;

    /// Documents attached to a lead, oldest first.
    async fn list_documents(&self, lead_id: i64) -> Result<Vec<Document>, StoreError>;

    /// Append one audit row. Append-only; failures are surfaced, never
    /// swallowed.
    async fn append_message_log(&self, entry: &NewMessageLog) -> Result<(), StoreError>;
}
