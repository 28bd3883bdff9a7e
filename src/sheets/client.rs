//! Google Sheets REST client for the lead mirror.
//!
//! Auth is a service-account JWT (RS256) exchanged at the OAuth token
//! endpoint; the access token is cached until shortly before expiry. Rows
//! go out via `values.append` with a header row written on first use.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::model::Lead;
use crate::sheets::credentials::ServiceAccountKey;

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
/// Refresh the token a minute early to avoid using one mid-expiry.
const TOKEN_SLACK_SECS: i64 = 60;

pub const HEADER_ROW: &[&str] = &[
    "id", "created_at", "status", "source", "name", "contact", "email", "category", "urgency",
    "format", "duration_min", "slot", "brief",
];

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

pub struct SheetsClient {
    key: ServiceAccountKey,
    spreadsheet_id: String,
    sheet_name: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    header_written: Mutex<bool>,
}

impl SheetsClient {
    pub fn new(key: ServiceAccountKey, spreadsheet_id: String, sheet_name: String) -> Self {
        Self {
            key,
            spreadsheet_id,
            sheet_name,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
            header_written: Mutex::new(false),
        }
    }

    fn sign_assertion(&self, now: i64) -> Result<String, SyncError> {
        let claims = Claims {
            iss: self.key.client_email.clone(),
            scope: SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };
        let encoding_key =
            EncodingKey::from_rsa_pem(self.key.private_key.expose_secret().as_bytes())
                .map_err(|e| SyncError::Auth(format!("invalid service-account key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SyncError::Auth(format!("failed to sign assertion: {e}")))
    }

    async fn access_token(&self) -> Result<String, SyncError> {
        let now = Utc::now().timestamp();
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_SLACK_SECS > now {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::Response(format!("bad token response: {e}")))?;
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::Response("token response missing access_token".into()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .unwrap_or(3600);

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: now + expires_in,
        });
        Ok(access_token)
    }

    /// Write the header row if the sheet is still empty. Checked once per
    /// process; a pre-populated sheet short-circuits.
    async fn ensure_header(&self, token: &str) -> Result<(), SyncError> {
        let mut written = self.header_written.lock().await;
        if *written {
            return Ok(());
        }

        let url = format!(
            "{SHEETS_API}/{}/values/{}!A1:A1",
            self.spreadsheet_id, self.sheet_name
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SyncError::Request(format!("header check failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(SyncError::Response(format!(
                "header check returned {status}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::Response(format!("bad header response: {e}")))?;
        let is_empty = body
            .get("values")
            .and_then(|v| v.as_array())
            .is_none_or(|rows| rows.is_empty());

        if is_empty {
            let header: Vec<String> = HEADER_ROW.iter().map(|s| s.to_string()).collect();
            self.append_row(token, header).await?;
            tracing::info!(sheet = %self.sheet_name, "Sheets header row created");
        }

        *written = true;
        Ok(())
    }

    async fn append_row(&self, token: &str, row: Vec<String>) -> Result<(), SyncError> {
        let url = format!(
            "{SHEETS_API}/{}/values/{}!A1:append?valueInputOption=USER_ENTERED",
            self.spreadsheet_id, self.sheet_name
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "values": [row] }))
            .send()
            .await
            .map_err(|e| SyncError::Request(format!("append failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Response(format!(
                "append returned {status}: {body}"
            )));
        }
        Ok(())
    }

    /// Mirror one persisted lead as a sheet row.
    pub async fn append_lead(&self, lead: &Lead) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        self.ensure_header(&token).await?;
        self.append_row(&token, lead_row(lead)).await
    }
}

/// Flatten a lead into the sheet's column order.
fn lead_row(lead: &Lead) -> Vec<String> {
    vec![
        lead.id.to_string(),
        lead.created_at.to_rfc3339(),
        lead.status.as_str().to_string(),
        lead.source.as_str().to_string(),
        lead.name.clone().unwrap_or_default(),
        lead.contact.clone().unwrap_or_default(),
        lead.email.clone().unwrap_or_default(),
        lead.category.clone().unwrap_or_default(),
        lead.urgency.clone().unwrap_or_default(),
        lead.consult_format
            .map(|f| f.as_str().to_string())
            .unwrap_or_default(),
        lead.duration_min.map(|d| d.to_string()).unwrap_or_default(),
        lead.slot.clone().unwrap_or_default(),
        lead.brief.clone().unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConsultFormat, LeadSource, LeadStatus};

    #[test]
    fn lead_row_matches_header_width() {
        let lead = Lead {
            id: 5,
            user_id: 1,
            source: LeadSource::Consultation,
            category: None,
            brief: None,
            urgency: None,
            consult_format: Some(ConsultFormat::Phone),
            duration_min: Some(30),
            slot: None,
            name: Some("B".into()),
            contact: Some("@bjones99".into()),
            email: None,
            status: LeadStatus::New,
            created_at: Utc::now(),
        };
        let row = lead_row(&lead);
        assert_eq!(row.len(), HEADER_ROW.len());
        assert_eq!(row[3], "consultation");
        assert_eq!(row[9], "phone");
        assert_eq!(row[10], "30");
        assert_eq!(row[6], "");
    }
}
