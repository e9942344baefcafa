//! CRM collaborator boundary.
//!
//! The CRM is the system of record for offerings, bookings and contacts. Everything
//! the service needs from it goes through [`CrmClient`], which keeps the surface to
//! equality search, fetch by id, create, partial update and the contact operations.
//! [`HttpCrmClient`] talks to the real API; [`InMemoryCrm`] backs local development
//! and the test suite.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::contact::{Contact, NewContact};

pub use http::HttpCrmClient;
pub use memory::InMemoryCrm;

/// Property bag of a CRM record, keyed by the CRM's camelCase field names.
pub type Properties = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM request failed: {0}")]
    Transport(String),

    #[error("CRM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("CRM response could not be decoded: {0}")]
    Decode(String),

    #[error("CRM record not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrmError::Decode(err.to_string())
        } else {
            CrmError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CrmError {
    fn from(err: serde_json::Error) -> Self {
        CrmError::Decode(err.to_string())
    }
}

/// Custom-object collections this service reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Offering,
    Booking,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offering => "offering",
            Self::Booking => "booking",
        }
    }
}

/// A custom-object record as the CRM returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmRecord {
    pub id: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Equality filter; several filters are AND-combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when the record's property renders to exactly this value.
    pub fn matches(&self, properties: &Properties) -> bool {
        match properties.get(&self.field) {
            Some(serde_json::Value::String(s)) => s == &self.value,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Narrow, typed view of the CRM used by the booking and reconciliation flows.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn search_records(
        &self,
        kind: RecordKind,
        filters: &[FieldFilter],
    ) -> Result<Vec<CrmRecord>, CrmError>;

    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<CrmRecord>, CrmError>;

    async fn create_record(
        &self,
        kind: RecordKind,
        properties: Properties,
    ) -> Result<CrmRecord, CrmError>;

    /// Writes only the supplied properties; everything else on the record is left alone.
    async fn update_record(
        &self,
        kind: RecordKind,
        id: &str,
        properties: Properties,
    ) -> Result<(), CrmError>;

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError>;

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError>;

    /// Merges tags into the contact's existing tag set.
    async fn add_contact_tags(&self, contact_id: &str, tags: &[String])
        -> Result<Contact, CrmError>;
}
