use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{CrmClient, CrmError, CrmRecord, FieldFilter, Properties, RecordKind};
use crate::models::booking::Booking;
use crate::models::contact::{Contact, NewContact};
use crate::models::offering::Offering;

/// Process-local CRM used for local development and the test suite.
///
/// Mirrors the HTTP adapter's semantics: searches are AND-combined equality
/// filters returned in insertion order, updates merge properties, tag merges
/// dedupe, and every write bumps `updatedAt`. Nothing is persisted.
#[derive(Default)]
pub struct InMemoryCrm {
    records: RwLock<HashMap<RecordKind, Vec<CrmRecord>>>,
    contacts: RwLock<Vec<Contact>>,
    next_id: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{}", prefix, n)
    }

    fn check_read(&self) -> Result<(), CrmError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CrmError::Transport("simulated CRM read outage".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), CrmError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CrmError::Transport("simulated CRM write outage".into()));
        }
        Ok(())
    }

    /// Makes every subsequent read fail with a transport error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail with a transport error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Inserts a record with a caller-chosen id and timestamp.
    pub async fn seed_record(
        &self,
        kind: RecordKind,
        id: impl Into<String>,
        properties: Properties,
        updated_at: DateTime<Utc>,
    ) {
        let record = CrmRecord {
            id: id.into(),
            properties,
            updated_at: Some(updated_at),
        };
        self.records
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(record);
    }

    pub async fn seed_offering(&self, offering: &Offering) -> Result<(), CrmError> {
        let properties = offering.to_properties()?;
        self.seed_record(
            RecordKind::Offering,
            offering.id.clone(),
            properties,
            offering.updated_at.unwrap_or_else(Utc::now),
        )
        .await;
        Ok(())
    }

    pub async fn seed_contact(&self, contact: Contact) {
        self.contacts.write().await.push(contact);
    }

    pub async fn records(&self, kind: RecordKind) -> Vec<CrmRecord> {
        self.records
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.records(RecordKind::Booking)
            .await
            .into_iter()
            .filter_map(|r| Booking::from_record(r).ok())
            .collect()
    }

    pub async fn contacts(&self) -> Vec<Contact> {
        self.contacts.read().await.clone()
    }

    pub async fn contact_by_email(&self, email: &str) -> Option<Contact> {
        self.contacts
            .read()
            .await
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

#[async_trait]
impl CrmClient for InMemoryCrm {
    async fn search_records(
        &self,
        kind: RecordKind,
        filters: &[FieldFilter],
    ) -> Result<Vec<CrmRecord>, CrmError> {
        self.check_read()?;
        let records = self.records.read().await;
        Ok(records
            .get(&kind)
            .map(|all| {
                all.iter()
                    .filter(|r| filters.iter().all(|f| f.matches(&r.properties)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<CrmRecord>, CrmError> {
        self.check_read()?;
        let records = self.records.read().await;
        Ok(records
            .get(&kind)
            .and_then(|all| all.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn create_record(
        &self,
        kind: RecordKind,
        properties: Properties,
    ) -> Result<CrmRecord, CrmError> {
        self.check_write()?;
        let record = CrmRecord {
            id: self.allocate_id("rec"),
            properties,
            updated_at: Some(Utc::now()),
        };
        debug!(object = kind.as_str(), record_id = %record.id, "in-memory record created");
        self.records
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        kind: RecordKind,
        id: &str,
        properties: Properties,
    ) -> Result<(), CrmError> {
        self.check_write()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&kind)
            .and_then(|all| all.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| CrmError::NotFound(format!("{} {}", kind.as_str(), id)))?;
        record.properties.extend(properties);
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        self.check_read()?;
        Ok(self.contact_by_email(email).await)
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError> {
        self.check_write()?;
        let mut tags: Vec<String> = Vec::with_capacity(contact.tags.len());
        merge_tags(&mut tags, &contact.tags);
        let created = Contact {
            id: self.allocate_id("con"),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            tags,
            custom_fields: contact.custom_fields.clone(),
        };
        self.contacts.write().await.push(created.clone());
        Ok(created)
    }

    async fn add_contact_tags(
        &self,
        contact_id: &str,
        tags: &[String],
    ) -> Result<Contact, CrmError> {
        self.check_write()?;
        let mut contacts = self.contacts.write().await;
        let contact = contacts
            .iter_mut()
            .find(|c| c.id == contact_id)
            .ok_or_else(|| CrmError::NotFound(format!("contact {}", contact_id)))?;
        merge_tags(&mut contact.tags, tags);
        Ok(contact.clone())
    }
}

fn merge_tags(existing: &mut Vec<String>, incoming: &[String]) {
    for tag in incoming {
        if !existing.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            existing.push(tag.clone());
        }
    }
}
