//! Parent and student contact resolution.
//!
//! Contacts are upserted by email. An existing contact only ever gains tags;
//! names, phone and custom fields already held in the CRM are left untouched.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::crm::CrmClient;
use crate::errors::ServiceError;
use crate::models::contact::{Contact, ContactFields, ContactRole, NewContact};
use crate::models::offering::Offering;

/// Identifying fields submitted for one person. `phone` is already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl ContactDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// `workshop-<yearGroup>-<subject>-<date>`, lower-cased with whitespace runs
/// collapsed to single hyphens.
pub fn workshop_tag(offering: &Offering) -> String {
    let raw = format!(
        "workshop-{}-{}-{}",
        offering.year_group, offering.subject, offering.workshop_date
    );
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Clone)]
pub struct ContactResolver {
    crm: Arc<dyn CrmClient>,
}

impl ContactResolver {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }

    #[instrument(skip(self, details), fields(role = "parent"))]
    pub async fn resolve_parent(
        &self,
        details: &ContactDetails,
        workshop_tag: &str,
    ) -> Result<Contact, ServiceError> {
        let fields = ContactFields {
            contact_type: Some(ContactRole::Parent),
            ..Default::default()
        };
        self.upsert(ContactRole::Parent, details, fields, workshop_tag)
            .await
    }

    /// Resolves the student, linking a newly created record to `parent_contact_id`.
    #[instrument(skip(self, details), fields(role = "student"))]
    pub async fn resolve_student(
        &self,
        details: &ContactDetails,
        parent_contact_id: &str,
        year_group: &str,
        workshop_tag: &str,
    ) -> Result<Contact, ServiceError> {
        let fields = ContactFields {
            contact_type: Some(ContactRole::Student),
            parent_contact_id: Some(parent_contact_id.to_string()),
            year_group: Some(year_group.to_string()),
        };
        self.upsert(ContactRole::Student, details, fields, workshop_tag)
            .await
    }

    async fn upsert(
        &self,
        role: ContactRole,
        details: &ContactDetails,
        custom_fields: ContactFields,
        workshop_tag: &str,
    ) -> Result<Contact, ServiceError> {
        let tags = vec![role.tag().to_string(), workshop_tag.to_string()];

        let existing = self
            .crm
            .find_contact_by_email(&details.email)
            .await
            .map_err(|e| ServiceError::create("contact", e))?;

        if let Some(contact) = existing {
            debug!(contact_id = %contact.id, "contact exists; merging tags only");
            return self
                .crm
                .add_contact_tags(&contact.id, &tags)
                .await
                .map_err(|e| ServiceError::create("contact", e));
        }

        let new_contact = NewContact {
            first_name: details.first_name.clone(),
            last_name: details.last_name.clone(),
            email: details.email.clone(),
            phone: details.phone.clone(),
            tags,
            custom_fields,
        };
        let contact = self
            .crm
            .create_contact(&new_contact)
            .await
            .map_err(|e| ServiceError::create("contact", e))?;
        info!(contact_id = %contact.id, role = %role, "contact created");
        Ok(contact)
    }
}
