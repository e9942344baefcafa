use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag applied to every parent contact.
pub const PARENT_TAG: &str = "parent";
/// Tag applied to every student contact.
pub const STUDENT_TAG: &str = "student";

/// A person record in the CRM, shared across every booking they make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: ContactFields,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Custom fields written when a contact is first created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<ContactRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactRole {
    Parent,
    Student,
}

impl ContactRole {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Parent => PARENT_TAG,
            Self::Student => STUDENT_TAG,
        }
    }
}

impl fmt::Display for ContactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Payload for creating a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub tags: Vec<String>,
    pub custom_fields: ContactFields,
}
