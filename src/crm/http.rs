use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{CrmClient, CrmError, CrmRecord, FieldFilter, Properties, RecordKind};
use crate::models::contact::{Contact, NewContact};

/// Connection settings for [`HttpCrmClient`].
#[derive(Debug, Clone)]
pub struct HttpCrmSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub offering_object: String,
    pub booking_object: String,
}

/// REST adapter for the CRM. Every call is bounded by the configured timeout and
/// never retried here.
#[derive(Clone)]
pub struct HttpCrmClient {
    client: Client,
    base_url: Url,
    api_key: String,
    offering_object: String,
    booking_object: String,
}

#[derive(Serialize)]
struct SearchFilter<'a> {
    field: &'a str,
    operator: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    filters: Vec<SearchFilter<'a>>,
}

#[derive(Serialize)]
struct PropertiesBody<'a> {
    properties: &'a Properties,
}

#[derive(Serialize)]
struct TagsBody<'a> {
    tags: &'a [String],
}

#[derive(Deserialize)]
struct RecordEnvelope {
    record: CrmRecord,
}

#[derive(Deserialize)]
struct RecordsEnvelope {
    #[serde(default)]
    records: Vec<CrmRecord>,
}

#[derive(Deserialize)]
struct ContactEnvelope {
    contact: Contact,
}

#[derive(Deserialize)]
struct ContactsEnvelope {
    #[serde(default)]
    contacts: Vec<Contact>,
}

impl HttpCrmClient {
    pub fn new(settings: HttpCrmSettings) -> Result<Self, CrmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CrmError::Transport(e.to_string()))?;

        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| CrmError::Transport(format!("invalid CRM base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CrmError::Transport(format!(
                "CRM base URL cannot carry a path: {}",
                settings.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
            offering_object: settings.offering_object,
            booking_object: settings.booking_object,
        })
    }

    fn object_name(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Offering => &self.offering_object,
            RecordKind::Booking => &self.booking_object,
        }
    }

    /// Appends `segments` to the base path. Each segment is percent-encoded, so
    /// `/`, `?` and `#` inside an id stay inside that segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn records_url(&self, kind: RecordKind, rest: &[&str]) -> Url {
        let mut segments = vec!["objects", self.object_name(kind), "records"];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CrmError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    #[instrument(skip(self, filters), fields(object = kind.as_str()))]
    async fn search_records(
        &self,
        kind: RecordKind,
        filters: &[FieldFilter],
    ) -> Result<Vec<CrmRecord>, CrmError> {
        let body = SearchRequest {
            filters: filters
                .iter()
                .map(|f| SearchFilter {
                    field: &f.field,
                    operator: "eq",
                    value: &f.value,
                })
                .collect(),
        };
        let url = self.records_url(kind, &["search"]);
        let envelope: RecordsEnvelope = self.send_json(self.client.post(url).json(&body)).await?;
        debug!(count = envelope.records.len(), "CRM search returned");
        Ok(envelope.records)
    }

    #[instrument(skip(self), fields(object = kind.as_str()))]
    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<CrmRecord>, CrmError> {
        if !is_addressable(id) {
            warn!(id, "refusing to look up a malformed record id");
            return Ok(None);
        }
        let url = self.records_url(kind, &[id]);
        let response = self.authorized(self.client.get(url)).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        let envelope: RecordEnvelope = serde_json::from_slice(&bytes)?;
        Ok(Some(envelope.record))
    }

    #[instrument(skip(self, properties), fields(object = kind.as_str()))]
    async fn create_record(
        &self,
        kind: RecordKind,
        properties: Properties,
    ) -> Result<CrmRecord, CrmError> {
        let body = PropertiesBody {
            properties: &properties,
        };
        let envelope: RecordEnvelope = self
            .send_json(self.client.post(self.records_url(kind, &[])).json(&body))
            .await?;
        Ok(envelope.record)
    }

    #[instrument(skip(self, properties), fields(object = kind.as_str()))]
    async fn update_record(
        &self,
        kind: RecordKind,
        id: &str,
        properties: Properties,
    ) -> Result<(), CrmError> {
        if !is_addressable(id) {
            return Err(CrmError::NotFound(id.to_string()));
        }
        let url = self.records_url(kind, &[id]);
        let body = PropertiesBody {
            properties: &properties,
        };
        let response = self
            .authorized(self.client.patch(url).json(&body))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, email))]
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        let url = self.endpoint(&["contacts", "search"]);
        let envelope: ContactsEnvelope = self
            .send_json(self.client.get(url).query(&[("email", email)]))
            .await?;
        Ok(envelope
            .contacts
            .into_iter()
            .find(|c| c.email.eq_ignore_ascii_case(email)))
    }

    #[instrument(skip(self, contact))]
    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError> {
        let url = self.endpoint(&["contacts"]);
        let envelope: ContactEnvelope = self.send_json(self.client.post(url).json(contact)).await?;
        Ok(envelope.contact)
    }

    #[instrument(skip(self, tags))]
    async fn add_contact_tags(
        &self,
        contact_id: &str,
        tags: &[String],
    ) -> Result<Contact, CrmError> {
        if !is_addressable(contact_id) {
            return Err(CrmError::NotFound(contact_id.to_string()));
        }
        let url = self.endpoint(&["contacts", contact_id, "tags"]);
        let envelope: ContactEnvelope = self
            .send_json(self.client.post(url).json(&TagsBody { tags }))
            .await?;
        Ok(envelope.contact)
    }
}

/// Dot segments are dropped rather than encoded when appended to a URL path,
/// so they can never name a single record.
fn is_addressable(id: &str) -> bool {
    !matches!(id.trim(), "" | "." | "..")
}
