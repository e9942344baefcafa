use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::to_properties;
use crate::crm::{CrmError, CrmRecord, Properties};

/// CRM field names on offering records.
pub mod fields {
    pub const YEAR_GROUP: &str = "yearGroup";
    pub const AVAILABILITY: &str = "availability";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum YearGroup {
    Gcse,
    Alevel,
}

impl YearGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcse => "gcse",
            Self::Alevel => "alevel",
        }
    }
}

impl fmt::Display for YearGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for YearGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcse" => Ok(Self::Gcse),
            "alevel" => Ok(Self::Alevel),
            other => Err(format!("unknown year group '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Full,
    Inactive,
}

/// A schedulable workshop session. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offering {
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(default)]
    pub cohort: String,
    pub year_group: YearGroup,
    pub subject: String,
    /// `YYYY-MM-DD`, compared lexically against today's date
    pub workshop_date: String,
    #[serde(default)]
    pub workshop_time: String,
    pub availability: Availability,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    #[serde(default)]
    pub price_label: String,
    #[serde(default)]
    pub session_link: String,
    #[serde(default)]
    pub payment_product_id: Option<String>,
}

impl Offering {
    pub fn from_record(record: CrmRecord) -> Result<Self, CrmError> {
        let mut offering: Offering =
            serde_json::from_value(serde_json::Value::Object(record.properties)).map_err(|e| {
                CrmError::Decode(format!("offering {}: {}", record.id, e))
            })?;
        offering.id = record.id;
        offering.updated_at = record.updated_at;
        Ok(offering)
    }

    pub fn to_properties(&self) -> Result<Properties, CrmError> {
        to_properties(self)
    }

    pub fn is_past(&self, today: &str) -> bool {
        self.workshop_date.as_str() < today
    }

    pub fn is_bookable_on(&self, today: &str) -> bool {
        self.availability == Availability::Available && !self.is_past(today)
    }

    /// Payment product reference, treating blank strings as absent.
    pub fn payment_product(&self) -> Option<&str> {
        self.payment_product_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record() -> CrmRecord {
        CrmRecord {
            id: "off_1".into(),
            properties: json!({
                "name": "GCSE Maths Revision",
                "cohort": "spring-2025",
                "yearGroup": "gcse",
                "subject": "Maths",
                "workshopDate": "2025-04-12",
                "workshopTime": "10:00-13:00",
                "availability": "available",
                "price": 45.5,
                "priceLabel": "£45.50",
                "sessionLink": "https://meet.example.com/abc",
                "paymentProductId": "price_123"
            })
            .as_object()
            .cloned()
            .unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn decodes_offering_record() {
        let offering = Offering::from_record(record()).unwrap();
        assert_eq!(offering.id, "off_1");
        assert_eq!(offering.year_group, YearGroup::Gcse);
        assert_eq!(offering.availability, Availability::Available);
        assert_eq!(offering.price, dec!(45.5));
        assert_eq!(offering.payment_product(), Some("price_123"));
    }

    #[test]
    fn price_may_arrive_as_string() {
        let mut rec = record();
        rec.properties.insert("price".into(), json!("30.00"));
        let offering = Offering::from_record(rec).unwrap();
        assert_eq!(offering.price, dec!(30.00));
    }

    #[test]
    fn unknown_availability_is_a_decode_error() {
        let mut rec = record();
        rec.properties.insert("availability".into(), json!("paused"));
        assert!(matches!(
            Offering::from_record(rec),
            Err(CrmError::Decode(_))
        ));
    }

    #[test]
    fn blank_payment_product_counts_as_missing() {
        let mut rec = record();
        rec.properties.insert("paymentProductId".into(), json!("  "));
        assert_eq!(Offering::from_record(rec).unwrap().payment_product(), None);
    }

    #[test]
    fn date_comparison_is_lexical_on_iso_dates() {
        let offering = Offering::from_record(record()).unwrap();
        assert!(!offering.is_past("2025-04-12"));
        assert!(offering.is_past("2025-04-13"));
        assert!(offering.is_bookable_on("2025-01-01"));
    }

    #[test]
    fn properties_round_trip_through_record() {
        let offering = Offering::from_record(record()).unwrap();
        let props = offering.to_properties().unwrap();
        assert_eq!(props["price"], json!(45.5));
        assert!(props.get("id").is_none());

        let again = Offering::from_record(CrmRecord {
            id: "off_1".into(),
            properties: props,
            updated_at: None,
        })
        .unwrap();
        assert_eq!(again, offering);
    }

    #[test]
    fn year_group_parses_case_insensitively() {
        assert_eq!("ALevel".parse::<YearGroup>().unwrap(), YearGroup::Alevel);
        assert!("ks3".parse::<YearGroup>().is_err());
    }
}
