use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::crm::{CrmClient, FieldFilter, RecordKind};
use crate::errors::ServiceError;
use crate::models::offering::{fields, Availability, Offering, YearGroup};
use crate::validation::validate_year_group;

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OfferingsQuery {
    /// One of `gcse`, `alevel`
    #[validate(custom = "validate_year_group")]
    pub year_group: String,
}

/// Public view of a bookable offering. Payment product and session link stay private.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OfferingSummary {
    pub id: String,
    pub name: String,
    pub cohort: String,
    pub year_group: YearGroup,
    pub subject: String,
    pub workshop_date: String,
    pub workshop_time: String,
    pub availability: Availability,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub price_label: String,
}

impl From<Offering> for OfferingSummary {
    fn from(offering: Offering) -> Self {
        Self {
            id: offering.id,
            name: offering.name,
            cohort: offering.cohort,
            year_group: offering.year_group,
            subject: offering.subject,
            workshop_date: offering.workshop_date,
            workshop_time: offering.workshop_time,
            availability: offering.availability,
            price: offering.price,
            price_label: offering.price_label,
        }
    }
}

pub struct OfferingService {
    crm: Arc<dyn CrmClient>,
}

impl OfferingService {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }

    pub async fn list_available(
        &self,
        query: OfferingsQuery,
    ) -> Result<Vec<OfferingSummary>, ServiceError> {
        query.validate()?;
        let year_group: YearGroup = query
            .year_group
            .parse()
            .map_err(ServiceError::ValidationError)?;
        self.list_available_on(year_group, &super::today()).await
    }

    /// Offerings in `year_group` that are available and not yet past, oldest update first.
    #[instrument(skip(self))]
    pub async fn list_available_on(
        &self,
        year_group: YearGroup,
        today: &str,
    ) -> Result<Vec<OfferingSummary>, ServiceError> {
        let records = self
            .crm
            .search_records(
                RecordKind::Offering,
                &[FieldFilter::eq(fields::YEAR_GROUP, year_group.as_str())],
            )
            .await
            .map_err(|e| ServiceError::fetch("offerings", e))?;

        let mut offerings: Vec<Offering> = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match Offering::from_record(record) {
                    Ok(offering) => Some(offering),
                    Err(e) => {
                        warn!(offering_id = %id, error = %e, "skipping undecodable offering");
                        None
                    }
                }
            })
            .filter(|o| o.year_group == year_group && o.is_bookable_on(today))
            .collect();

        offerings.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(offerings.into_iter().map(OfferingSummary::from).collect())
    }
}
