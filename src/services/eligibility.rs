//! Offering lookup and booking eligibility.

use tracing::{instrument, warn};

use crate::crm::{CrmClient, RecordKind};
use crate::errors::ServiceError;
use crate::models::offering::{Availability, Offering};

/// An offering that passed every eligibility rule, with its payment product.
#[derive(Debug, Clone)]
pub struct EligibleOffering {
    pub offering: Offering,
    pub payment_product_id: String,
}

/// Applies the eligibility rules in order: date, availability, payment product.
///
/// A past workshop is always `OFFERING_PAST`, whatever its availability flag.
pub fn check_eligibility(offering: Offering, today: &str) -> Result<EligibleOffering, ServiceError> {
    if offering.is_past(today) {
        return Err(ServiceError::OfferingPast);
    }

    match offering.availability {
        Availability::Inactive => {
            return Err(ServiceError::OfferingUnavailable(
                "This workshop is no longer available".to_string(),
            ))
        }
        Availability::Full => {
            return Err(ServiceError::OfferingUnavailable(
                "This workshop is full".to_string(),
            ))
        }
        Availability::Available => {}
    }

    let payment_product_id = match offering.payment_product() {
        Some(product) => product.to_string(),
        None => {
            warn!(offering_id = %offering.id, "offering has no payment product configured");
            return Err(ServiceError::OfferingNoProduct(offering.id.clone()));
        }
    };

    Ok(EligibleOffering {
        offering,
        payment_product_id,
    })
}

/// Fetches the offering and checks it can be booked on `today`. Performs no writes.
#[instrument(skip(crm))]
pub async fn load_eligible_offering(
    crm: &dyn CrmClient,
    offering_id: &str,
    today: &str,
) -> Result<EligibleOffering, ServiceError> {
    let record = crm
        .get_record(RecordKind::Offering, offering_id)
        .await
        .map_err(|e| ServiceError::fetch("offering", e))?
        .ok_or_else(|| ServiceError::OfferingNotFound(offering_id.to_string()))?;

    let offering = Offering::from_record(record).map_err(|e| ServiceError::fetch("offering", e))?;
    check_eligibility(offering, today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::InMemoryCrm;
    use crate::models::offering::YearGroup;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    const TODAY: &str = "2025-03-01";

    fn offering(availability: Availability, date: &str, product: Option<&str>) -> Offering {
        Offering {
            id: "off_1".into(),
            updated_at: None,
            name: "A-Level Chemistry".into(),
            cohort: "spring".into(),
            year_group: YearGroup::Alevel,
            subject: "Chemistry".into(),
            workshop_date: date.into(),
            workshop_time: "09:00-12:00".into(),
            availability,
            price: dec!(60),
            price_label: "£60".into(),
            session_link: "https://meet.example.com/chem".into(),
            payment_product_id: product.map(str::to_string),
        }
    }

    #[rstest]
    #[case(Availability::Inactive, "2025-04-01", Some("price_1"), "OFFERING_UNAVAILABLE")]
    #[case(Availability::Full, "2025-04-01", Some("price_1"), "OFFERING_UNAVAILABLE")]
    #[case(Availability::Available, "2025-02-28", Some("price_1"), "OFFERING_PAST")]
    #[case(Availability::Available, "2025-04-01", None, "OFFERING_NO_PRODUCT")]
    #[case(Availability::Available, "2025-04-01", Some(""), "OFFERING_NO_PRODUCT")]
    fn rejects(
        #[case] availability: Availability,
        #[case] date: &str,
        #[case] product: Option<&str>,
        #[case] code: &str,
    ) {
        let err = check_eligibility(offering(availability, date, product), TODAY).unwrap_err();
        assert_eq!(err.code(), code);
    }

    #[rstest]
    #[case(Availability::Full)]
    #[case(Availability::Inactive)]
    fn past_wins_over_availability(#[case] availability: Availability) {
        let err = check_eligibility(offering(availability, "2025-02-28", None), TODAY).unwrap_err();
        assert_matches!(err, ServiceError::OfferingPast);
    }

    #[test]
    fn full_message_names_the_reason() {
        let err = check_eligibility(offering(Availability::Full, "2025-04-01", None), TODAY)
            .unwrap_err();
        assert_matches!(err, ServiceError::OfferingUnavailable(msg) if msg == "This workshop is full");
    }

    #[test]
    fn same_day_is_still_bookable() {
        let ok = check_eligibility(offering(Availability::Available, TODAY, Some("price_1")), TODAY)
            .unwrap();
        assert_eq!(ok.payment_product_id, "price_1");
    }

    #[tokio::test]
    async fn missing_offering_and_fetch_failures() {
        let crm = InMemoryCrm::new();
        let err = load_eligible_offering(&crm, "nope", TODAY).await.unwrap_err();
        assert_matches!(err, ServiceError::OfferingNotFound(id) if id == "nope");

        crm.fail_reads(true);
        let err = load_eligible_offering(&crm, "nope", TODAY).await.unwrap_err();
        assert_eq!(err.code(), "FETCH_ERROR");
    }

    #[tokio::test]
    async fn loads_seeded_offering() {
        let crm = InMemoryCrm::new();
        crm.seed_offering(&offering(Availability::Available, "2025-05-01", Some("price_9")))
            .await
            .unwrap();
        let eligible = load_eligible_offering(&crm, "off_1", TODAY).await.unwrap();
        assert_eq!(eligible.offering.subject, "Chemistry");
        assert_eq!(eligible.payment_product_id, "price_9");
    }
}
