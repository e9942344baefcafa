//! Booking creation: eligibility, contact resolution, duplicate guard, record
//! creation and checkout handoff, strictly in that order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;
use utoipa::ToSchema;
use validator::Validate;

use super::booking_store::BookingStore;
use super::checkout::{build_checkout_url, CheckoutMetadata};
use super::contacts::{workshop_tag, ContactDetails, ContactResolver};
use super::eligibility::{load_eligible_offering, EligibleOffering};
use crate::crm::CrmClient;
use crate::errors::ServiceError;
use crate::models::booking::{Booking, PaymentStatus};
use crate::models::offering::Offering;
use crate::validation::{
    normalize_phone, validate_not_blank, validate_optional_phone, validate_phone,
    validate_record_id,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentInput {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub first_name: String,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub first_name: String,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    #[validate(custom = "validate_optional_phone")]
    pub phone: Option<String>,
}

/// Body of `POST /bookings`. The price is never taken from the client.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[validate(custom = "validate_record_id")]
    pub offering_id: String,
    #[validate]
    pub parent: ParentInput,
    #[validate]
    pub student: StudentInput,
}

impl ParentInput {
    fn details(&self) -> ContactDetails {
        ContactDetails {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: normalize_phone(&self.phone),
        }
    }
}

impl StudentInput {
    fn details(&self) -> ContactDetails {
        ContactDetails {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self
                .phone
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .and_then(normalize_phone),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    #[schema(example = "BK-M5X2K9QZ-7F3KD")]
    pub booking_id: String,
    pub record_id: String,
    pub parent_contact_id: String,
    pub student_contact_id: String,
    pub checkout_url: String,
    /// Offering price recorded on the booking
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
    /// True when an unpaid booking for the same student and offering was reused
    pub reused: bool,
}

/// What the duplicate guard decided for an existing booking.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    NoBooking,
    ReusePending(Booking),
    AlreadyResolved(Booking),
}

impl DuplicateCheck {
    pub fn from_existing(existing: Option<Booking>) -> Self {
        match existing {
            None => Self::NoBooking,
            Some(booking) if booking.payment_status == PaymentStatus::Pending => {
                Self::ReusePending(booking)
            }
            Some(booking) => Self::AlreadyResolved(booking),
        }
    }
}

pub struct BookingService {
    crm: Arc<dyn CrmClient>,
    contacts: ContactResolver,
    bookings: BookingStore,
    checkout_page: Url,
}

impl BookingService {
    pub fn new(crm: Arc<dyn CrmClient>, checkout_page: Url) -> Self {
        Self {
            contacts: ContactResolver::new(crm.clone()),
            bookings: BookingStore::new(crm.clone()),
            crm,
            checkout_page,
        }
    }

    /// Runs the booking flow against the server's current date.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<CreateBookingResponse, ServiceError> {
        let today = super::today();
        self.create_booking_on(request, &today).await
    }

    #[instrument(skip(self, request), fields(offering_id = %request.offering_id))]
    pub async fn create_booking_on(
        &self,
        request: CreateBookingRequest,
        today: &str,
    ) -> Result<CreateBookingResponse, ServiceError> {
        request.validate()?;

        let EligibleOffering { offering, .. } =
            load_eligible_offering(self.crm.as_ref(), request.offering_id.trim(), today).await?;

        let tag = workshop_tag(&offering);
        let parent_details = request.parent.details();
        let student_details = request.student.details();

        let parent = self.contacts.resolve_parent(&parent_details, &tag).await?;
        let student = self
            .contacts
            .resolve_student(
                &student_details,
                &parent.id,
                offering.year_group.as_str(),
                &tag,
            )
            .await?;

        let existing = self
            .bookings
            .find_for_student(&student.id, &offering.id)
            .await
            .map_err(|e| ServiceError::fetch("booking", e))?;

        let (booking, reused) = match DuplicateCheck::from_existing(existing) {
            DuplicateCheck::AlreadyResolved(booking) => {
                info!(
                    booking_id = %booking.booking_id,
                    status = %booking.payment_status,
                    "duplicate booking rejected"
                );
                return Err(ServiceError::DuplicateBooking);
            }
            DuplicateCheck::ReusePending(booking) => {
                info!(booking_id = %booking.booking_id, "reusing pending booking");
                (booking, true)
            }
            DuplicateCheck::NoBooking => {
                let booking = self
                    .bookings
                    .create(&parent.id, &student.id, &offering.id, offering.price)
                    .await
                    .map_err(|e| ServiceError::create("booking", e))?;
                (booking, false)
            }
        };

        let metadata = handoff_metadata(&booking, &parent_details, &student_details, &offering);
        let checkout_url = build_checkout_url(&self.checkout_page, &metadata);

        Ok(CreateBookingResponse {
            booking_id: booking.booking_id.to_string(),
            record_id: booking.record_id.clone(),
            parent_contact_id: parent.id.clone(),
            student_contact_id: student.id.clone(),
            checkout_url,
            price: booking.price_paid,
            reused,
        })
    }
}

fn handoff_metadata(
    booking: &Booking,
    parent: &ContactDetails,
    student: &ContactDetails,
    offering: &Offering,
) -> CheckoutMetadata {
    CheckoutMetadata {
        booking_id: booking.booking_id.to_string(),
        parent_name: parent.full_name(),
        parent_email: parent.email.clone(),
        parent_phone: parent.phone.clone().unwrap_or_default(),
        student_name: student.full_name(),
        student_email: student.email.clone(),
        offering_id: offering.id.clone(),
        offering_name: offering.name.clone(),
        subject: offering.subject.clone(),
        workshop_date: offering.workshop_date.clone(),
        workshop_time: offering.workshop_time.clone(),
        year_group: offering.year_group.to_string(),
        session_link: offering.session_link.clone(),
        price: booking.price_paid.normalize().to_string(),
    }
}
