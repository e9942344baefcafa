//! Booking record lifecycle over the CRM: creation, lookup and guarded
//! status transitions.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::crm::{CrmClient, CrmError, FieldFilter, RecordKind};
use crate::models::booking::{fields, Booking, BookingId, BookingUpdate, NewBooking, PaymentStatus};

#[derive(Clone)]
pub struct BookingStore {
    crm: Arc<dyn CrmClient>,
}

/// Result of asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(PaymentStatus),
    /// The current status has no edge to the requested one; nothing was written.
    Skipped { current: PaymentStatus },
}

impl BookingStore {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }

    /// Creates a `pending` booking with a freshly generated id. `price_paid` must
    /// come from the offering record.
    #[instrument(skip(self, price_paid))]
    pub async fn create(
        &self,
        parent_contact_id: &str,
        student_contact_id: &str,
        offering_id: &str,
        price_paid: Decimal,
    ) -> Result<Booking, CrmError> {
        let new_booking = NewBooking {
            booking_id: BookingId::generate(),
            parent_contact_id: parent_contact_id.to_string(),
            student_contact_id: student_contact_id.to_string(),
            offering_id: offering_id.to_string(),
            price_paid,
        };
        let booking_id = new_booking.booking_id.clone();

        let record = self
            .crm
            .create_record(RecordKind::Booking, new_booking.clone().into_properties()?)
            .await?;

        info!(booking_id = %booking_id, record_id = %record.id, "booking created");
        Ok(Booking {
            record_id: record.id,
            booking_id,
            parent_contact_id: new_booking.parent_contact_id,
            student_contact_id: new_booking.student_contact_id,
            offering_id: new_booking.offering_id,
            payment_status: PaymentStatus::Pending,
            price_paid: new_booking.price_paid,
            webhook_processed: false,
            payment_reference: None,
            currency: None,
        })
    }

    /// Existing booking for this student on this offering. When several match,
    /// the first one the CRM returns wins.
    #[instrument(skip(self))]
    pub async fn find_for_student(
        &self,
        student_contact_id: &str,
        offering_id: &str,
    ) -> Result<Option<Booking>, CrmError> {
        let filters = [
            FieldFilter::eq(fields::STUDENT_CONTACT_ID, student_contact_id),
            FieldFilter::eq(fields::OFFERING_ID, offering_id),
        ];
        let mut records = self
            .crm
            .search_records(RecordKind::Booking, &filters)
            .await?;
        if records.len() > 1 {
            warn!(
                matches = records.len(),
                "multiple bookings for one student and offering; using the first"
            );
        }
        if records.is_empty() {
            return Ok(None);
        }
        Booking::from_record(records.swap_remove(0)).map(Some)
    }

    #[instrument(skip(self))]
    pub async fn find_by_booking_id(&self, booking_id: &str) -> Result<Option<Booking>, CrmError> {
        let filters = [FieldFilter::eq(fields::BOOKING_ID, booking_id)];
        let records = self
            .crm
            .search_records(RecordKind::Booking, &filters)
            .await?;
        match records.into_iter().next() {
            Some(record) => Booking::from_record(record).map(Some),
            None => Ok(None),
        }
    }

    /// Writes only the fields present in `update`.
    pub async fn update(&self, booking: &Booking, update: BookingUpdate) -> Result<(), CrmError> {
        if update.is_empty() {
            return Ok(());
        }
        self.crm
            .update_record(RecordKind::Booking, &booking.record_id, update.into_properties()?)
            .await
    }

    /// Moves the booking to `next` if the state machine allows it. Out-of-terminal
    /// moves are skipped without error. Extra fields in `extra` ride along with an
    /// applied transition.
    #[instrument(skip(self, booking, extra), fields(booking_id = %booking.booking_id))]
    pub async fn transition(
        &self,
        booking: &Booking,
        next: PaymentStatus,
        extra: BookingUpdate,
    ) -> Result<Transition, CrmError> {
        let Some(status) = booking.payment_status.transition(next) else {
            info!(current = %booking.payment_status, requested = %next, "status transition skipped");
            return Ok(Transition::Skipped {
                current: booking.payment_status,
            });
        };

        let update = BookingUpdate {
            payment_status: Some(status),
            ..extra
        };
        self.update(booking, update).await?;
        info!(from = %booking.payment_status, to = %status, "booking status changed");
        Ok(Transition::Applied(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::InMemoryCrm;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn store() -> (Arc<InMemoryCrm>, BookingStore) {
        let crm = Arc::new(InMemoryCrm::new());
        (crm.clone(), BookingStore::new(crm))
    }

    #[tokio::test]
    async fn created_booking_is_pending_with_offering_price() {
        let (crm, store) = store();
        let booking = store.create("p1", "s1", "o1", dec!(45.50)).await.unwrap();

        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert!(BookingId::is_well_formed(booking.booking_id.as_str()));

        let stored = crm.bookings().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price_paid, dec!(45.5));
        assert_eq!(stored[0].booking_id, booking.booking_id);
        assert!(!stored[0].webhook_processed);
    }

    #[tokio::test]
    async fn lookups_by_student_and_by_booking_id() {
        let (_crm, store) = store();
        let booking = store.create("p1", "s1", "o1", dec!(10)).await.unwrap();
        store.create("p1", "s1", "o2", dec!(10)).await.unwrap();

        let found = store.find_for_student("s1", "o1").await.unwrap().unwrap();
        assert_eq!(found.record_id, booking.record_id);
        assert!(store.find_for_student("s2", "o1").await.unwrap().is_none());

        let by_id = store
            .find_by_booking_id(booking.booking_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.offering_id, "o1");
    }

    #[tokio::test]
    async fn terminal_states_do_not_move() {
        let (_crm, store) = store();
        let booking = store.create("p1", "s1", "o1", dec!(10)).await.unwrap();

        let applied = store
            .transition(&booking, PaymentStatus::Paid, BookingUpdate::default())
            .await
            .unwrap();
        assert_eq!(applied, Transition::Applied(PaymentStatus::Paid));

        let paid = store
            .find_by_booking_id(booking.booking_id.as_str())
            .await
            .unwrap()
            .unwrap();
        let skipped = store
            .transition(&paid, PaymentStatus::Expired, BookingUpdate::default())
            .await
            .unwrap();
        assert_matches!(skipped, Transition::Skipped { current: PaymentStatus::Paid });

        let reread = store
            .find_by_booking_id(booking.booking_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reread.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let (_crm, store) = store();
        let booking = store.create("p1", "s1", "o1", dec!(30)).await.unwrap();
        store.update(&booking, BookingUpdate::processed()).await.unwrap();

        let reread = store
            .find_by_booking_id(booking.booking_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert!(reread.webhook_processed);
        assert_eq!(reread.payment_status, PaymentStatus::Pending);
        assert_eq!(reread.price_paid, dec!(30));
    }
}
