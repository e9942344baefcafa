pub mod booking;
pub mod contact;
pub mod offering;

pub use booking::{Booking, BookingId, BookingUpdate, NewBooking, PaymentStatus};
pub use contact::{Contact, ContactFields, ContactRole, NewContact};
pub use offering::{Availability, Offering, YearGroup};

use serde::Serialize;

use crate::crm::{CrmError, Properties};

/// Serializes a model into the CRM's flat property map.
pub(crate) fn to_properties<T: Serialize>(value: &T) -> Result<Properties, CrmError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CrmError::Decode(format!(
            "expected an object of properties, got {}",
            other
        ))),
    }
}
