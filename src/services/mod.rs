pub mod booking_store;
pub mod bookings;
pub mod checkout;
pub mod contacts;
pub mod eligibility;
pub mod offerings;
pub mod reconciliation;

/// Today's date on the server's local clock as `YYYY-MM-DD`.
///
/// Callers compute this once per request and pass it down, so every check in a
/// request sees the same day.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
