//! HTTP CRM adapter against a mock CRM.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workshop_booking_api::crm::http::HttpCrmSettings;
use workshop_booking_api::crm::{CrmClient, CrmError, FieldFilter, HttpCrmClient, RecordKind};
use workshop_booking_api::models::NewContact;

const API_KEY: &str = "crm_test_key";

fn client(server: &MockServer) -> HttpCrmClient {
    HttpCrmClient::new(HttpCrmSettings {
        base_url: format!("{}/v1/", server.uri()),
        api_key: API_KEY.to_string(),
        timeout: Duration::from_secs(2),
        offering_object: "workshop_offerings".to_string(),
        booking_object: "workshop_bookings".to_string(),
    })
    .expect("client should build")
}

#[tokio::test]
async fn search_posts_equality_filters_to_the_object_collection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/workshop_bookings/records/search"))
        .and(bearer_token(API_KEY))
        .and(body_partial_json(json!({
            "filters": [
                { "field": "studentContactId", "operator": "eq", "value": "con_2" },
                { "field": "offeringId", "operator": "eq", "value": "off_1" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{
                "id": "rec_9",
                "properties": { "bookingId": "BK-1-AAAAA", "paymentStatus": "pending" },
                "updatedAt": "2025-01-02T10:00:00Z"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client(&server)
        .search_records(
            RecordKind::Booking,
            &[
                FieldFilter::eq("studentContactId", "con_2"),
                FieldFilter::eq("offeringId", "off_1"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "rec_9");
    assert_eq!(records[0].properties["paymentStatus"], json!("pending"));
    assert!(records[0].updated_at.is_some());
}

#[tokio::test]
async fn get_record_treats_404_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/objects/workshop_offerings/records/off_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/objects/workshop_offerings/records/off_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "record": { "id": "off_1", "properties": { "name": "Physics" } }
        })))
        .mount(&server)
        .await;

    let crm = client(&server);
    assert!(crm
        .get_record(RecordKind::Offering, "off_missing")
        .await
        .unwrap()
        .is_none());
    let record = crm
        .get_record(RecordKind::Offering, "off_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.properties["name"], json!("Physics"));
}

#[tokio::test]
async fn update_patches_only_supplied_properties() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/objects/workshop_bookings/records/rec_9"))
        .and(body_partial_json(json!({ "properties": { "webhookProcessed": true } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut properties = serde_json::Map::new();
    properties.insert("webhookProcessed".into(), json!(true));
    client(&server)
        .update_record(RecordKind::Booking, "rec_9", properties)
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/workshop_bookings/records"))
        .respond_with(ResponseTemplate::new(422).set_body_string("missing field"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_record(RecordKind::Booking, serde_json::Map::new())
        .await
        .unwrap_err();
    assert_matches!(err, CrmError::Status { status: 422, ref body } if body == "missing field");
}

#[tokio::test]
async fn contact_lookup_matches_email_case_insensitively() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/contacts/search"))
        .and(query_param("email", "ada@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contacts": [
                { "id": "con_other", "firstName": "Other", "lastName": "Person", "email": "someone@example.com" },
                { "id": "con_1", "firstName": "Ada", "lastName": "Okafor", "email": "ADA@example.com", "tags": ["parent"] }
            ]
        })))
        .mount(&server)
        .await;

    let contact = client(&server)
        .find_contact_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.id, "con_1");
    assert!(contact.has_tag("Parent"));
}

#[tokio::test]
async fn contact_create_and_tag_merge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/contacts"))
        .and(body_partial_json(json!({
            "firstName": "Tobi",
            "email": "tobi@example.com",
            "tags": ["student"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "contact": { "id": "con_2", "firstName": "Tobi", "lastName": "Okafor", "email": "tobi@example.com", "tags": ["student"] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/contacts/con_2/tags"))
        .and(body_partial_json(json!({ "tags": ["physics-intensive"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contact": { "id": "con_2", "firstName": "Tobi", "lastName": "Okafor", "email": "tobi@example.com", "tags": ["student", "physics-intensive"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let crm = client(&server);
    let created = crm
        .create_contact(&NewContact {
            first_name: "Tobi".into(),
            last_name: "Okafor".into(),
            email: "tobi@example.com".into(),
            phone: None,
            tags: vec!["student".into()],
            custom_fields: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(created.id, "con_2");

    let tagged = crm
        .add_contact_tags("con_2", &["physics-intensive".to_string()])
        .await
        .unwrap();
    assert!(tagged.has_tag("physics-intensive"));
    assert!(tagged.has_tag("student"));
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/workshop_offerings/records/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .search_records(RecordKind::Offering, &[])
        .await
        .unwrap_err();
    assert_matches!(err, CrmError::Decode(_));
}

#[tokio::test]
async fn record_ids_stay_inside_their_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/objects/workshop_bookings/records/rec_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "record": { "id": "rec_1", "properties": { "bookingId": "BK-1-A" } }
        })))
        .expect(0)
        .mount(&server)
        .await;

    let crm = client(&server);
    let found = crm
        .get_record(
            RecordKind::Offering,
            "../../workshop_bookings/records/rec_1",
        )
        .await
        .unwrap();
    assert!(found.is_none());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.path(),
        "/v1/objects/workshop_offerings/records/..%2F..%2Fworkshop_bookings%2Frecords%2Frec_1"
    );

    for id in ["..", ".", " "] {
        assert!(crm.get_record(RecordKind::Offering, id).await.unwrap().is_none());
        assert_matches!(
            crm.update_record(RecordKind::Booking, id, Default::default())
                .await
                .unwrap_err(),
            CrmError::NotFound(_)
        );
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
