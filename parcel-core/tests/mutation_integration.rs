//! Mutations and form modals driving real requests
//!
//! Checks invalidation fan-out (create package refetches the client list and
//! the stats exactly once) and the address dialog's 422 / 2xx handling.

mod common;

use common::{context_for, count_requests, ok, ok_message};
use parcel_core::api::keys;
use parcel_core::forms::validate_address;
use parcel_core::models::{AddressForm, AdminStats, Client, NewPackage};
use parcel_core::{mutations, ErrorKind, FormModal, NoticeVariant, QueryOptions, Subscription};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn address_form() -> AddressForm {
    AddressForm {
        name: "Office".to_string(),
        street: "100 Gulan St".to_string(),
        city: "Erbil".to_string(),
        state: "Erbil".to_string(),
        postal_code: "44001".to_string(),
        phone: "07500000000".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_package_refetches_clients_and_stats_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/clients"))
        .respond_with(ok(json!([
            { "id": 12, "name": "Ana", "email": "ana@example.com", "total_packages": 1 }
        ])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin/stats"))
        .respond_with(ok(json!({ "total_clients": 1, "active_shipments": 1, "total_revenue": 40.0 })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin/packages"))
        .and(body_partial_json(json!({ "client_id": 12, "description": "Sneakers" })))
        .respond_with(ok_message(json!({ "id": 99 }), "Package created"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let api = ctx.api.clone();
    let mut clients: Subscription<Vec<Client>> = ctx.queries.subscribe(
        keys::key(keys::ADMIN_CLIENTS),
        move || {
            let api = api.clone();
            async move { api.admin_clients(None).await }
        },
        QueryOptions::default(),
    );
    let api = ctx.api.clone();
    let mut stats: Subscription<AdminStats> = ctx.queries.subscribe(
        keys::key(keys::ADMIN_STATS),
        move || {
            let api = api.clone();
            async move { api.admin_stats().await }
        },
        QueryOptions::default(),
    );
    assert_eq!(clients.settled().await.data.unwrap()[0].id, 12);
    assert_eq!(stats.settled().await.data.unwrap().total_clients, 1);

    let create = mutations::create_package(&ctx.api, &ctx.queries);
    let package = NewPackage {
        description: "Sneakers".to_string(),
        weight: 2.0,
        price: 40.0,
        country: "Turkey".to_string(),
        shipping_method: "air".to_string(),
        status: "pending".to_string(),
        ..Default::default()
    };
    let envelope = create.mutate((12, package)).await.unwrap();
    assert_eq!(envelope.message.as_deref(), Some("Package created"));

    assert!(clients.settled().await.error.is_none());
    assert!(stats.settled().await.error.is_none());
    tokio::time::sleep(Duration::from_millis(200)).await;

    server.verify().await;
}

#[tokio::test]
async fn test_failed_mutation_does_not_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/clients"))
        .respond_with(ok(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin/notifications"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Mailer down" })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let api = ctx.api.clone();
    let mut clients: Subscription<Vec<Client>> = ctx.queries.subscribe(
        keys::key(keys::ADMIN_CLIENTS),
        move || {
            let api = api.clone();
            async move { api.admin_clients(None).await }
        },
        QueryOptions::default(),
    );
    clients.settled().await;

    let send = mutations::send_notification(&ctx.api, &ctx.queries);
    let err = send.mutate((12, "Your parcel arrived".to_string())).await.unwrap_err();
    assert_eq!(err.user_message("Failed to send notification"), "Mailer down");

    tokio::time::sleep(Duration::from_millis(200)).await;
    server.verify().await;
}

#[tokio::test]
async fn test_address_modal_422_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/addresses"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "The given data was invalid.",
            "errors": {
                "postal_code": ["The postal code format is invalid."],
                "phone": ["The phone must be 11 digits.", "The phone is already taken."]
            }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/addresses"))
        .respond_with(ok_message(
            json!({
                "id": 5, "name": "Office", "street": "100 Gulan St", "city": "Erbil",
                "country": "Iraq", "type": "work", "is_default": false
            }),
            "Address created successfully",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/addresses"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    let api = ctx.api.clone();
    let mut list: Subscription<Vec<parcel_core::models::Address>> = ctx.queries.subscribe(
        keys::key(keys::ADDRESSES),
        move || {
            let api = api.clone();
            async move { api.addresses().await }
        },
        QueryOptions::default(),
    );
    list.settled().await;

    let create = mutations::create_address(&ctx.api, &ctx.queries);
    let mut modal = FormModal::<AddressForm>::new("Address created successfully", "Failed to create address")
        .with_validator(validate_address);
    modal.open_with(address_form());

    let err = modal.submit(&create).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(modal.is_open());
    assert_eq!(modal.values(), &address_form());
    assert_eq!(modal.field_error("postal_code").unwrap().len(), 1);
    assert_eq!(modal.field_error("phone").unwrap().len(), 2);
    assert_eq!(count_requests(&server, "GET", "/api/addresses").await, 1);

    let envelope = modal.submit(&create).await.unwrap();
    assert_eq!(envelope.data.id, 5);
    assert!(!modal.is_open());
    assert_eq!(modal.values(), &AddressForm::default());
    assert!(modal.errors().is_empty());
    let notice = modal.take_notice().unwrap();
    assert_eq!(notice.variant, NoticeVariant::Success);
    assert_eq!(notice.description, "Address created successfully");

    list.settled().await;
    assert_eq!(count_requests(&server, "GET", "/api/addresses").await, 2);
    server.verify().await;
}
