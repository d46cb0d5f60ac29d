//! Registration, login, profile and address book.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, shipping_address, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

async fn register(app: &TestApp, email: &str, password: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/api/auth/register",
        Some(json!({
            "name": "Kavya Rao",
            "email": email,
            "password": password
        })),
        None,
    )
    .await
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new().await;

    let response = register(&app, "Kavya@Example.com", "sculpt2026").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["email"], "kavya@example.com");
    assert_eq!(body["data"]["user"]["role"], "customer");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let login = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "kavya@example.com", "password": "sculpt2026" })),
            None,
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let token = response_json(login).await["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let profile = app
        .request(Method::GET, "/api/user/profile", None, Some(&token))
        .await;
    assert_eq!(profile.status(), StatusCode::OK);
    assert_eq!(response_json(profile).await["data"]["name"], "Kavya Rao");
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new().await;
    assert_eq!(register(&app, "dup@example.com", "sculpt2026").await.status(), StatusCode::CREATED);
    assert_eq!(register(&app, "DUP@example.com", "sculpt2026").await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_password_is_rejected() {
    let app = TestApp::new().await;
    let response = register(&app, "weak@example.com", "password").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    register(&app, "login@example.com", "sculpt2026").await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "login@example.com", "password": "sculpt2027" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new().await;

    let anonymous = app.request(Method::GET, "/api/user/profile", None, None).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(Method::GET, "/api/user/profile", None, Some("not.a.jwt"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let app = TestApp::new().await;
    let body = response_json(register(&app, "change@example.com", "sculpt2026").await).await;
    let token = body["data"]["access_token"].as_str().unwrap().to_string();

    let without = app
        .request(
            Method::PUT,
            "/api/user/profile",
            Some(json!({ "new_password": "chisel2027" })),
            Some(&token),
        )
        .await;
    assert_ne!(without.status(), StatusCode::OK);

    let with = app
        .request(
            Method::PUT,
            "/api/user/profile",
            Some(json!({ "current_password": "sculpt2026", "new_password": "chisel2027" })),
            Some(&token),
        )
        .await;
    assert_eq!(with.status(), StatusCode::OK);

    let login = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "change@example.com", "password": "chisel2027" })),
            None,
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
}

#[tokio::test]
async fn address_book_keeps_exactly_one_default() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;

    let mut home = shipping_address();
    home["label"] = json!("Home");
    let first = response_json(
        app.request(Method::POST, "/api/user/addresses", Some(home), Some(&token))
            .await,
    )
    .await;
    assert_eq!(first["data"][0]["is_default"], true);

    let mut office = shipping_address();
    office["label"] = json!("Office");
    office["city"] = json!("Udaipur");
    office["is_default"] = json!(true);
    let second = response_json(
        app.request(Method::POST, "/api/user/addresses", Some(office), Some(&token))
            .await,
    )
    .await;
    let book = second["data"].as_array().unwrap();
    assert_eq!(book.len(), 2);
    assert_eq!(book.iter().filter(|a| a["is_default"] == true).count(), 1);
    let office_id = book
        .iter()
        .find(|a| a["label"] == "Office")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        book.iter().find(|a| a["is_default"] == true).unwrap()["id"],
        office_id.as_str()
    );

    let after_delete = response_json(
        app.request(
            Method::DELETE,
            &format!("/api/user/addresses/{}", office_id),
            None,
            Some(&token),
        )
        .await,
    )
    .await;
    let book = after_delete["data"].as_array().unwrap();
    assert_eq!(book.len(), 1);
    assert_eq!(book[0]["is_default"], true);
}

#[tokio::test]
async fn checkout_falls_back_to_default_address() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Coasters", dec!(700)).await;

    app.request(Method::POST, "/api/user/addresses", Some(shipping_address()), Some(&token))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "payment_method": "cod"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order"]["shipping_address"]["city"], "Jaipur");
}

#[tokio::test]
async fn wishlist_add_and_remove() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Onyx Candle Holder", dec!(1100)).await;
    let uri = format!("/api/user/wishlist/{}", product.id);

    let added = response_json(app.request(Method::POST, &uri, None, Some(&token)).await).await;
    assert_eq!(added["data"].as_array().unwrap().len(), 1);

    // adding twice keeps a single entry
    let again = response_json(app.request(Method::POST, &uri, None, Some(&token)).await).await;
    assert_eq!(again["data"].as_array().unwrap().len(), 1);

    let removed = response_json(app.request(Method::DELETE, &uri, None, Some(&token)).await).await;
    assert!(removed["data"].as_array().unwrap().is_empty());
}
