//! Common test utilities for integration tests.
//!
//! Tests run against the PostgreSQL database named by `TEST_DATABASE_URL`
//! and return early when it is unset. Every fixture uses fresh utorids so
//! tests can share the database and run in parallel.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use auraclub_api::{app::create_app, config::Config};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use domain::models::Role;
use fake::{faker::name::en::Name, Fake};
use persistence::repositories::UserRepository;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "Test#Pass1";

/// Connect to the test database, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn create_test_pool() -> Option<PgPool> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    persistence::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

pub fn test_config(pool_url: &str) -> Config {
    Config::load_for_test(&[("database.url", pool_url)]).expect("Failed to build test config")
}

pub fn create_test_app(config: Config, pool: PgPool) -> Router {
    create_app(config, pool).expect("Failed to build app")
}

/// Pool plus a router wired to it.
pub async fn setup() -> Option<(Router, PgPool)> {
    let pool = create_test_pool().await?;
    let url = std::env::var("TEST_DATABASE_URL").unwrap_or_default();
    let app = create_test_app(test_config(&url), pool.clone());
    Some((app, pool))
}

/// An 8-character utorid that no other test uses.
pub fn unique_utorid() -> String {
    format!("t{}", &uuid::Uuid::new_v4().simple().to_string()[..7])
}

pub fn uoft_email(utorid: &str) -> String {
    format!("{}@mail.utoronto.ca", utorid)
}

pub fn fake_name() -> String {
    let name: String = Name().fake();
    name.chars().take(50).collect()
}

/// A logged-in user created for one test.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: i64,
    pub utorid: String,
    pub token: String,
}

/// Create a verified user with `role` and log them in through the API.
pub async fn create_user(app: &Router, pool: &PgPool, role: Role) -> TestUser {
    let utorid = unique_utorid();
    let hash = shared::password::hash_password(TEST_PASSWORD).expect("hash");
    let entity = UserRepository::new(pool.clone())
        .create_with_role(&utorid, &fake_name(), &uoft_email(&utorid), role, &hash)
        .await
        .expect("Failed to create test user");

    let token = login(app, &utorid, TEST_PASSWORD).await;
    TestUser {
        id: entity.id,
        utorid,
        token,
    }
}

pub async fn login(app: &Router, utorid: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/auth/tokens",
            serde_json::json!({ "utorid": utorid, "password": password }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("token").to_string()
}

pub async fn set_points(pool: &PgPool, user_id: i64, points: i64) {
    sqlx::query("UPDATE users SET points = $2 WHERE id = $1")
        .bind(user_id)
        .bind(points)
        .execute(pool)
        .await
        .expect("Failed to set points");
}

pub async fn set_verified(pool: &PgPool, user_id: i64, verified: bool) {
    sqlx::query("UPDATE users SET verified = $2 WHERE id = $1")
        .bind(user_id)
        .bind(verified)
        .execute(pool)
        .await
        .expect("Failed to set verified");
}

pub async fn points_of(pool: &PgPool, user_id: i64) -> i64 {
    let (points,): (i64,) = sqlx::query_as("SELECT points FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read points");
    points
}

/// Insert a promotion whose window is already open.
///
/// The API only accepts future start times, so fixtures go straight to the
/// table. The window closes after a minute so leftovers from earlier runs
/// stop applying.
pub async fn insert_active_promotion(
    pool: &PgPool,
    kind: &str,
    min_spending: Option<f64>,
    rate: Option<f64>,
    points: i64,
) -> i64 {
    let now = Utc::now();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO promotions (name, description, kind, start_time, end_time, min_spending, rate, points)
        VALUES ($1, 'fixture', $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(format!("Fixture {}", unique_utorid()))
    .bind(kind)
    .bind(now - Duration::minutes(1))
    .bind(now + Duration::minutes(1))
    .bind(min_spending)
    .bind(rate)
    .bind(points)
    .fetch_one(pool)
    .await
    .expect("Failed to insert promotion");
    id
}

/// Insert an event with a fixed window relative to now.
pub async fn insert_event(
    pool: &PgPool,
    start_offset: Duration,
    end_offset: Duration,
    points: i64,
    capacity: Option<i32>,
    published: bool,
) -> i64 {
    let now = Utc::now();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO events (name, description, location, start_time, end_time, capacity,
                            points_total, points_remain, published)
        VALUES ($1, 'fixture', 'BA 1160', $2, $3, $4, $5, $5, $6)
        RETURNING id
        "#,
    )
    .bind(format!("Event {}", unique_utorid()))
    .bind(now + start_offset)
    .bind(now + end_offset)
    .bind(capacity)
    .bind(points)
    .bind(published)
    .fetch_one(pool)
    .await
    .expect("Failed to insert event");
    id
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn get(uri: &str, token: &str) -> Request<Body> {
    empty_request(Method::GET, uri, Some(token))
}

/// Run one request and parse the body as JSON (`Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
