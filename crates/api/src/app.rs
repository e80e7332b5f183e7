use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use shared::jwt::{JwtConfig, JwtError};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, reset_rate_limit, trace_id, RateLimiterState,
};
use crate::routes::{auth, events, health, promotions, transactions, users};
use crate::services::{AuthService, EmailService};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtConfig,
    pub email: EmailService,
    pub reset_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Result<Self, JwtError> {
        let jwt = JwtConfig::with_leeway(
            &config.jwt.secret,
            config.jwt.token_expiry_secs,
            config.jwt.leeway_secs,
        )?;
        let reset_limiter =
            RateLimiterState::new(config.security.reset_rate_limit_per_minute).map(Arc::new);
        let email = EmailService::new(config.email.clone());

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt,
            email,
            reset_limiter,
        })
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.pool.clone(), self.jwt.clone(), &self.config.ledger)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        // Development default.
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_app(config: Config, pool: PgPool) -> Result<Router, JwtError> {
    let state = AppState::new(config, pool)?;
    let config = state.config.clone();

    let auth_routes = Router::new()
        .route("/auth/tokens", post(auth::login).delete(auth::logout))
        .route(
            "/auth/resets",
            post(auth::request_reset).route_layer(middleware::from_fn_with_state(
                state.clone(),
                reset_rate_limit,
            )),
        )
        .route("/auth/resets/:reset_token", post(auth::complete_reset));

    let user_routes = Router::new()
        .route("/users", post(users::register_user).get(users::list_users))
        .route("/users/me", get(users::get_me).patch(users::update_me))
        .route("/users/me/password", patch(users::change_password))
        .route(
            "/users/me/transactions",
            post(users::create_redemption).get(users::list_my_transactions),
        )
        .route("/users/:user_id", get(users::get_user).patch(users::update_user))
        .route("/users/:user_id/transactions", post(users::create_transfer));

    let transaction_routes = Router::new()
        .route(
            "/transactions",
            post(transactions::create_transaction).get(transactions::list_transactions),
        )
        .route("/transactions/:id", get(transactions::get_transaction))
        .route(
            "/transactions/:id/suspicious",
            patch(transactions::set_suspicious),
        )
        .route(
            "/transactions/:id/processed",
            patch(transactions::set_processed),
        );

    let event_routes = Router::new()
        .route("/events", post(events::create_event).get(events::list_events))
        .route(
            "/events/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/organizers", post(events::add_organizer))
        .route(
            "/events/:id/organizers/:user_id",
            delete(events::remove_organizer),
        )
        .route("/events/:id/guests", post(events::add_guest))
        .route(
            "/events/:id/guests/me",
            post(events::rsvp).delete(events::withdraw_rsvp),
        )
        .route(
            "/events/:id/guests/:user_id",
            patch(events::mark_attendance).delete(events::remove_guest),
        )
        .route("/events/:id/transactions", post(events::award_points));

    let promotion_routes = Router::new()
        .route(
            "/promotions",
            post(promotions::create_promotion).get(promotions::list_promotions),
        )
        .route(
            "/promotions/:id",
            get(promotions::get_promotion)
                .patch(promotions::update_promotion)
                .delete(promotions::delete_promotion),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Ok(Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(user_routes)
        .merge(transaction_routes)
        .merge(event_routes)
        .merge(promotion_routes)
        // Bottom layers run first.
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config.security.cors_origins))
        .with_state(state))
}
