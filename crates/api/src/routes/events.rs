//! Event routes: scheduling, organizer and guest lists, attendance and
//! point awards.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use domain::models::event::{
    check_withdraw_rsvp, plan_event_update, AddPersonRequest, AttendanceRequest,
    CreateEventRequest, EventResponse, UpdateEventRequest,
};
use domain::models::transaction::{expect_kind, EventAwardRequest, TransactionResponse};
use domain::models::{
    Event, EventClearance, EventGuest, EventPerson, Role, RsvpStatus, Transaction,
    TransactionType, User,
};
use persistence::repositories::{EventFilter, EventRepository, TransactionRepository, UserRepository};
use shared::pagination::Paginated;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::routes::{check_time_filters, page};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub name: Option<String>,
    pub location: Option<String>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
    pub show_full: Option<bool>,
    pub published: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListEventsQuery {
    /// Regular users and cashiers only ever see published events.
    fn filter(self, role: Role) -> Result<EventFilter, ApiError> {
        check_time_filters(self.started, self.ended)?;
        let published = if role.has_at_least(Role::Manager) {
            self.published
        } else {
            Some(true)
        };
        Ok(EventFilter {
            name: self.name,
            location: self.location,
            started: self.started,
            ended: self.ended,
            published,
            show_full: self.show_full.unwrap_or(false),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizersResponse {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub organizers: Vec<EventPerson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAddedResponse {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub guest_added: EventGuest,
    pub num_guests: i64,
}

/// Result of an event award: one transaction for a named guest, otherwise
/// one per attended guest.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AwardResponse {
    Single(TransactionResponse),
    Many(Vec<TransactionResponse>),
}

async fn load_event(events: &EventRepository, id: i64) -> Result<(Event, i64), ApiError> {
    events
        .find_by_id(id)
        .await?
        .map(|e| e.into_parts())
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))
}

async fn load_user_by_utorid(pool: &sqlx::PgPool, utorid: &str) -> Result<User, ApiError> {
    UserRepository::new(pool.clone())
        .find_by_utorid(utorid)
        .await?
        .map(User::from)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

async fn clearance_for(
    events: &EventRepository,
    event_id: i64,
    actor: &CurrentUser,
) -> Result<EventClearance, ApiError> {
    let is_organizer = if actor.role().has_at_least(Role::Manager) {
        false
    } else {
        events.is_organizer(event_id, actor.id()).await?
    };
    Ok(EventClearance::for_user(actor.role(), is_organizer))
}

fn require_clearance(clearance: EventClearance, required: EventClearance) -> Result<(), ApiError> {
    if clearance.has_at_least(required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Insufficient clearance for this event".to_string(),
        ))
    }
}

/// POST /events
pub async fn create_event(
    State(state): State<AppState>,
    actor: CurrentUser,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    actor.require(Role::Manager)?;
    request.validate()?;
    request.check_window(Utc::now())?;

    let (event, num_guests) = EventRepository::new(state.pool.clone())
        .create(&request)
        .await?
        .into_parts();

    tracing::info!(event_id = event.id, created_by = actor.id(), "Event created");
    Ok((
        StatusCode::CREATED,
        Json(EventResponse::new(event, num_guests, true).with_organizers(Vec::new())),
    ))
}

/// GET /events
pub async fn list_events(
    State(state): State<AppState>,
    actor: CurrentUser,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Paginated<EventResponse>>, ApiError> {
    let page = page(query.page, query.limit)?;
    let privileged = actor.role().has_at_least(Role::Manager);
    let filter = query.filter(actor.role())?;
    let now = Utc::now();

    let events = EventRepository::new(state.pool.clone());
    let count = events.count(&filter, now).await?;
    let results = events
        .list(&filter, now, page.limit, page.offset())
        .await?
        .into_iter()
        .map(|e| {
            let (event, num_guests) = e.into_parts();
            EventResponse::new(event, num_guests, privileged)
        })
        .collect();

    Ok(Json(Paginated::new(count, results)))
}

/// GET /events/:id
///
/// Organizers and managers also get the pool figures and guest list.
pub async fn get_event(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<EventResponse>, ApiError> {
    let events = EventRepository::new(state.pool.clone());
    let (event, num_guests) = load_event(&events, id).await?;
    let clearance = clearance_for(&events, id, &actor).await?;
    let privileged = clearance.has_at_least(EventClearance::Organizer);

    if !event.published && !privileged {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }

    let organizers = events
        .list_organizers(id)
        .await?
        .into_iter()
        .map(EventPerson::from)
        .collect();
    let mut response = EventResponse::new(event, num_guests, privileged).with_organizers(organizers);

    if privileged {
        let guests = events
            .list_guests(id)
            .await?
            .into_iter()
            .map(EventGuest::from)
            .collect();
        response = response.with_guests(guests);
    }

    Ok(Json(response))
}

/// PATCH /events/:id
pub async fn update_event(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<EventResponse>, ApiError> {
    request.validate()?;
    let events = EventRepository::new(state.pool.clone());
    load_event(&events, id).await?;
    let clearance = clearance_for(&events, id, &actor).await?;
    require_clearance(clearance, EventClearance::Organizer)?;

    let now = Utc::now();
    let (event, num_guests) = events
        .update_locked(id, |current, guest_count| {
            plan_event_update(clearance, current, guest_count, request, now)
        })
        .await?
        .into_parts();

    tracing::info!(event_id = id, updated_by = actor.id(), "Event updated");
    Ok(Json(EventResponse::new(event, num_guests, true)))
}

/// DELETE /events/:id
pub async fn delete_event(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    actor.require(Role::Manager)?;
    EventRepository::new(state.pool.clone()).delete(id).await?;
    tracing::info!(event_id = id, deleted_by = actor.id(), "Event deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /events/:id/organizers
pub async fn add_organizer(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<AddPersonRequest>,
) -> Result<(StatusCode, Json<OrganizersResponse>), ApiError> {
    actor.require(Role::Manager)?;
    request.validate()?;

    let events = EventRepository::new(state.pool.clone());
    let (event, _) = load_event(&events, id).await?;
    let user = load_user_by_utorid(&state.pool, &request.utorid).await?;

    if events.is_organizer(id, user.id).await? {
        return Err(ApiError::Validation(
            "User is already an organizer of this event".to_string(),
        ));
    }
    events.add_organizer(id, user.id, Utc::now()).await?;

    let organizers = events
        .list_organizers(id)
        .await?
        .into_iter()
        .map(EventPerson::from)
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(OrganizersResponse {
            id: event.id,
            name: event.name,
            location: event.location,
            organizers,
        }),
    ))
}

/// DELETE /events/:id/organizers/:user_id
pub async fn remove_organizer(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    actor.require(Role::Manager)?;
    let events = EventRepository::new(state.pool.clone());
    load_event(&events, id).await?;

    if !events.remove_organizer(id, user_id).await? {
        return Err(ApiError::NotFound(
            "User is not an organizer of this event".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_guest_list(
    events: &EventRepository,
    event: Event,
    user: &User,
    status: RsvpStatus,
) -> Result<GuestAddedResponse, ApiError> {
    if events.is_guest(event.id, user.id).await? {
        return Err(ApiError::Validation(
            "User is already a guest of this event".to_string(),
        ));
    }

    let guest = events
        .add_guest(event.id, user.id, status, Utc::now())
        .await?;
    let (_, num_guests) = load_event(events, event.id).await?;

    tracing::info!(event_id = event.id, user_id = user.id, rsvp = status.as_str(), "Guest added");
    Ok(GuestAddedResponse {
        id: event.id,
        name: event.name,
        location: event.location,
        guest_added: guest.into(),
        num_guests,
    })
}

/// POST /events/:id/guests
pub async fn add_guest(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<AddPersonRequest>,
) -> Result<(StatusCode, Json<GuestAddedResponse>), ApiError> {
    request.validate()?;
    let events = EventRepository::new(state.pool.clone());
    let (event, _) = load_event(&events, id).await?;
    let clearance = clearance_for(&events, id, &actor).await?;
    require_clearance(clearance, EventClearance::Organizer)?;

    if !event.published && !clearance.is_manager() {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }
    let user = load_user_by_utorid(&state.pool, &request.utorid).await?;

    let response = add_to_guest_list(&events, event, &user, RsvpStatus::Invited).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /events/:id/guests/:user_id
pub async fn remove_guest(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    actor.require(Role::Manager)?;
    let events = EventRepository::new(state.pool.clone());
    load_event(&events, id).await?;

    if !events.remove_guest(id, user_id).await? {
        return Err(ApiError::NotFound(
            "User is not a guest of this event".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /events/:id/guests/me
pub async fn rsvp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<GuestAddedResponse>), ApiError> {
    let events = EventRepository::new(state.pool.clone());
    let (event, _) = load_event(&events, id).await?;
    if !event.published {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }

    let response = add_to_guest_list(&events, event, &user.0, RsvpStatus::Going).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /events/:id/guests/me
pub async fn withdraw_rsvp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let events = EventRepository::new(state.pool.clone());
    let (event, _) = load_event(&events, id).await?;
    check_withdraw_rsvp(&event, Utc::now())?;

    if !events.remove_guest(id, user.id()).await? {
        return Err(ApiError::NotFound(
            "You are not a guest of this event".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /events/:id/guests/:user_id
pub async fn mark_attendance(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(request): Json<AttendanceRequest>,
) -> Result<Json<EventGuest>, ApiError> {
    let events = EventRepository::new(state.pool.clone());
    load_event(&events, id).await?;
    let clearance = clearance_for(&events, id, &actor).await?;
    require_clearance(clearance, EventClearance::Organizer)?;

    let guest = events
        .set_attended(id, user_id, request.attended)
        .await?
        .ok_or_else(|| ApiError::NotFound("User is not a guest of this event".to_string()))?;
    Ok(Json(guest.into()))
}

/// POST /events/:id/transactions
pub async fn award_points(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<EventAwardRequest>,
) -> Result<(StatusCode, Json<AwardResponse>), ApiError> {
    request.validate()?;
    expect_kind(&request.kind, TransactionType::Event)?;

    let events = EventRepository::new(state.pool.clone());
    load_event(&events, id).await?;
    let clearance = clearance_for(&events, id, &actor).await?;
    require_clearance(clearance, EventClearance::Organizer)?;

    let entities = TransactionRepository::new(state.pool.clone())
        .award_event_points(
            id,
            actor.id(),
            request.utorid.as_deref(),
            request.amount,
            request.remark.as_deref().unwrap_or_default(),
        )
        .await?;

    tracing::info!(
        event_id = id,
        recipients = entities.len(),
        amount = request.amount,
        awarded_by = actor.id(),
        "Event points awarded"
    );

    let mut responses: Vec<TransactionResponse> = entities
        .into_iter()
        .map(|e| Transaction::from(e).into())
        .collect();
    let body = match (request.utorid.is_some(), responses.len()) {
        (true, 1) => AwardResponse::Single(responses.remove(0)),
        _ => AwardResponse::Many(responses),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(value: serde_json::Value) -> ListEventsQuery {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_regular_filter_forces_published() {
        let filter = query(serde_json::json!({"published": false, "showFull": true}))
            .filter(Role::Regular)
            .unwrap();
        assert_eq!(filter.published, Some(true));
        assert!(filter.show_full);
    }

    #[test]
    fn test_manager_filter_keeps_published() {
        let filter = query(serde_json::json!({"published": false}))
            .filter(Role::Manager)
            .unwrap();
        assert_eq!(filter.published, Some(false));
        assert!(!filter.show_full);

        let filter = query(serde_json::json!({})).filter(Role::Superuser).unwrap();
        assert_eq!(filter.published, None);
    }

    #[test]
    fn test_started_and_ended_rejected() {
        let result = query(serde_json::json!({"started": true, "ended": false})).filter(Role::Manager);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_require_clearance() {
        assert!(require_clearance(EventClearance::Organizer, EventClearance::Organizer).is_ok());
        assert!(require_clearance(EventClearance::Manager, EventClearance::Organizer).is_ok());
        assert!(matches!(
            require_clearance(EventClearance::Regular, EventClearance::Organizer),
            Err(ApiError::Forbidden(_))
        ));
    }
}
