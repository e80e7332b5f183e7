//! Event domain model, guest list rules and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::error::DomainError;
use crate::models::role::EventClearance;
use crate::services::ledger;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: Option<i32>,
    pub points_total: i64,
    pub points_remain: i64,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn points_awarded(&self) -> i64 {
        self.points_total - self.points_remain
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn is_full(&self, guest_count: i64) -> bool {
        self.capacity
            .map_or(false, |capacity| guest_count >= i64::from(capacity))
    }
}

/// How a guest ended up on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    /// Added by an organizer or manager.
    Invited,
    /// Registered themselves.
    Going,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Invited => "invited",
            RsvpStatus::Going => "going",
        }
    }
}

impl FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(RsvpStatus::Invited),
            "going" => Ok(RsvpStatus::Going),
            _ => Err(format!("Unknown RSVP status: {}", s)),
        }
    }
}

/// A user on an event's organizer or guest list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPerson {
    pub id: i64,
    pub utorid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGuest {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub rsvp_status: RsvpStatus,
    pub attended: bool,
}

/// Request payload for creating an event.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: String,

    #[validate(length(min = 1, max = 200, message = "Location must be 1-200 characters"))]
    pub location: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    #[validate(range(min = 1, message = "capacity must be a positive integer"))]
    pub capacity: Option<i32>,

    #[validate(range(min = 1, message = "points must be a positive integer"))]
    pub points: i64,
}

impl CreateEventRequest {
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.start_time < now {
            return Err(DomainError::invalid("Start time cannot be in the past"));
        }
        if self.end_time <= self.start_time {
            return Err(DomainError::invalid("End time must be after start time"));
        }
        Ok(())
    }
}

/// Request payload for updating an event (partial update).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Location must be 1-200 characters"))]
    pub location: Option<String>,

    pub start_time: Option<DateTime<Utc>>,

    pub end_time: Option<DateTime<Utc>>,

    #[validate(range(min = 1, message = "capacity must be a positive integer"))]
    pub capacity: Option<i32>,

    #[validate(range(min = 1, message = "points must be a positive integer"))]
    pub points: Option<i64>,

    pub published: Option<bool>,
}

/// Column values to write for an event update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub points_total: Option<i64>,
    pub points_remain: Option<i64>,
    pub published: Option<bool>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        *self == EventChanges::default()
    }
}

fn differs<T: PartialEq>(new: &Option<T>, current: &T) -> bool {
    new.as_ref().map_or(false, |value| value != current)
}

fn changed<T: PartialEq>(new: Option<T>, current: &T) -> Option<T> {
    new.filter(|value| value != current)
}

/// Checks an event update and computes the resulting column values.
///
/// `guest_count` is the current number of guests, used to keep the capacity
/// above the guest list. Point pool changes go through
/// [`ledger::adjust_event_pool`].
pub fn plan_event_update(
    clearance: EventClearance,
    current: &Event,
    guest_count: i64,
    req: UpdateEventRequest,
    now: DateTime<Utc>,
) -> Result<EventChanges, DomainError> {
    if (req.points.is_some() || req.published.is_some()) && !clearance.is_manager() {
        return Err(DomainError::forbidden(
            "Only managers can change points or publish events",
        ));
    }
    if req.published == Some(false) {
        return Err(DomainError::invalid("published can only be set to true"));
    }

    if current.has_started(now)
        && (differs(&req.name, &current.name)
            || differs(&req.description, &current.description)
            || differs(&req.location, &current.location)
            || differs(&req.start_time, &current.start_time)
            || (req.capacity.is_some() && req.capacity != current.capacity))
    {
        return Err(DomainError::invalid(
            "Cannot update name, description, location, start time or capacity after the event has started",
        ));
    }
    if current.has_ended(now) && differs(&req.end_time, &current.end_time) {
        return Err(DomainError::invalid(
            "Cannot update end time after the event has ended",
        ));
    }

    let start_time = changed(req.start_time, &current.start_time);
    let end_time = changed(req.end_time, &current.end_time);

    if start_time.map_or(false, |t| t < now) || end_time.map_or(false, |t| t < now) {
        return Err(DomainError::invalid("Event times cannot be in the past"));
    }
    if end_time.unwrap_or(current.end_time) <= start_time.unwrap_or(current.start_time) {
        return Err(DomainError::invalid("End time must be after start time"));
    }

    let capacity = req.capacity.filter(|c| Some(*c) != current.capacity);
    if let Some(capacity) = capacity {
        if i64::from(capacity) < guest_count {
            return Err(DomainError::invalid(format!(
                "Capacity cannot be below the {} confirmed guests",
                guest_count
            )));
        }
    }

    let (points_total, points_remain) = match changed(req.points, &current.points_total) {
        Some(total) => {
            let remain = ledger::adjust_event_pool(current.points_total, current.points_remain, total)?;
            (Some(total), Some(remain))
        }
        None => (None, None),
    };

    Ok(EventChanges {
        name: changed(req.name, &current.name),
        description: changed(req.description, &current.description),
        location: changed(req.location, &current.location),
        start_time,
        end_time,
        capacity,
        points_total,
        points_remain,
        published: changed(req.published, &current.published),
    })
}

/// Published events cannot be deleted.
pub fn check_event_delete(event: &Event) -> Result<(), DomainError> {
    if event.published {
        Err(DomainError::invalid("Cannot delete a published event"))
    } else {
        Ok(())
    }
}

/// Checks that a user may be put on the guest list.
pub fn check_add_guest(
    event: &Event,
    guest_count: i64,
    is_organizer: bool,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    if event.has_ended(now) {
        return Err(DomainError::gone("Event has ended"));
    }
    if event.is_full(guest_count) {
        return Err(DomainError::gone("Event is full"));
    }
    if is_organizer {
        return Err(DomainError::invalid(
            "User is an organizer of this event and cannot be a guest",
        ));
    }
    Ok(())
}

/// Checks that a user may be made an organizer.
pub fn check_add_organizer(event: &Event, is_guest: bool, now: DateTime<Utc>) -> Result<(), DomainError> {
    if event.has_ended(now) {
        return Err(DomainError::gone("Event has ended"));
    }
    if is_guest {
        return Err(DomainError::invalid(
            "User is a guest of this event; remove them as a guest first",
        ));
    }
    Ok(())
}

/// A guest can only withdraw their RSVP before the event ends.
pub fn check_withdraw_rsvp(event: &Event, now: DateTime<Utc>) -> Result<(), DomainError> {
    if event.has_ended(now) {
        Err(DomainError::gone("Event has ended"))
    } else {
        Ok(())
    }
}

/// Body of `POST /events/:eventId/organizers` and `POST /events/:eventId/guests`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddPersonRequest {
    #[validate(custom(function = "shared::validation::validate_utorid"))]
    pub utorid: String,
}

/// Body of `PATCH /events/:eventId/guests/:userId`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceRequest {
    pub attended: bool,
}

/// Event representation in API responses.
///
/// Pool and publication fields are only filled in for organizers and
/// managers; guest lists only on single-event reads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: Option<i32>,
    pub num_guests: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_remain: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizers: Option<Vec<EventPerson>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guests: Option<Vec<EventGuest>>,
}

impl EventResponse {
    pub fn new(event: Event, num_guests: i64, privileged: bool) -> Self {
        let points_awarded = event.points_awarded();
        Self {
            id: event.id,
            name: event.name,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            capacity: event.capacity,
            num_guests,
            points_remain: privileged.then_some(event.points_remain),
            points_awarded: privileged.then_some(points_awarded),
            published: privileged.then_some(event.published),
            organizers: None,
            guests: None,
        }
    }

    pub fn with_organizers(mut self, organizers: Vec<EventPerson>) -> Self {
        self.organizers = Some(organizers);
        self
    }

    pub fn with_guests(mut self, guests: Vec<EventGuest>) -> Self {
        self.guests = Some(guests);
        self
    }
}
