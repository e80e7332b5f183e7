//! Event entities (database row mappings).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use domain::models::{EventGuest, EventPerson, RsvpStatus};

/// Database row mapping for the events table, with the guest count.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
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
    pub num_guests: i64,
}

impl EventEntity {
    /// Splits the row into the domain event and its guest count.
    pub fn into_parts(self) -> (domain::models::Event, i64) {
        let num_guests = self.num_guests;
        let event = domain::models::Event {
            id: self.id,
            name: self.name,
            description: self.description,
            location: self.location,
            start_time: self.start_time,
            end_time: self.end_time,
            capacity: self.capacity,
            points_total: self.points_total,
            points_remain: self.points_remain,
            published: self.published,
            created_at: self.created_at,
        };
        (event, num_guests)
    }
}

/// An organizer row joined with the user.
#[derive(Debug, Clone, FromRow)]
pub struct EventPersonEntity {
    pub id: i64,
    pub utorid: String,
    pub name: String,
}

impl From<EventPersonEntity> for EventPerson {
    fn from(entity: EventPersonEntity) -> Self {
        Self {
            id: entity.id,
            utorid: entity.utorid,
            name: entity.name,
        }
    }
}

/// A guest row joined with the user.
#[derive(Debug, Clone, FromRow)]
pub struct EventGuestEntity {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub rsvp_status: String,
    pub attended: bool,
}

impl From<EventGuestEntity> for EventGuest {
    fn from(entity: EventGuestEntity) -> Self {
        Self {
            id: entity.id,
            utorid: entity.utorid,
            name: entity.name,
            rsvp_status: RsvpStatus::from_str(&entity.rsvp_status).unwrap_or(RsvpStatus::Invited),
            attended: entity.attended,
        }
    }
}
