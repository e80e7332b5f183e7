//! Event repository: events, organizers and guest lists.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};

use domain::models::event::{self, CreateEventRequest, EventChanges};
use domain::models::{Event, RsvpStatus};
use domain::DomainError;

use crate::entities::{EventEntity, EventGuestEntity, EventPersonEntity};
use crate::error::RepositoryError;
use crate::metrics::QueryTimer;

const EVENT_COLUMNS: &str = "e.id, e.name, e.description, e.location, e.start_time, e.end_time, \
     e.capacity, e.points_total, e.points_remain, e.published, e.created_at, \
     (SELECT COUNT(*) FROM event_guests g WHERE g.event_id = e.id) AS num_guests";

const EVENT_FILTER: &str = r#"
    ($1::text IS NULL OR e.name ILIKE '%' || $1 || '%')
    AND ($2::text IS NULL OR e.location ILIKE '%' || $2 || '%')
    AND ($3::bool IS NULL OR (e.start_time <= $7) = $3)
    AND ($4::bool IS NULL OR (e.end_time <= $7) = $4)
    AND ($5::bool IS NULL OR e.published = $5)
    AND ($6 OR e.capacity IS NULL
         OR (SELECT COUNT(*) FROM event_guests g WHERE g.event_id = e.id) < e.capacity)
"#;

/// Filters for the event listing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub name: Option<String>,
    pub location: Option<String>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
    pub published: Option<bool>,
    /// Include events whose guest list is at capacity.
    pub show_full: bool,
}

#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, req: &CreateEventRequest) -> Result<EventEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_event");
        let result = sqlx::query_as::<_, EventEntity>(
            r#"
            INSERT INTO events (name, description, location, start_time, end_time, capacity, points_total, points_remain)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id, name, description, location, start_time, end_time, capacity,
                      points_total, points_remain, published, created_at, 0::bigint AS num_guests
            "#,
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.location)
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(req.capacity)
        .bind(req.points)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_event_by_id");
        let result = sqlx::query_as::<_, EventEntity>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list(
        &self,
        filter: &EventFilter,
        now: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_events");
        let result = sqlx::query_as::<_, EventEntity>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e WHERE {EVENT_FILTER} \
             ORDER BY e.start_time, e.id LIMIT $8 OFFSET $9"
        ))
        .bind(filter.name.as_deref())
        .bind(filter.location.as_deref())
        .bind(filter.started)
        .bind(filter.ended)
        .bind(filter.published)
        .bind(filter.show_full)
        .bind(now)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count(&self, filter: &EventFilter, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_events");
        let result: Result<(i64,), sqlx::Error> =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM events e WHERE {EVENT_FILTER}"))
                .bind(filter.name.as_deref())
                .bind(filter.location.as_deref())
                .bind(filter.started)
                .bind(filter.ended)
                .bind(filter.published)
                .bind(filter.show_full)
                .bind(now)
                .fetch_one(&self.pool)
                .await;
        timer.record();
        result.map(|(count,)| count)
    }

    /// Update an event under a row lock.
    ///
    /// `plan` receives the locked event and its guest count and returns the
    /// changes to write, so pool arithmetic sees the committed values.
    pub async fn update_locked<F>(&self, id: i64, plan: F) -> Result<EventEntity, RepositoryError>
    where
        F: FnOnce(&Event, i64) -> Result<EventChanges, DomainError>,
    {
        let timer = QueryTimer::new("update_event");
        let mut tx = self.pool.begin().await?;

        let (current, guest_count) = lock_event(&mut tx, id).await?;
        let changes = plan(&current, guest_count)?;

        let entity = if changes.is_empty() {
            fetch_event(&mut tx, id).await?
        } else {
            sqlx::query(
                r#"
                UPDATE events
                SET name = COALESCE($2, name),
                    description = COALESCE($3, description),
                    location = COALESCE($4, location),
                    start_time = COALESCE($5, start_time),
                    end_time = COALESCE($6, end_time),
                    capacity = COALESCE($7, capacity),
                    points_total = COALESCE($8, points_total),
                    points_remain = COALESCE($9, points_remain),
                    published = COALESCE($10, published)
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.location.as_deref())
            .bind(changes.start_time)
            .bind(changes.end_time)
            .bind(changes.capacity)
            .bind(changes.points_total)
            .bind(changes.points_remain)
            .bind(changes.published)
            .execute(&mut *tx)
            .await?;
            fetch_event(&mut tx, id).await?
        };

        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Delete an unpublished event.
    pub async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("delete_event");
        let mut tx = self.pool.begin().await?;
        let (current, _) = lock_event(&mut tx, id).await?;
        event::check_event_delete(&current)?;
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        timer.record();
        Ok(())
    }

    pub async fn is_organizer(&self, event_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("event_is_organizer");
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM event_organizers WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(|(exists,)| exists)
    }

    pub async fn is_guest(&self, event_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("event_is_guest");
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM event_guests WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(|(exists,)| exists)
    }

    pub async fn list_organizers(&self, event_id: i64) -> Result<Vec<EventPersonEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_event_organizers");
        let result = sqlx::query_as::<_, EventPersonEntity>(
            r#"
            SELECT u.id, u.utorid, u.name
            FROM event_organizers o
            JOIN users u ON u.id = o.user_id
            WHERE o.event_id = $1
            ORDER BY o.added_at, u.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list_guests(&self, event_id: i64) -> Result<Vec<EventGuestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_event_guests");
        let result = sqlx::query_as::<_, EventGuestEntity>(
            r#"
            SELECT u.id, u.utorid, u.name, g.rsvp_status, g.attended
            FROM event_guests g
            JOIN users u ON u.id = g.user_id
            WHERE g.event_id = $1
            ORDER BY g.added_at, u.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Add an organizer; the event row is locked while the guest list is
    /// checked.
    pub async fn add_organizer(
        &self,
        event_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let timer = QueryTimer::new("add_event_organizer");
        let mut tx = self.pool.begin().await?;

        let (current, _) = lock_event(&mut tx, event_id).await?;
        let (is_guest,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM event_guests WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        event::check_add_organizer(&current, is_guest, now)?;

        sqlx::query("INSERT INTO event_organizers (event_id, user_id) VALUES ($1, $2)")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        timer.record();
        Ok(())
    }

    pub async fn remove_organizer(&self, event_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("remove_event_organizer");
        let result = sqlx::query("DELETE FROM event_organizers WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Add a guest while holding the event lock, so capacity cannot be
    /// exceeded by concurrent additions.
    pub async fn add_guest(
        &self,
        event_id: i64,
        user_id: i64,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> Result<EventGuestEntity, RepositoryError> {
        let timer = QueryTimer::new("add_event_guest");
        let mut tx = self.pool.begin().await?;

        let (current, guest_count) = lock_event(&mut tx, event_id).await?;
        let (is_organizer,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM event_organizers WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        event::check_add_guest(&current, guest_count, is_organizer, now)?;

        let guest = sqlx::query_as::<_, EventGuestEntity>(
            r#"
            WITH inserted AS (
                INSERT INTO event_guests (event_id, user_id, rsvp_status)
                VALUES ($1, $2, $3)
                RETURNING user_id, rsvp_status, attended
            )
            SELECT u.id, u.utorid, u.name, i.rsvp_status, i.attended
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(guest)
    }

    pub async fn remove_guest(&self, event_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("remove_event_guest");
        let result = sqlx::query("DELETE FROM event_guests WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Record attendance; returns `None` when the user is not a guest.
    pub async fn set_attended(
        &self,
        event_id: i64,
        user_id: i64,
        attended: bool,
    ) -> Result<Option<EventGuestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("set_event_guest_attended");
        let result = sqlx::query_as::<_, EventGuestEntity>(
            r#"
            WITH updated AS (
                UPDATE event_guests
                SET attended = $3
                WHERE event_id = $1 AND user_id = $2
                RETURNING user_id, rsvp_status, attended
            )
            SELECT u.id, u.utorid, u.name, x.rsvp_status, x.attended
            FROM updated x
            JOIN users u ON u.id = x.user_id
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(attended)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}

async fn lock_event(
    tx: &mut DbTransaction<'_, Postgres>,
    id: i64,
) -> Result<(Event, i64), RepositoryError> {
    let entity = sqlx::query_as::<_, EventEntity>(
        r#"
        SELECT id, name, description, location, start_time, end_time, capacity,
               points_total, points_remain, published, created_at,
               (SELECT COUNT(*) FROM event_guests g WHERE g.event_id = events.id) AS num_guests
        FROM events
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(RepositoryError::NotFound("Event"))?;
    Ok(entity.into_parts())
}

async fn fetch_event(tx: &mut DbTransaction<'_, Postgres>, id: i64) -> Result<EventEntity, sqlx::Error> {
    sqlx::query_as::<_, EventEntity>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1"
    ))
    .bind(id)
    .fetch_one(&mut **tx)
    .await
}
