use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marquee_core::repository::{ShowtimeRepository, StoreError};
use marquee_domain::showtime::{SeatInfo, Showtime, ShowtimeStatus};

use crate::database::map_sqlx_err;

pub struct PgShowtimeRepository {
    pool: PgPool,
}

impl PgShowtimeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_title: String,
    screen: String,
    status: String,
    start_time: DateTime<Utc>,
    currency: String,
    seats: serde_json::Value,
}

impl ShowtimeRow {
    fn into_showtime(self) -> Result<Showtime, StoreError> {
        let status = ShowtimeStatus::parse(&self.status)
            .ok_or_else(|| StoreError::backend(format!("bad showtime status {}", self.status)))?;
        let seats: Vec<SeatInfo> = serde_json::from_value(self.seats)
            .map_err(|e| StoreError::backend(format!("bad seat layout: {e}")))?;
        Ok(Showtime {
            id: self.id,
            movie_title: self.movie_title,
            screen: self.screen,
            status,
            start_time: self.start_time,
            currency: self.currency,
            seats,
        })
    }
}

#[async_trait]
impl ShowtimeRepository for PgShowtimeRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Showtime>, StoreError> {
        let row: Option<ShowtimeRow> = sqlx::query_as(
            "SELECT id, movie_title, screen, status, start_time, currency, seats
             FROM showtimes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(ShowtimeRow::into_showtime).transpose()
    }
}
