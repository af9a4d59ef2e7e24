use crate::domain::model::{AcClass, CanonicalLeg};
use crate::domain::ports::{LegStore, UpsertOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{QueryBuilder, Row};
use std::time::Duration;

const CONNECT_ATTEMPTS: u32 = 5;
const MAX_CONNECTIONS: u32 = 8;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS legs (
    id          TEXT PRIMARY KEY,
    operator    TEXT NOT NULL,
    from_iata   TEXT NOT NULL,
    to_iata     TEXT NOT NULL,
    from_icao   TEXT,
    to_icao     TEXT,
    from_city   TEXT NOT NULL,
    to_city     TEXT NOT NULL,
    from_name   TEXT NOT NULL,
    to_name     TEXT NOT NULL,
    depart_at   TIMESTAMPTZ NOT NULL,
    price_usd   BIGINT NOT NULL,
    ac_type     TEXT NOT NULL,
    ac_class    TEXT NOT NULL,
    seats       INTEGER NOT NULL,
    notes       TEXT,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const LEG_COLUMNS: &str = "id, operator, from_iata, to_iata, from_icao, to_icao, from_city, \
     to_city, from_name, to_name, depart_at, price_usd, ac_type, ac_class, seats, notes";

/// Canonical Postgres store for legs. The scrape url is debug-only and has
/// no column.
pub struct PgLegStore {
    pool: PgPool,
}

impl PgLegStore {
    /// Connect with exponential backoff (1, 2, 4, 8, 16 s). Exhausting the
    /// attempts is run-fatal for the caller.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut delay = Duration::from_secs(1);
        let mut last_err: Option<sqlx::Error> = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            match PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(Duration::from_secs(10))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    if attempt > 1 {
                        tracing::info!("💾 database connected on attempt {}", attempt);
                    }
                    return Ok(Self { pool });
                }
                Err(e) => {
                    tracing::warn!(
                        "database connect attempt {}/{} failed: {}",
                        attempt,
                        CONNECT_ATTEMPTS,
                        e
                    );
                    last_err = Some(e);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_err
            .map(Into::into)
            .unwrap_or_else(|| crate::utils::error::IngestError::ConfigError {
                message: "database connect failed".to_string(),
            }))
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn bind_leg<'a>(
    builder: &mut sqlx::query_builder::Separated<'_, 'a, sqlx::Postgres, &'static str>,
    leg: &'a CanonicalLeg,
) {
    builder
        .push_bind(&leg.id)
        .push_bind(&leg.operator)
        .push_bind(&leg.from_iata)
        .push_bind(&leg.to_iata)
        .push_bind(&leg.from_icao)
        .push_bind(&leg.to_icao)
        .push_bind(&leg.from_city)
        .push_bind(&leg.to_city)
        .push_bind(&leg.from_name)
        .push_bind(&leg.to_name)
        .push_bind(leg.depart_at)
        .push_bind(leg.price_usd)
        .push_bind(&leg.ac_type)
        .push_bind(leg.ac_class.as_str())
        .push_bind(leg.seats)
        .push_bind(&leg.notes);
}

fn leg_from_row(row: &sqlx::postgres::PgRow) -> CanonicalLeg {
    let ac_class: String = row.get("ac_class");
    CanonicalLeg {
        id: row.get("id"),
        operator: row.get("operator"),
        from_iata: row.get("from_iata"),
        to_iata: row.get("to_iata"),
        from_icao: row.get("from_icao"),
        to_icao: row.get("to_icao"),
        from_city: row.get("from_city"),
        to_city: row.get("to_city"),
        from_name: row.get("from_name"),
        to_name: row.get("to_name"),
        depart_at: row.get::<DateTime<Utc>, _>("depart_at"),
        price_usd: row.get("price_usd"),
        ac_type: row.get("ac_type"),
        ac_class: ac_class.parse().unwrap_or(AcClass::Unknown),
        seats: row.get("seats"),
        notes: row.get("notes"),
        url: String::new(),
    }
}

#[async_trait]
impl LegStore for PgLegStore {
    async fn insert_missing(&self, legs: &[CanonicalLeg]) -> Result<Vec<String>> {
        if legs.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("INSERT INTO legs ({}) ", LEG_COLUMNS));
        qb.push_values(legs, |mut b, leg| bind_leg(&mut b, leg));
        qb.push(" ON CONFLICT (id) DO NOTHING RETURNING id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn fetch(&self, id: &str) -> Result<Option<CanonicalLeg>> {
        let row = sqlx::query(&format!("SELECT {} FROM legs WHERE id = $1", LEG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(leg_from_row))
    }

    async fn upsert(&self, leg: &CanonicalLeg) -> Result<UpsertOutcome> {
        let existing = self.fetch(&leg.id).await?;
        match existing {
            None => {
                let mut qb: QueryBuilder<sqlx::Postgres> =
                    QueryBuilder::new(format!("INSERT INTO legs ({}) ", LEG_COLUMNS));
                qb.push_values(std::slice::from_ref(leg), |mut b, leg| bind_leg(&mut b, leg));
                qb.push(" ON CONFLICT (id) DO NOTHING");
                qb.build().execute(&self.pool).await?;
                Ok(UpsertOutcome::Inserted)
            }
            Some(current) if current.persist_eq(leg) => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                sqlx::query(
                    "UPDATE legs SET operator = $2, from_iata = $3, to_iata = $4, \
                     from_icao = $5, to_icao = $6, from_city = $7, to_city = $8, \
                     from_name = $9, to_name = $10, depart_at = $11, price_usd = $12, \
                     ac_type = $13, ac_class = $14, seats = $15, notes = $16, \
                     updated_at = now() WHERE id = $1",
                )
                .bind(&leg.id)
                .bind(&leg.operator)
                .bind(&leg.from_iata)
                .bind(&leg.to_iata)
                .bind(&leg.from_icao)
                .bind(&leg.to_icao)
                .bind(&leg.from_city)
                .bind(&leg.to_city)
                .bind(&leg.from_name)
                .bind(&leg.to_name)
                .bind(leg.depart_at)
                .bind(leg.price_usd)
                .bind(&leg.ac_type)
                .bind(leg.ac_class.as_str())
                .bind(leg.seats)
                .bind(&leg.notes)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }
}
