//! PostgreSQL backing for the block store and the fleet catalog.
//!
//! Overlap exclusion is the `ex_vehicle_availability_blocks_no_overlap`
//! constraint from `migrations/0001_vehicle_availability.sql`; a violation is
//! SQLSTATE `23P01` and maps to [`StoreError::Exclusion`].
//!
//! Times travel as `HH:MM` text (`$n::time` on the way in, `to_char` on the
//! way out) so that `24:00` round-trips.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use ulid::Ulid;

use crate::catalog::{BlackoutRule, FleetCatalog, Vehicle, VehicleStatus};
use crate::limits::MAX_NOTES_LEN;
use crate::model::*;

use super::{AvailabilityStore, DeleteGuard, GuardedDelete, StoreError};

/// PostgreSQL SQLSTATE for `exclusion_violation`.
const EXCLUSION_VIOLATION: &str = "23P01";

const MIGRATION: &str = include_str!("../../migrations/0001_vehicle_availability.sql");

/// Column list for `vehicle_availability_blocks` SELECT / RETURNING.
const COLUMNS: &str = "\
    id, vehicle_id, block_date, \
    to_char(start_time, 'HH24:MI') AS start_time, \
    to_char(end_time, 'HH24:MI') AS end_time, \
    block_type, booking_id, brand_id, created_by, notes, created_at";

/// Column list for INSERT.
const INSERT_COLUMNS: &str = "\
    id, vehicle_id, block_date, start_time, end_time, \
    block_type, booking_id, brand_id, created_by, notes, created_at";

#[derive(Debug, sqlx::FromRow)]
struct BlockRow {
    id: String,
    vehicle_id: String,
    block_date: NaiveDate,
    start_time: String,
    end_time: String,
    block_type: String,
    booking_id: Option<String>,
    brand_id: Option<String>,
    created_by: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_id(field: &str, value: &str) -> Result<Ulid, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("{field} is not a ULID: {value:?}")))
}

fn parse_opt_id(field: &str, value: Option<&str>) -> Result<Option<Ulid>, StoreError> {
    value.map(|v| parse_id(field, v)).transpose()
}

impl TryFrom<BlockRow> for AvailabilityBlock {
    type Error = StoreError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        let start: TimeOfDay = row
            .start_time
            .parse()
            .map_err(|e: InvalidTime| StoreError::Corrupt(e.to_string()))?;
        let end: TimeOfDay = row
            .end_time
            .parse()
            .map_err(|e: InvalidTime| StoreError::Corrupt(e.to_string()))?;
        let range = TimeRange::new(start, end)
            .ok_or_else(|| StoreError::Corrupt(format!("empty range {start}-{end}")))?;
        let block_type: BlockType = row.block_type.parse().map_err(StoreError::Corrupt)?;
        let booking_id = parse_opt_id("booking_id", row.booking_id.as_deref())?;
        let kind = BlockKind::from_parts(block_type, booking_id).map_err(StoreError::Corrupt)?;
        Ok(AvailabilityBlock {
            id: parse_id("id", &row.id)?,
            vehicle_id: parse_id("vehicle_id", &row.vehicle_id)?,
            date: row.block_date,
            range,
            kind,
            brand_id: parse_opt_id("brand_id", row.brand_id.as_deref())?,
            created_by: row.created_by,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

fn guard_predicate(guard: DeleteGuard) -> &'static str {
    match guard {
        DeleteGuard::HoldOnly => "block_type = 'hold'",
        DeleteGuard::NotBooking => "block_type <> 'booking'",
    }
}

fn into_blocks(rows: Vec<BlockRow>) -> Result<Vec<AvailabilityBlock>, StoreError> {
    rows.into_iter().map(AvailabilityBlock::try_from).collect()
}

/// Block store over a shared connection pool.
#[derive(Clone)]
pub struct PgBlockStore {
    pool: PgPool,
}

impl PgBlockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the blocks table, its exclusion constraint and indexes if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_blocks(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, BlockRow, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        into_blocks(rows)
    }
}

#[async_trait]
impl AvailabilityStore for PgBlockStore {
    async fn insert_block(&self, block: NewBlock) -> Result<AvailabilityBlock, StoreError> {
        if block.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(StoreError::LimitExceeded("notes too long"));
        }
        let query = format!(
            "INSERT INTO vehicle_availability_blocks ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4::time, $5::time, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        let result = sqlx::query_as::<_, BlockRow>(&query)
            .bind(Ulid::new().to_string())
            .bind(block.vehicle_id.to_string())
            .bind(block.date)
            .bind(block.range.start.to_string())
            .bind(block.range.end.to_string())
            .bind(block.kind.block_type().as_str())
            .bind(block.kind.booking_id().map(|id| id.to_string()))
            .bind(block.brand_id.map(|id| id.to_string()))
            .bind(&block.created_by)
            .bind(&block.notes)
            .bind(block.created_at)
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(EXCLUSION_VIOLATION) =>
            {
                Err(StoreError::Exclusion {
                    vehicle_id: block.vehicle_id,
                    date: block.date,
                    conflicting: None,
                })
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM vehicle_availability_blocks WHERE id = $1");
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?
            .map(AvailabilityBlock::try_from)
            .transpose()
    }

    async fn convert_hold(
        &self,
        id: BlockId,
        booking_id: BookingId,
    ) -> Result<Option<AvailabilityBlock>, StoreError> {
        let query = format!(
            "UPDATE vehicle_availability_blocks \
             SET block_type = 'booking', booking_id = $2, notes = NULL \
             WHERE id = $1 AND block_type = 'hold' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(id.to_string())
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?
            .map(AvailabilityBlock::try_from)
            .transpose()
    }

    async fn delete_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError> {
        let query =
            format!("DELETE FROM vehicle_availability_blocks WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?
            .map(AvailabilityBlock::try_from)
            .transpose()
    }

    async fn delete_block_guarded(
        &self,
        id: BlockId,
        guard: DeleteGuard,
    ) -> Result<GuardedDelete, StoreError> {
        let query = format!(
            "DELETE FROM vehicle_availability_blocks \
             WHERE id = $1 AND {} \
             RETURNING {COLUMNS}",
            guard_predicate(guard)
        );
        let deleted = sqlx::query_as::<_, BlockRow>(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        if let Some(row) = deleted {
            return Ok(GuardedDelete::Deleted(AvailabilityBlock::try_from(row)?));
        }
        // Nothing matched: tell a refused type apart from a missing row.
        let block_type: Option<String> =
            sqlx::query_scalar("SELECT block_type FROM vehicle_availability_blocks WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Database)?;
        match block_type {
            Some(t) => Ok(GuardedDelete::Refused(t.parse().map_err(StoreError::Corrupt)?)),
            None => Ok(GuardedDelete::Missing),
        }
    }

    async fn delete_booking_blocks(&self, booking_id: BookingId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM vehicle_availability_blocks WHERE booking_id = $1")
            .bind(booking_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM vehicle_availability_blocks \
             WHERE block_type = 'hold' AND booking_id IS NULL AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_holds_on(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM vehicle_availability_blocks \
             WHERE vehicle_id = $1 AND block_date = $2 \
               AND block_type = 'hold' AND created_at < $3",
        )
        .bind(vehicle_id.to_string())
        .bind(date)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(result.rows_affected())
    }

    async fn find_overlapping(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        range: TimeRange,
        hold_cutoff: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM vehicle_availability_blocks \
             WHERE vehicle_id = $1 AND block_date = $2 \
               AND start_time < $4::time AND end_time > $3::time \
               AND NOT (block_type = 'hold' AND created_at < $5) \
             ORDER BY start_time"
        );
        self.fetch_blocks(
            sqlx::query_as::<_, BlockRow>(&query)
                .bind(vehicle_id.to_string())
                .bind(date)
                .bind(range.start.to_string())
                .bind(range.end.to_string())
                .bind(hold_cutoff),
        )
        .await
    }

    async fn vehicle_day_blocks(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM vehicle_availability_blocks \
             WHERE vehicle_id = $1 AND block_date = $2 \
             ORDER BY start_time"
        );
        self.fetch_blocks(
            sqlx::query_as::<_, BlockRow>(&query)
                .bind(vehicle_id.to_string())
                .bind(date),
        )
        .await
    }

    async fn day_blocks(&self, date: NaiveDate) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM vehicle_availability_blocks \
             WHERE block_date = $1 \
             ORDER BY vehicle_id, start_time"
        );
        self.fetch_blocks(sqlx::query_as::<_, BlockRow>(&query).bind(date))
            .await
    }

    async fn blocks_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        vehicle_id: Option<VehicleId>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM vehicle_availability_blocks \
             WHERE block_date >= $1 AND block_date <= $2 \
               AND ($3::text IS NULL OR vehicle_id = $3) \
             ORDER BY block_date, vehicle_id, start_time"
        );
        self.fetch_blocks(
            sqlx::query_as::<_, BlockRow>(&query)
                .bind(start)
                .bind(end)
                .bind(vehicle_id.map(|id| id.to_string())),
        )
        .await
    }
}

// ── Fleet catalog ────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct VehicleRow {
    id: String,
    name: String,
    capacity: i32,
    status: String,
    available_to_all_brands: bool,
    brand_ids: Vec<String>,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = StoreError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "active" => VehicleStatus::Active,
            "maintenance" => VehicleStatus::Maintenance,
            "retired" => VehicleStatus::Retired,
            other => return Err(StoreError::Corrupt(format!("unknown vehicle status {other:?}"))),
        };
        let capacity = u32::try_from(row.capacity)
            .map_err(|_| StoreError::Corrupt(format!("negative capacity {}", row.capacity)))?;
        Ok(Vehicle {
            id: parse_id("vehicles.id", &row.id)?,
            name: row.name,
            capacity,
            status,
            available_to_all_brands: row.available_to_all_brands,
            brand_ids: row
                .brand_ids
                .iter()
                .map(|b| parse_id("vehicle_brands.brand_id", b))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Column list for vehicles joined with their brand associations.
const VEHICLE_COLUMNS: &str = "\
    v.id, v.name, v.capacity, v.status, v.available_to_all_brands, \
    COALESCE(array_agg(vb.brand_id) FILTER (WHERE vb.brand_id IS NOT NULL), '{}') AS brand_ids";

/// Reads the platform's `vehicles`, `vehicle_brands`, `availability_rules`
/// and `bookings` tables. Those are owned elsewhere; this type never writes.
#[derive(Clone)]
pub struct PgFleetCatalog {
    pool: PgPool,
}

impl PgFleetCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FleetCatalog for PgFleetCatalog {
    async fn candidate_vehicles(
        &self,
        min_capacity: u32,
        brand_id: Option<BrandId>,
    ) -> Result<Vec<Vehicle>, StoreError> {
        let query = format!(
            "SELECT {VEHICLE_COLUMNS} \
             FROM vehicles v LEFT JOIN vehicle_brands vb ON vb.vehicle_id = v.id \
             WHERE v.status = 'active' AND v.capacity >= $1 \
               AND ($2::text IS NULL OR v.available_to_all_brands \
                    OR EXISTS (SELECT 1 FROM vehicle_brands b \
                               WHERE b.vehicle_id = v.id AND b.brand_id = $2)) \
             GROUP BY v.id \
             ORDER BY v.capacity ASC, v.name ASC"
        );
        let rows = sqlx::query_as::<_, VehicleRow>(&query)
            .bind(i64::from(min_capacity))
            .bind(brand_id.map(|id| id.to_string()))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        rows.into_iter().map(Vehicle::try_from).collect()
    }

    async fn vehicles_by_id(
        &self,
        ids: &[VehicleId],
    ) -> Result<HashMap<VehicleId, Vehicle>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = format!(
            "SELECT {VEHICLE_COLUMNS} \
             FROM vehicles v LEFT JOIN vehicle_brands vb ON vb.vehicle_id = v.id \
             WHERE v.id = ANY($1) \
             GROUP BY v.id"
        );
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let rows = sqlx::query_as::<_, VehicleRow>(&query)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        rows.into_iter()
            .map(|row| Vehicle::try_from(row).map(|v| (v.id, v)))
            .collect()
    }

    async fn active_blackout(&self, date: NaiveDate) -> Result<Option<BlackoutRule>, StoreError> {
        let row: Option<(NaiveDate, Option<String>)> = sqlx::query_as(
            "SELECT rule_date, reason FROM availability_rules \
             WHERE rule_date = $1 AND rule_type = 'blackout' AND is_active \
             LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(row.map(|(date, reason)| BlackoutRule {
            date,
            reason,
            active: true,
        }))
    }

    async fn booking_numbers(
        &self,
        ids: &[BookingId],
    ) -> Result<HashMap<BookingId, String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, booking_number FROM bookings WHERE id = ANY($1)")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::Database)?;
        rows.into_iter()
            .map(|(id, number)| parse_id("bookings.id", &id).map(|id| (id, number)))
            .collect()
    }
}
