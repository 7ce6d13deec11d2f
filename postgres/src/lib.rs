//! # Flash Sale Postgres
//!
//! `PostgreSQL`-backed [`SaleRepository`]: the durable system of record for
//! sales, allocations and reservation claims.
//!
//! ## Locking discipline
//!
//! The reserve path runs one transaction per attempt:
//!
//! 1. `SET LOCAL lock_timeout` to the policy's bounded wait, so contention
//!    surfaces as a retryable `Busy` instead of an unbounded queue
//! 2. `pg_advisory_xact_lock` keyed on `(buyer, allocation)`, serializing
//!    same-buyer requests from concurrent sessions so the purchase-cap sum
//!    is exact, not best-effort
//! 3. `SELECT … FOR UPDATE` on the allocation row joined with its sale row,
//!    the single serialization point stock consumption funnels through
//! 4. re-read claims, run the shared rule set, increment `quantity_sold`,
//!    insert the claim with the price frozen, commit
//!
//! Any failure rolls the transaction back and leaves `quantity_sold`
//! untouched. The scheduler's status flips update the same sale rows, so a
//! purchase cannot sneak past a sale being closed out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flash_sale_core::error::{EngineError, EngineResult};
use flash_sale_core::repository::SaleRepository;
use flash_sale_core::reservation::{self, ReservePolicy};
use flash_sale_core::types::{
    Allocation, AllocationId, BuyerId, Money, NewSale, ProductId, ReservationReceipt,
    ReserveRequest, Sale, SaleId, SaleStatus,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

/// Claim statuses excluded from the cap sum. Cancelled or refunded order
/// lines give the units back to the buyer's budget.
const INACTIVE_CLAIM_STATUSES: &str = "('cancelled', 'refunded')";

type SaleRow = (
    Uuid,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    i16,
    String,
    DateTime<Utc>,
);

type AllocationRow = (Uuid, Uuid, Uuid, i64, i64, i32, i32);

/// `PostgreSQL` implementation of the sale repository.
#[derive(Clone)]
pub struct PostgresSaleRepository {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresSaleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSaleRepository").finish_non_exhaustive()
    }
}

impl PostgresSaleRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool and wrap it.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx` error if the pool cannot be
    /// established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a migration error if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Access the underlying connection pool, e.g. for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map database errors: a lock-wait timeout (`SQLSTATE 55P03`) is the
/// expected `Busy` outcome, everything else is infrastructure.
fn map_sqlx(err: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("55P03") {
            return EngineError::Busy;
        }
    }
    EngineError::storage(err)
}

#[allow(clippy::cast_sign_loss)] // Counters are constrained non-negative by schema checks
fn sale_from_row(row: SaleRow) -> EngineResult<Sale> {
    let (id, title, description, starts_at, ends_at, discount_percent, status, created_at) = row;
    let status = SaleStatus::parse(&status)
        .ok_or_else(|| EngineError::storage(format!("unknown sale status '{status}'")))?;
    Ok(Sale {
        id: SaleId::from_uuid(id),
        title,
        description,
        starts_at,
        ends_at,
        discount_percent: discount_percent as u8,
        status,
        created_at,
    })
}

#[allow(clippy::cast_sign_loss)] // Counters are constrained non-negative by schema checks
fn allocation_from_row(row: AllocationRow) -> Allocation {
    let (id, sale_id, product_id, original_price, sale_price, max_quantity, quantity_sold) = row;
    Allocation {
        id: AllocationId::from_uuid(id),
        sale_id: SaleId::from_uuid(sale_id),
        product_id: ProductId::from_uuid(product_id),
        original_price: Money::from_minor_units(original_price as u64),
        sale_price: Money::from_minor_units(sale_price as u64),
        max_quantity: max_quantity as u32,
        quantity_sold: quantity_sold as u32,
    }
}

fn price_to_db(price: Money) -> EngineResult<i64> {
    i64::try_from(price.minor_units())
        .map_err(|_| EngineError::invalid("price exceeds storable range"))
}

const SALE_COLUMNS: &str =
    "id, title, description, starts_at, ends_at, discount_percent, status, created_at";

const ALLOCATION_COLUMNS: &str =
    "id, sale_id, product_id, original_price, sale_price, max_quantity, quantity_sold";

#[async_trait]
impl SaleRepository for PostgresSaleRepository {
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create_sale(
        &self,
        draft: &NewSale,
        now: DateTime<Utc>,
    ) -> EngineResult<(Sale, Vec<Allocation>)> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let sale = Sale {
            id: SaleId::new(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            discount_percent: draft.discount_percent,
            status: SaleStatus::Scheduled,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO sales
             (id, title, description, starts_at, ends_at, discount_percent, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(sale.id.as_uuid())
        .bind(&sale.title)
        .bind(&sale.description)
        .bind(sale.starts_at)
        .bind(sale.ends_at)
        .bind(i16::from(sale.discount_percent))
        .bind(sale.status.as_str())
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut allocations = Vec::with_capacity(draft.allocations.len());
        for entry in &draft.allocations {
            let allocation = Allocation {
                id: AllocationId::new(),
                sale_id: sale.id,
                product_id: entry.product_id,
                original_price: entry.original_price,
                sale_price: entry.sale_price,
                max_quantity: entry.max_quantity,
                quantity_sold: 0,
            };

            sqlx::query(
                "INSERT INTO sale_allocations
                 (id, sale_id, product_id, original_price, sale_price, max_quantity, quantity_sold)
                 VALUES ($1, $2, $3, $4, $5, $6, 0)",
            )
            .bind(allocation.id.as_uuid())
            .bind(allocation.sale_id.as_uuid())
            .bind(allocation.product_id.as_uuid())
            .bind(price_to_db(allocation.original_price)?)
            .bind(price_to_db(allocation.sale_price)?)
            .bind(i64::from(allocation.max_quantity))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            allocations.push(allocation);
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok((sale, allocations))
    }

    async fn sale(&self, id: SaleId) -> EngineResult<Option<Sale>> {
        let row: Option<SaleRow> =
            sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
        row.map(sale_from_row).transpose()
    }

    async fn allocation(&self, id: AllocationId) -> EngineResult<Option<Allocation>> {
        let row: Option<AllocationRow> = sqlx::query_as(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM sale_allocations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(allocation_from_row))
    }

    async fn allocations_by_sale(&self, sale_id: SaleId) -> EngineResult<Vec<Allocation>> {
        // Display order: scarcest first.
        let rows: Vec<AllocationRow> = sqlx::query_as(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM sale_allocations
             WHERE sale_id = $1
             ORDER BY quantity_sold::float8 / NULLIF(max_quantity, 0)::float8 DESC NULLS LAST, id"
        ))
        .bind(sale_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(allocation_from_row).collect())
    }

    async fn sales_with_status(&self, status: SaleStatus) -> EngineResult<Vec<Sale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE status = $1 ORDER BY starts_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(sale_from_row).collect()
    }

    async fn buyer_claimed(
        &self,
        allocation_id: AllocationId,
        buyer_id: BuyerId,
    ) -> EngineResult<u32> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(quantity), 0) AS claimed
             FROM allocation_claims
             WHERE allocation_id = $1 AND buyer_id = $2
               AND status NOT IN {INACTIVE_CLAIM_STATUSES}"
        ))
        .bind(allocation_id.as_uuid())
        .bind(buyer_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let claimed: i64 = row.try_get("claimed").map_err(map_sqlx)?;
        u32::try_from(claimed).map_err(|_| EngineError::storage("claim sum out of range"))
    }

    #[tracing::instrument(
        skip(self, policy),
        fields(
            allocation_id = %request.allocation_id,
            buyer_id = %request.buyer_id,
            quantity = request.quantity,
        )
    )]
    async fn reserve(
        &self,
        request: &ReserveRequest,
        policy: &ReservePolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReservationReceipt> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Bounded lock waits for the whole transaction: contention past the
        // budget surfaces as SQLSTATE 55P03, mapped to Busy.
        let lock_millis = policy.lock_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_millis}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        // Serialize same-buyer attempts across sessions before reading the
        // claim sum, so the cap check cannot race itself.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text), hashtext($2::text))")
            .bind(request.buyer_id.as_uuid().to_string())
            .bind(request.allocation_id.as_uuid().to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        // Exclusive locks on the allocation row and its sale row: the stock
        // read, the window check and the increment form one serializable
        // unit, and a racing lifecycle flip waits its turn.
        let row: Option<(AllocationRow, SaleRow)> = sqlx::query(
            "SELECT a.id, a.sale_id, a.product_id, a.original_price, a.sale_price,
                    a.max_quantity, a.quantity_sold,
                    s.id AS s_id, s.title, s.description, s.starts_at, s.ends_at,
                    s.discount_percent, s.status, s.created_at
             FROM sale_allocations a
             JOIN sales s ON s.id = a.sale_id
             WHERE a.id = $1
             FOR UPDATE",
        )
        .bind(request.allocation_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .map(|row| -> Result<(AllocationRow, SaleRow), sqlx::Error> {
            Ok((
                (
                    row.try_get("id")?,
                    row.try_get("sale_id")?,
                    row.try_get("product_id")?,
                    row.try_get("original_price")?,
                    row.try_get("sale_price")?,
                    row.try_get("max_quantity")?,
                    row.try_get("quantity_sold")?,
                ),
                (
                    row.try_get("s_id")?,
                    row.try_get("title")?,
                    row.try_get("description")?,
                    row.try_get("starts_at")?,
                    row.try_get("ends_at")?,
                    row.try_get("discount_percent")?,
                    row.try_get("status")?,
                    row.try_get("created_at")?,
                ),
            ))
        })
        .transpose()
        .map_err(map_sqlx)?;

        let Some((allocation_row, sale_row)) = row else {
            return Err(EngineError::NotFound {
                resource: "allocation",
                id: *request.allocation_id.as_uuid(),
            });
        };
        let allocation = allocation_from_row(allocation_row);
        let sale = sale_from_row(sale_row)?;

        let claimed_row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(quantity), 0) AS claimed
             FROM allocation_claims
             WHERE allocation_id = $1 AND buyer_id = $2
               AND status NOT IN {INACTIVE_CLAIM_STATUSES}"
        ))
        .bind(request.allocation_id.as_uuid())
        .bind(request.buyer_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let claimed: i64 = claimed_row.try_get("claimed").map_err(map_sqlx)?;
        let already_claimed =
            u32::try_from(claimed).map_err(|_| EngineError::storage("claim sum out of range"))?;

        // Dropping the transaction on any rejection rolls everything back;
        // quantity_sold is only ever written past this point.
        reservation::evaluate(
            &sale,
            &allocation,
            already_claimed,
            request.quantity,
            now,
            policy.per_buyer_cap,
        )?;

        sqlx::query("UPDATE sale_allocations SET quantity_sold = quantity_sold + $2 WHERE id = $1")
            .bind(request.allocation_id.as_uuid())
            .bind(i64::from(request.quantity))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        // The claim is the order-line record downstream checkout consumes;
        // its unit price is frozen here, at reservation time.
        sqlx::query(
            "INSERT INTO allocation_claims (allocation_id, buyer_id, quantity, unit_price, status)
             VALUES ($1, $2, $3, $4, 'reserved')",
        )
        .bind(request.allocation_id.as_uuid())
        .bind(request.buyer_id.as_uuid())
        .bind(i64::from(request.quantity))
        .bind(price_to_db(allocation.sale_price)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        Ok(ReservationReceipt {
            allocation_id: request.allocation_id,
            reserved_price: allocation.sale_price,
            reserved_quantity: request.quantity,
            remaining: allocation
                .max_quantity
                .saturating_sub(allocation.quantity_sold + request.quantity),
        })
    }

    #[tracing::instrument(skip(self), fields(sale_id = %id))]
    async fn cancel_sale(&self, id: SaleId, now: DateTime<Utc>) -> EngineResult<Sale> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Lock the sale row so cancellation serializes against a racing
        // promotion tick.
        let row: Option<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let Some(row) = row else {
            return Err(EngineError::NotFound {
                resource: "sale",
                id: *id.as_uuid(),
            });
        };
        let mut sale = sale_from_row(row)?;

        if !sale.can_cancel(now) {
            let reason = if sale.status == SaleStatus::Scheduled {
                "sale has already started"
            } else {
                "only scheduled sales can be cancelled"
            };
            return Err(EngineError::conflict(reason));
        }

        sqlx::query("UPDATE sales SET status = 'cancelled' WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;

        sale.status = SaleStatus::Cancelled;
        Ok(sale)
    }

    async fn promote_due_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>> {
        // Single idempotent statement: re-running with nothing due matches
        // zero rows and changes nothing.
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "UPDATE sales SET status = 'active'
             WHERE status = 'scheduled' AND starts_at <= $1
             RETURNING {SALE_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(sale_from_row).collect()
    }

    async fn close_expired_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>> {
        // The UPDATE takes the same row locks as the reserve path's
        // FOR UPDATE join, so closing a sale waits for in-flight
        // reservations and vice versa.
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "UPDATE sales SET status = 'ended'
             WHERE status = 'active' AND ends_at <= $1
             RETURNING {SALE_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(sale_from_row).collect()
    }

    async fn set_sale_price(&self, allocation_id: AllocationId, price: Money) -> EngineResult<()> {
        let result = sqlx::query("UPDATE sale_allocations SET sale_price = $2 WHERE id = $1")
            .bind(allocation_id.as_uuid())
            .bind(price_to_db(price)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound {
                resource: "allocation",
                id: *allocation_id.as_uuid(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_row_mapping_rejects_unknown_status() {
        let row: SaleRow = (
            Uuid::new_v4(),
            "t".to_string(),
            String::new(),
            Utc::now(),
            Utc::now() + chrono::Duration::hours(1),
            10,
            "paused".to_string(),
            Utc::now(),
        );
        assert!(matches!(sale_from_row(row), Err(EngineError::Storage(_))));
    }

    #[test]
    fn test_price_to_db_rejects_overflow() {
        assert!(price_to_db(Money::from_minor_units(u64::MAX)).is_err());
        assert_eq!(price_to_db(Money::from_minor_units(1_500)), Ok(1_500));
    }
}
