//! Persistence for `cash_out_txs` rows.
//!
//! All operations take a Postgres executor so they compose into the
//! caller's transaction. The update path writes only the fields carried
//! by a [`TxPatch`]; an empty patch performs no I/O at all.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, Postgres, QueryBuilder};

use super::error::CashOutError;
use super::patch::TxPatch;
use super::status::CashOutStatus;
use super::types::CashOutTx;

/// Load the row for `id`, taking a row lock so concurrent lifecycle
/// transactions for the same id serialize on the store.
pub async fn fetch_for_update<'a, E>(exec: E, id: &str) -> Result<Option<CashOutTx>, CashOutError>
where
    E: PgExecutor<'a>,
{
    let row = sqlx::query("SELECT * FROM cash_out_txs WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(exec)
        .await?;

    row.as_ref().map(CashOutTx::from_row).transpose()
}

/// Full insert of a first-seen transaction. Returns the persisted row.
pub async fn insert<'a, E>(exec: E, tx: &CashOutTx) -> Result<CashOutTx, CashOutError>
where
    E: PgExecutor<'a>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO cash_out_txs
            (id, device_id, to_address, hd_index, crypto_atoms, fiat, tx_hash,
             status, dispense, dispense_confirmed, dispense_time, bills,
             notified, redeem, swept, phone, error, created)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING *
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.device_id)
    .bind(&tx.to_address)
    .bind(tx.hd_index)
    .bind(tx.crypto_atoms)
    .bind(tx.fiat)
    .bind(&tx.tx_hash)
    .bind(tx.status.as_str())
    .bind(tx.dispense)
    .bind(tx.dispense_confirmed)
    .bind(tx.dispense_time)
    .bind(tx.bills.as_ref().map(|b| Json(b.clone())))
    .bind(tx.notified)
    .bind(tx.redeem)
    .bind(tx.swept)
    .bind(&tx.phone)
    .bind(&tx.error)
    .bind(tx.created)
    .fetch_one(exec)
    .await?;

    CashOutTx::from_row(&row)
}

/// Apply a patch to the stored row, writing only the changed fields, and
/// return the merged in-memory record.
///
/// The empty patch is an idempotent no-op: no statement is issued and the
/// old record comes back unchanged.
pub async fn update<'a, E>(
    exec: E,
    old: &CashOutTx,
    patch: &TxPatch,
) -> Result<CashOutTx, CashOutError>
where
    E: PgExecutor<'a>,
{
    if patch.is_empty() {
        return Ok(old.clone());
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE cash_out_txs SET ");
    let mut sets = qb.separated(", ");

    if let Some(v) = &patch.tx_hash {
        sets.push("tx_hash = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = patch.status {
        sets.push("status = ").push_bind_unseparated(v.as_str());
    }
    if let Some(v) = patch.dispense {
        sets.push("dispense = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.dispense_confirmed {
        sets.push("dispense_confirmed = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.notified {
        sets.push("notified = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.redeem {
        sets.push("redeem = ").push_bind_unseparated(v);
    }
    if let Some(v) = &patch.phone {
        sets.push("phone = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = &patch.error {
        sets.push("error = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = patch.swept {
        sets.push("swept = ").push_bind_unseparated(v);
    }
    if let Some(v) = patch.dispense_time {
        sets.push("dispense_time = ").push_bind_unseparated(v);
    }
    if let Some(v) = &patch.bills {
        sets.push("bills = ").push_bind_unseparated(Json(v.clone()));
    }

    qb.push(" WHERE id = ").push_bind(&old.id);
    qb.build().execute(exec).await?;

    Ok(patch.apply(old))
}

/// Reserve the next HD derivation index.
pub async fn next_hd_index<'a, E>(exec: E) -> Result<i64, CashOutError>
where
    E: PgExecutor<'a>,
{
    let idx: i64 = sqlx::query_scalar("SELECT nextval('hd_indexes_seq')")
        .fetch_one(exec)
        .await?;
    Ok(idx)
}

/// Mark a transaction as customer-notified. Used by the notification
/// sweep only; no status change is involved, so this bypasses diffing.
pub async fn set_notified<'a, E>(exec: E, id: &str) -> Result<(), CashOutError>
where
    E: PgExecutor<'a>,
{
    sqlx::query("UPDATE cash_out_txs SET notified = true WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Range query used by the incoming-status sweeps: rows in one of the
/// given statuses created after `cutoff` (i.e. younger than the sweep's
/// age window).
pub async fn fetch_by_age_and_status<'a, E>(
    exec: E,
    statuses: &[CashOutStatus],
    cutoff: DateTime<Utc>,
) -> Result<Vec<CashOutTx>, CashOutError>
where
    E: PgExecutor<'a>,
{
    let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let rows = sqlx::query(
        r#"
        SELECT * FROM cash_out_txs
        WHERE status = ANY($1) AND created > $2
        ORDER BY created
        "#,
    )
    .bind(&names)
    .bind(cutoff)
    .fetch_all(exec)
    .await?;

    rows.iter().map(CashOutTx::from_row).collect()
}

/// Range query used by the notification sweep: confirmed-side rows with a
/// phone on file that the customer has not been told about, younger than
/// `max_age_cutoff`, and either flagged for later redemption or older
/// than `min_age_cutoff`.
pub async fn fetch_unnotified<'a, E>(
    exec: E,
    max_age_cutoff: DateTime<Utc>,
    min_age_cutoff: DateTime<Utc>,
) -> Result<Vec<CashOutTx>, CashOutError>
where
    E: PgExecutor<'a>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM cash_out_txs
        WHERE NOT notified
          AND NOT dispense
          AND phone IS NOT NULL
          AND status = ANY($1)
          AND created > $2
          AND (redeem OR created < $3)
        ORDER BY created
        "#,
    )
    .bind(vec![
        CashOutStatus::Instant.as_str().to_string(),
        CashOutStatus::Confirmed.as_str().to_string(),
    ])
    .bind(max_age_cutoff)
    .bind(min_age_cutoff)
    .fetch_all(exec)
    .await?;

    rows.iter().map(CashOutTx::from_row).collect()
}
