//! PostgreSQL storage backend.
//!
//! Persists blocks, deployments, transfers, bonds, balances, validators,
//! network statistics and epoch transitions. Uses `sqlx` with a connection
//! pool; each block commit is one transaction.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! deployscan-storage = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! # Schema
//! Created on [`IndexStore::init`]:
//! - `indexer_state`: key/value state (cursor, schema version)
//! - `blocks`: one row per block; `deployment_count` is maintained by trigger
//! - `deployments`, `transfers`, `validator_bonds`, `balance_states`
//! - `validators`, `network_stats`, `epoch_transitions`
//!
//! REV amounts are generated columns (`dust / 10^8`), never written directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use deployscan_core::cursor::{SyncCursor, CURSOR_KEY};
use deployscan_core::error::IndexerError;
use deployscan_core::types::{
    BalanceState, BlockCommit, EpochTransition, NetworkStats, Validator, ValidatorBond, ValidatorStatus,
};

use crate::{IndexStore, SCHEMA_VERSION, SCHEMA_VERSION_KEY};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS indexer_state (
        key        TEXT        PRIMARY KEY,
        value      TEXT        NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS blocks (
        block_number     BIGINT           PRIMARY KEY,
        block_hash       TEXT             NOT NULL,
        parent_hash      TEXT             NOT NULL,
        timestamp        BIGINT           NOT NULL,
        proposer         TEXT             NOT NULL,
        pre_state_hash   TEXT             NOT NULL,
        post_state_hash  TEXT             NOT NULL,
        finalized        BOOLEAN          NOT NULL,
        fault_tolerance  DOUBLE PRECISION NOT NULL,
        bonds            JSONB            NOT NULL,
        justifications   JSONB            NOT NULL,
        deployment_count INTEGER          NOT NULL DEFAULT 0,
        indexed_at       TIMESTAMPTZ      NOT NULL DEFAULT NOW()
    )",
    "DROP INDEX IF EXISTS idx_blocks_hash",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_blocks_hash_unique ON blocks(block_hash)",
    "CREATE TABLE IF NOT EXISTS deployments (
        deploy_id       TEXT    PRIMARY KEY,
        block_number    BIGINT  NOT NULL REFERENCES blocks(block_number),
        block_hash      TEXT    NOT NULL,
        deployer        TEXT    NOT NULL,
        term            TEXT    NOT NULL,
        timestamp       BIGINT  NOT NULL,
        phlo_price      BIGINT  NOT NULL,
        phlo_limit      BIGINT  NOT NULL,
        phlo_cost       BIGINT  NOT NULL,
        errored         BOOLEAN NOT NULL,
        error_message   TEXT,
        deployment_type TEXT    NOT NULL,
        status          TEXT    NOT NULL,
        CHECK (errored = (error_message IS NOT NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_deployments_block ON deployments(block_number)",
    "CREATE INDEX IF NOT EXISTS idx_deployments_deployer ON deployments(deployer)",
    "CREATE OR REPLACE FUNCTION deployscan_refresh_deployment_count() RETURNS TRIGGER AS $$
     BEGIN
        IF TG_OP IN ('UPDATE', 'DELETE') THEN
            UPDATE blocks SET deployment_count =
                (SELECT COUNT(*) FROM deployments d WHERE d.block_number = OLD.block_number)
            WHERE block_number = OLD.block_number;
        END IF;
        IF TG_OP IN ('INSERT', 'UPDATE') THEN
            UPDATE blocks SET deployment_count =
                (SELECT COUNT(*) FROM deployments d WHERE d.block_number = NEW.block_number)
            WHERE block_number = NEW.block_number;
        END IF;
        RETURN NULL;
     END;
     $$ LANGUAGE plpgsql",
    "DROP TRIGGER IF EXISTS trg_deployment_count ON deployments",
    "CREATE TRIGGER trg_deployment_count
        AFTER INSERT OR UPDATE OR DELETE ON deployments
        FOR EACH ROW EXECUTE FUNCTION deployscan_refresh_deployment_count()",
    "CREATE TABLE IF NOT EXISTS transfers (
        id           BIGSERIAL     PRIMARY KEY,
        deploy_id    TEXT          NOT NULL REFERENCES deployments(deploy_id),
        block_number BIGINT        NOT NULL,
        from_address TEXT          NOT NULL,
        to_address   TEXT          NOT NULL,
        amount_dust  BIGINT        NOT NULL,
        amount_rev   NUMERIC(28,8) GENERATED ALWAYS AS (amount_dust::NUMERIC / 100000000) STORED,
        status       TEXT          NOT NULL,
        UNIQUE (deploy_id, from_address, to_address, amount_dust)
    )",
    "CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_address, block_number DESC)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_address, block_number DESC)",
    "CREATE TABLE IF NOT EXISTS validator_bonds (
        block_number BIGINT NOT NULL,
        validator    TEXT   NOT NULL,
        block_hash   TEXT   NOT NULL,
        stake        BIGINT NOT NULL,
        PRIMARY KEY (block_number, validator)
    )",
    "CREATE TABLE IF NOT EXISTS balance_states (
        address       TEXT   NOT NULL,
        block_number  BIGINT NOT NULL,
        bonded_dust   BIGINT NOT NULL,
        unbonded_dust BIGINT NOT NULL,
        total_dust    BIGINT GENERATED ALWAYS AS (bonded_dust + unbonded_dust) STORED,
        bonded_rev    NUMERIC(28,8) GENERATED ALWAYS AS (bonded_dust::NUMERIC / 100000000) STORED,
        unbonded_rev  NUMERIC(28,8) GENERATED ALWAYS AS (unbonded_dust::NUMERIC / 100000000) STORED,
        total_rev     NUMERIC(28,8) GENERATED ALWAYS AS ((bonded_dust + unbonded_dust)::NUMERIC / 100000000) STORED,
        PRIMARY KEY (address, block_number)
    )",
    "CREATE TABLE IF NOT EXISTS validators (
        public_key       TEXT        PRIMARY KEY,
        name             TEXT,
        stake            BIGINT      NOT NULL,
        first_seen_block BIGINT      NOT NULL,
        last_seen_block  BIGINT      NOT NULL,
        status           TEXT        NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (first_seen_block <= last_seen_block)
    )",
    "CREATE TABLE IF NOT EXISTS network_stats (
        id                     BIGSERIAL        PRIMARY KEY,
        block_number           BIGINT           NOT NULL,
        recorded_at            TIMESTAMPTZ      NOT NULL,
        total_validators       INTEGER          NOT NULL,
        active_validators      INTEGER          NOT NULL,
        quarantined_validators INTEGER          NOT NULL,
        total_bonded_dust      BIGINT           NOT NULL,
        last_finalized_height  BIGINT           NOT NULL,
        fault_tolerance        DOUBLE PRECISION
    )",
    "CREATE TABLE IF NOT EXISTS epoch_transitions (
        epoch_number       BIGINT      PRIMARY KEY,
        start_block        BIGINT      NOT NULL,
        end_block          BIGINT      NOT NULL,
        epoch_length       BIGINT      NOT NULL,
        active_validators  INTEGER     NOT NULL,
        detected_at_height BIGINT      NOT NULL,
        recorded_at        TIMESTAMPTZ NOT NULL
    )",
];

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn block_write(height: u64, hash: &str) -> impl FnOnce(sqlx::Error) -> IndexerError + '_ {
    move |e| {
        let code = e.as_database_error().and_then(|d| d.code());
        if code.as_deref() == Some(UNIQUE_VIOLATION) {
            IndexerError::InvariantViolation(format!("block hash {hash} is already stored at a height other than {height}"))
        } else {
            storage(e)
        }
    }
}

// ─── PostgresStore ────────────────────────────────────────────────────────────

/// PostgreSQL-backed index store. Cheap to clone; wraps a connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a pool of at most `max_connections`. Call
    /// [`IndexStore::init`] before use.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))?;
        info!(max_connections, "PostgresStore connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn cursor_for_update(tx: &mut Transaction<'_, Postgres>) -> Result<SyncCursor, IndexerError> {
        let row = sqlx::query("SELECT value FROM indexer_state WHERE key = $1 FOR UPDATE")
            .bind(CURSOR_KEY)
            .fetch_optional(&mut **tx)
            .await
            .map_err(storage)?;
        let value: Option<String> = row.map(|r| r.get("value"));
        SyncCursor::decode(value.as_deref())
    }

    async fn write_cursor(tx: &mut Transaction<'_, Postgres>, cursor: &SyncCursor) -> Result<(), IndexerError> {
        match cursor.encode() {
            Some(value) => {
                sqlx::query(
                    "INSERT INTO indexer_state (key, value, updated_at) VALUES ($1, $2, NOW())
                     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
                )
                .bind(CURSOR_KEY)
                .bind(value)
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
            }
            None => {
                sqlx::query("DELETE FROM indexer_state WHERE key = $1")
                    .bind(CURSOR_KEY)
                    .execute(&mut **tx)
                    .await
                    .map_err(storage)?;
            }
        }
        Ok(())
    }

    async fn write_rows(tx: &mut Transaction<'_, Postgres>, commit: &BlockCommit) -> Result<(), IndexerError> {
        let b = &commit.block;
        let bonds = serde_json::to_value(&b.bonds).map_err(|e| IndexerError::Storage(format!("encode bonds: {e}")))?;
        let justifications = serde_json::to_value(&b.justifications)
            .map_err(|e| IndexerError::Storage(format!("encode justifications: {e}")))?;
        sqlx::query(
            "INSERT INTO blocks (block_number, block_hash, parent_hash, timestamp, proposer,
                pre_state_hash, post_state_hash, finalized, fault_tolerance, bonds, justifications)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (block_number) DO UPDATE SET
                block_hash      = EXCLUDED.block_hash,
                parent_hash     = EXCLUDED.parent_hash,
                timestamp       = EXCLUDED.timestamp,
                proposer        = EXCLUDED.proposer,
                pre_state_hash  = EXCLUDED.pre_state_hash,
                post_state_hash = EXCLUDED.post_state_hash,
                finalized       = EXCLUDED.finalized,
                fault_tolerance = EXCLUDED.fault_tolerance,
                bonds           = EXCLUDED.bonds,
                justifications  = EXCLUDED.justifications",
        )
        .bind(b.height as i64)
        .bind(&b.hash)
        .bind(&b.parent_hash)
        .bind(b.timestamp)
        .bind(&b.proposer)
        .bind(&b.pre_state_hash)
        .bind(&b.post_state_hash)
        .bind(b.finalized)
        .bind(b.fault_tolerance)
        .bind(bonds)
        .bind(justifications)
        .execute(&mut **tx)
        .await
        .map_err(block_write(b.height, &b.hash))?;

        for d in &commit.deployments {
            sqlx::query(
                "INSERT INTO deployments (deploy_id, block_number, block_hash, deployer, term, timestamp,
                    phlo_price, phlo_limit, phlo_cost, errored, error_message, deployment_type, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (deploy_id) DO UPDATE SET
                    block_number    = EXCLUDED.block_number,
                    block_hash      = EXCLUDED.block_hash,
                    phlo_cost       = EXCLUDED.phlo_cost,
                    errored         = EXCLUDED.errored,
                    error_message   = EXCLUDED.error_message,
                    deployment_type = EXCLUDED.deployment_type,
                    status          = EXCLUDED.status",
            )
            .bind(&d.deploy_id)
            .bind(d.block_height as i64)
            .bind(&d.block_hash)
            .bind(&d.deployer)
            .bind(&d.term)
            .bind(d.timestamp)
            .bind(d.phlo_price)
            .bind(d.phlo_limit)
            .bind(d.phlo_cost)
            .bind(d.errored())
            .bind(d.error_message())
            .bind(d.deployment_type.as_str())
            .bind(d.status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
        }

        for t in &commit.transfers {
            sqlx::query(
                "INSERT INTO transfers (deploy_id, block_number, from_address, to_address, amount_dust, status)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (deploy_id, from_address, to_address, amount_dust)
                 DO UPDATE SET status = EXCLUDED.status, block_number = EXCLUDED.block_number",
            )
            .bind(&t.deploy_id)
            .bind(t.block_height as i64)
            .bind(&t.from_address)
            .bind(&t.to_address)
            .bind(t.amount_dust())
            .bind(t.status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
        }

        for bond in &commit.bonds {
            sqlx::query(
                "INSERT INTO validator_bonds (block_number, validator, block_hash, stake)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (block_number, validator)
                 DO UPDATE SET block_hash = EXCLUDED.block_hash, stake = EXCLUDED.stake",
            )
            .bind(bond.block_height as i64)
            .bind(&bond.validator)
            .bind(&bond.block_hash)
            .bind(bond.stake)
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
        }

        for bal in &commit.balances {
            sqlx::query(
                "INSERT INTO balance_states (address, block_number, bonded_dust, unbonded_dust)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (address, block_number)
                 DO UPDATE SET bonded_dust = EXCLUDED.bonded_dust, unbonded_dust = EXCLUDED.unbonded_dust",
            )
            .bind(&bal.address)
            .bind(bal.block_height as i64)
            .bind(bal.bonded_dust)
            .bind(bal.unbonded_dust)
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
        }

        for s in &commit.validators {
            let status = if s.stake.is_some() {
                ValidatorStatus::Bonded
            } else {
                ValidatorStatus::Active
            };
            sqlx::query(
                "INSERT INTO validators (public_key, stake, first_seen_block, last_seen_block, status)
                 VALUES ($1, COALESCE($2, 0), $3, $3, $4)
                 ON CONFLICT (public_key) DO UPDATE SET
                    stake            = COALESCE($2, validators.stake),
                    first_seen_block = LEAST(validators.first_seen_block, EXCLUDED.first_seen_block),
                    last_seen_block  = GREATEST(validators.last_seen_block, EXCLUDED.last_seen_block),
                    updated_at       = NOW()",
            )
            .bind(&s.public_key)
            .bind(s.stake)
            .bind(s.height as i64)
            .bind(status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(storage)?;
        }
        Ok(())
    }
}

fn validator_from_row(r: &PgRow) -> Result<Validator, IndexerError> {
    let status: String = r.try_get("status").map_err(storage)?;
    Ok(Validator {
        public_key: r.try_get("public_key").map_err(storage)?,
        name: r.try_get("name").map_err(storage)?,
        stake: r.try_get("stake").map_err(storage)?,
        first_seen_block: r.try_get::<i64, _>("first_seen_block").map_err(storage)? as u64,
        last_seen_block: r.try_get::<i64, _>("last_seen_block").map_err(storage)? as u64,
        status: ValidatorStatus::parse(&status)
            .ok_or_else(|| IndexerError::Storage(format!("unknown validator status {status:?}")))?,
    })
}

// ─── IndexStore impl ──────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for PostgresStore {
    async fn init(&self) -> Result<(), IndexerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(format!("schema init failed: {e}\nSQL: {stmt}")))?;
        }
        self.set_meta(SCHEMA_VERSION_KEY, SCHEMA_VERSION).await?;
        debug!("PostgresStore schema initialized");
        Ok(())
    }

    async fn load_cursor(&self) -> Result<SyncCursor, IndexerError> {
        let value = self.get_meta(CURSOR_KEY).await?;
        SyncCursor::decode(value.as_deref())
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        Self::write_cursor(&mut tx, cursor).await?;
        tx.commit().await.map_err(storage)?;
        info!(cursor = ?cursor.height(), "cursor overwritten");
        Ok(())
    }

    async fn block_hash(&self, height: u64) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT block_hash FROM blocks WHERE block_number = $1")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.get::<String, _>("block_hash")))
    }

    async fn block_hashes(&self, from: u64, to: u64) -> Result<Vec<(u64, String)>, IndexerError> {
        let rows = sqlx::query(
            "SELECT block_number, block_hash FROM blocks
             WHERE block_number >= $1 AND block_number <= $2
             ORDER BY block_number ASC",
        )
        .bind(from as i64)
        .bind(to as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("block_number") as u64, r.get::<String, _>("block_hash")))
            .collect())
    }

    async fn commit_block(&self, commit: &BlockCommit, cursor: &SyncCursor) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let current = Self::cursor_for_update(&mut tx).await?;
        if let (Some(cur), Some(new)) = (current.height(), cursor.height()) {
            if new < cur {
                return Err(IndexerError::InvariantViolation(format!(
                    "commit of block {} would move cursor back from {cur} to {new}",
                    commit.height()
                )));
            }
        }

        Self::write_rows(&mut tx, commit).await?;
        Self::write_cursor(&mut tx, cursor).await?;

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(format!("commit block {}: {e}", commit.height())))?;
        debug!(
            block_height = commit.height(),
            deployments = commit.deployments.len(),
            transfers = commit.transfers.len(),
            "block committed"
        );
        Ok(())
    }

    async fn balance_before(&self, address: &str, height: u64) -> Result<Option<BalanceState>, IndexerError> {
        let row = sqlx::query(
            "SELECT address, block_number, bonded_dust, unbonded_dust FROM balance_states
             WHERE address = $1 AND block_number < $2
             ORDER BY block_number DESC LIMIT 1",
        )
        .bind(address)
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|r| BalanceState {
            address: r.get("address"),
            block_height: r.get::<i64, _>("block_number") as u64,
            bonded_dust: r.get("bonded_dust"),
            unbonded_dust: r.get("unbonded_dust"),
        }))
    }

    async fn bonds_before(&self, height: u64) -> Result<Vec<ValidatorBond>, IndexerError> {
        let rows = sqlx::query(
            "SELECT block_number, block_hash, validator, stake FROM validator_bonds
             WHERE block_number = (SELECT MAX(block_number) FROM validator_bonds WHERE block_number < $1)
             ORDER BY validator",
        )
        .bind(height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows
            .into_iter()
            .map(|r| ValidatorBond {
                block_height: r.get::<i64, _>("block_number") as u64,
                block_hash: r.get("block_hash"),
                validator: r.get("validator"),
                stake: r.get("stake"),
            })
            .collect())
    }

    async fn validators(&self) -> Result<Vec<Validator>, IndexerError> {
        let rows = sqlx::query(
            "SELECT public_key, name, stake, first_seen_block, last_seen_block, status
             FROM validators ORDER BY public_key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(validator_from_row).collect()
    }

    async fn upsert_validators(&self, validators: &[Validator]) -> Result<(), IndexerError> {
        if validators.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for v in validators {
            sqlx::query(
                "INSERT INTO validators (public_key, name, stake, first_seen_block, last_seen_block, status)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (public_key) DO UPDATE SET
                    name             = COALESCE(EXCLUDED.name, validators.name),
                    stake            = EXCLUDED.stake,
                    first_seen_block = LEAST(validators.first_seen_block, EXCLUDED.first_seen_block),
                    last_seen_block  = GREATEST(validators.last_seen_block, EXCLUDED.last_seen_block),
                    status           = EXCLUDED.status,
                    updated_at       = NOW()",
            )
            .bind(&v.public_key)
            .bind(&v.name)
            .bind(v.stake)
            .bind(v.first_seen_block as i64)
            .bind(v.last_seen_block as i64)
            .bind(v.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn insert_network_stats(&self, stats: &NetworkStats) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO network_stats (block_number, recorded_at, total_validators, active_validators,
                quarantined_validators, total_bonded_dust, last_finalized_height, fault_tolerance)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(stats.block_height as i64)
        .bind(stats.recorded_at)
        .bind(stats.total_validators as i32)
        .bind(stats.active_validators as i32)
        .bind(stats.quarantined_validators as i32)
        .bind(stats.total_bonded_dust)
        .bind(stats.last_finalized_height as i64)
        .bind(stats.fault_tolerance)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn latest_epoch(&self) -> Result<Option<EpochTransition>, IndexerError> {
        let row = sqlx::query(
            "SELECT epoch_number, start_block, end_block, epoch_length, active_validators,
                    detected_at_height, recorded_at
             FROM epoch_transitions ORDER BY epoch_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|r| EpochTransition {
            epoch_number: r.get::<i64, _>("epoch_number") as u64,
            start_block: r.get::<i64, _>("start_block") as u64,
            end_block: r.get::<i64, _>("end_block") as u64,
            epoch_length: r.get::<i64, _>("epoch_length") as u64,
            active_validators: r.get::<i32, _>("active_validators") as u32,
            detected_at_height: r.get::<i64, _>("detected_at_height") as u64,
            recorded_at: r.get::<DateTime<Utc>, _>("recorded_at"),
        }))
    }

    async fn insert_epoch_transition(&self, t: &EpochTransition) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO epoch_transitions (epoch_number, start_block, end_block, epoch_length,
                active_validators, detected_at_height, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (epoch_number) DO NOTHING",
        )
        .bind(t.epoch_number as i64)
        .bind(t.start_block as i64)
        .bind(t.end_block as i64)
        .bind(t.epoch_length as i64)
        .bind(t.active_validators as i32)
        .bind(t.detected_at_height as i64)
        .bind(t.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT value FROM indexer_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO indexer_state (key, value, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
