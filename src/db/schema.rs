//! Schema bootstrap
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements for every table the
//! Postgres-backed stores use. Movement and transaction rows are append-only;
//! only their status columns are updated.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS wallet_balances_tb (
        wallet_id   TEXT PRIMARY KEY,
        currency    VARCHAR(8) NOT NULL,
        balance     NUMERIC(36, 8) NOT NULL DEFAULT 0,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS wallet_locks_tb (
        wallet_id   TEXT NOT NULL REFERENCES wallet_balances_tb (wallet_id),
        reference   TEXT NOT NULL,
        amount      NUMERIC(36, 8) NOT NULL CHECK (amount > 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (wallet_id, reference)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ledger_transactions_tb (
        transaction_id      UUID PRIMARY KEY,
        reference           TEXT NOT NULL UNIQUE,
        kind                VARCHAR(32) NOT NULL,
        status              VARCHAR(16) NOT NULL,
        user_id             BIGINT,
        instance_id         TEXT,
        amount              NUMERIC(36, 8) NOT NULL,
        currency            VARCHAR(8) NOT NULL,
        provider_reference  TEXT,
        failure_reason      TEXT,
        created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ledger_movements_tb (
        movement_id      BIGSERIAL PRIMARY KEY,
        transaction_id   UUID NOT NULL REFERENCES ledger_transactions_tb (transaction_id),
        reference        TEXT NOT NULL,
        account_id       TEXT NOT NULL,
        direction        VARCHAR(8) NOT NULL,
        amount           NUMERIC(36, 8) NOT NULL CHECK (amount > 0),
        currency         VARCHAR(8) NOT NULL,
        balance_after    NUMERIC(36, 8) NOT NULL,
        user_id          BIGINT,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_movements_tx ON ledger_movements_tb (transaction_id)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_movements_account ON ledger_movements_tb (account_id, created_at)",
    r#"CREATE TABLE IF NOT EXISTS aggregator_instances_tb (
        instance_id         TEXT PRIMARY KEY,
        provider            VARCHAR(32) NOT NULL,
        priority            INTEGER NOT NULL,
        enabled             BOOLEAN NOT NULL DEFAULT TRUE,
        paused              BOOLEAN NOT NULL DEFAULT FALSE,
        allowed_countries   TEXT[] NOT NULL DEFAULT '{}',
        hot_wallet_id       TEXT NOT NULL,
        daily_limit         NUMERIC(36, 8),
        monthly_limit       NUMERIC(36, 8),
        daily_usage         NUMERIC(36, 8) NOT NULL DEFAULT 0,
        monthly_usage       NUMERIC(36, 8) NOT NULL DEFAULT 0,
        day_window_start    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        month_window_start  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS internal_transfers_tb (
        transfer_id            VARCHAR(26) PRIMARY KEY,
        reference              TEXT NOT NULL UNIQUE,
        sender_wallet          TEXT NOT NULL,
        sender_user            BIGINT NOT NULL,
        recipient_wallet       TEXT NOT NULL,
        recipient_user         BIGINT NOT NULL,
        sender_amount          NUMERIC(36, 8) NOT NULL,
        sender_currency        VARCHAR(8) NOT NULL,
        recipient_amount       NUMERIC(36, 8),
        recipient_currency     VARCHAR(8) NOT NULL,
        exchange_rate          NUMERIC(36, 12),
        transfer_fee           NUMERIC(36, 8) NOT NULL DEFAULT 0,
        conversion_fee         NUMERIC(36, 8) NOT NULL DEFAULT 0,
        kind                   VARCHAR(16) NOT NULL,
        status                 SMALLINT NOT NULL,
        failure_reason         TEXT,
        created_at             TIMESTAMPTZ NOT NULL,
        locked_at              TIMESTAMPTZ,
        estimated_unlock_at    TIMESTAMPTZ,
        completed_at           TIMESTAMPTZ,
        updated_at             TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_internal_transfers_status ON internal_transfers_tb (status, estimated_unlock_at)",
];

/// Create every table and index if missing
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(tables = 6, "Database schema ready");
    Ok(())
}
