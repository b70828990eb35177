//! PostgreSQL implementation of the session and credential stores.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use super::{ClaimOutcome, CredentialStore, MarkOutcome, PurchaseIntent, SessionStore};
use crate::credential::{CredentialSecret, IssuedCredential, Tier};
use crate::error::{IssuanceError, Result};
use crate::token::OneTimeToken;

/// Table names, configurable per deployment.
#[derive(Clone, Debug)]
pub struct TableNames {
    pub purchases: String,
    pub credentials: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            purchases: "purchase_intents".into(),
            credentials: "issued_credentials".into(),
        }
    }
}

impl TableNames {
    fn validate(&self) -> Result<()> {
        for name in [&self.purchases, &self.credentials] {
            let ok = !name.is_empty()
                && name.len() <= 63
                && name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !ok {
                return Err(IssuanceError::Config(format!(
                    "invalid table name: {name:?}"
                )));
            }
        }
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> IssuanceError {
    IssuanceError::Persistence(e.to_string())
}

pub struct PgStore {
    pool: PgPool,
    tables: TableNames,
}

impl PgStore {
    /// Connect and make sure both tables exist.
    pub async fn connect(database_url: &str, tables: TableNames) -> Result<Self> {
        tables.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool, tables };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let purchases = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                session_id TEXT PRIMARY KEY,
                requester TEXT NOT NULL,
                one_time_token TEXT NOT NULL,
                tier TEXT NOT NULL,
                issued BOOLEAN NOT NULL DEFAULT FALSE,
                claimed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                issued_at TIMESTAMPTZ
            )",
            self.tables.purchases
        );
        let credentials = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                owner TEXT NOT NULL,
                tier TEXT NOT NULL,
                session_id TEXT NOT NULL,
                credential_id TEXT NOT NULL,
                credential_value TEXT NOT NULL,
                issued_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (owner, tier, session_id)
            )",
            self.tables.credentials
        );

        sqlx::query(&purchases)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query(&credentials)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        tracing::info!(
            purchases = %self.tables.purchases,
            credentials = %self.tables.credentials,
            "Store schema ready"
        );
        Ok(())
    }

    fn parse_tier(s: &str) -> Result<Tier> {
        Tier::parse(s).ok_or_else(|| IssuanceError::Persistence(format!("unknown tier {s:?}")))
    }

    fn row_to_intent(r: &PgRow) -> Result<PurchaseIntent> {
        let tier: String = r.try_get("tier").map_err(db_err)?;
        Ok(PurchaseIntent {
            session_id: r.try_get("session_id").map_err(db_err)?,
            requester: r.try_get("requester").map_err(db_err)?,
            one_time_token: OneTimeToken::from_stored(
                r.try_get::<String, _>("one_time_token").map_err(db_err)?,
            ),
            tier: Self::parse_tier(&tier)?,
            issued: r.try_get("issued").map_err(db_err)?,
            claimed_at: r.try_get("claimed_at").map_err(db_err)?,
            created_at: r.try_get("created_at").map_err(db_err)?,
            issued_at: r.try_get("issued_at").map_err(db_err)?,
        })
    }

    fn row_to_credential(r: &PgRow) -> Result<IssuedCredential> {
        let tier: String = r.try_get("tier").map_err(db_err)?;
        Ok(IssuedCredential {
            owner: r.try_get("owner").map_err(db_err)?,
            tier: Self::parse_tier(&tier)?,
            credential_id: r.try_get("credential_id").map_err(db_err)?,
            value: CredentialSecret::new(
                r.try_get::<String, _>("credential_value").map_err(db_err)?,
            ),
            session_id: r.try_get("session_id").map_err(db_err)?,
            issued_at: r.try_get::<DateTime<Utc>, _>("issued_at").map_err(db_err)?,
        })
    }

    /// Tell a lost race apart from a missing row.
    async fn exists(&self, session_id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE session_id = $1",
            self.tables.purchases
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn put(&self, intent: &PurchaseIntent) -> Result<()> {
        // Re-running a put for the same session is allowed until it is claimed.
        let sql = format!(
            "INSERT INTO {t} (session_id, requester, one_time_token, tier, issued, claimed_at, created_at, issued_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (session_id) DO UPDATE SET
                requester = EXCLUDED.requester,
                one_time_token = EXCLUDED.one_time_token,
                tier = EXCLUDED.tier
             WHERE {t}.claimed_at IS NULL AND {t}.issued = FALSE",
            t = self.tables.purchases
        );
        sqlx::query(&sql)
            .bind(&intent.session_id)
            .bind(&intent.requester)
            .bind(intent.one_time_token.as_str())
            .bind(intent.tier.as_str())
            .bind(intent.issued)
            .bind(intent.claimed_at)
            .bind(intent.created_at)
            .bind(intent.issued_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<PurchaseIntent>> {
        let sql = format!(
            "SELECT session_id, requester, one_time_token, tier, issued, claimed_at, created_at, issued_at
             FROM {} WHERE session_id = $1",
            self.tables.purchases
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_intent).transpose()
    }

    async fn try_claim(&self, session_id: &str) -> Result<ClaimOutcome> {
        let sql = format!(
            "UPDATE {} SET claimed_at = NOW()
             WHERE session_id = $1 AND claimed_at IS NULL AND issued = FALSE",
            self.tables.purchases
        );
        let result = sqlx::query(&sql)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }
        if self.exists(session_id).await? {
            Ok(ClaimOutcome::AlreadyClaimed)
        } else {
            Ok(ClaimOutcome::Missing)
        }
    }

    async fn mark_issued(&self, session_id: &str) -> Result<MarkOutcome> {
        let sql = format!(
            "UPDATE {} SET issued = TRUE, issued_at = NOW()
             WHERE session_id = $1 AND claimed_at IS NOT NULL AND issued = FALSE",
            self.tables.purchases
        );
        let result = sqlx::query(&sql)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(MarkOutcome::Marked);
        }
        if self.exists(session_id).await? {
            Ok(MarkOutcome::Rejected)
        } else {
            Ok(MarkOutcome::Missing)
        }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn save(&self, credential: &IssuedCredential) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (owner, tier, session_id, credential_id, credential_value, issued_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.tables.credentials
        );
        sqlx::query(&sql)
            .bind(&credential.owner)
            .bind(credential.tier.as_str())
            .bind(&credential.session_id)
            .bind(&credential.credential_id)
            .bind(credential.value.expose())
            .bind(credential.issued_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_owner(&self, owner: &str, tier: Tier) -> Result<Vec<IssuedCredential>> {
        let sql = format!(
            "SELECT owner, tier, session_id, credential_id, credential_value, issued_at
             FROM {} WHERE owner = $1 AND tier = $2 ORDER BY issued_at",
            self.tables.credentials
        );
        let rows = sqlx::query(&sql)
            .bind(owner)
            .bind(tier.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(Self::row_to_credential).collect()
    }
}
