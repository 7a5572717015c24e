//! Pool handle that only hands out connections carrying an RLS context.
//!
//! Session variables set on a pooled connection survive its return to the
//! pool. Two rules keep one request's context from leaking into another:
//! every checkout writes all configured fields (resetting the ones the
//! context lacks), and the release hook resets them again. A connection whose
//! reset fails is closed instead of being reused.
//!
//! `SeaORM`'s pooled [`DatabaseConnection`] may run consecutive statements on
//! different connections, so it is only used through [`RlsDb::begin`], where
//! the variables are transaction-local.

use std::sync::Arc;

use rlskit_security::{RlsContext, RlsSettings};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::pool_opts::{ApplyPoolOpts, ConnectOpts};
use crate::session::{TxSessionWriter, apply_session};
use crate::{DbEngine, DbError, Result, redact_dsn};

#[cfg(feature = "pg")]
use crate::session::{PgSessionWriter, reset_session};
#[cfg(feature = "pg")]
use sea_orm::SqlxPostgresConnector;
#[cfg(feature = "sqlite")]
use sea_orm::SqlxSqliteConnector;
#[cfg(feature = "pg")]
use sea_orm::sqlx::{PgPool, Postgres, postgres::PgPoolOptions};
#[cfg(feature = "sqlite")]
use sea_orm::sqlx::{Sqlite, SqlitePool, sqlite::SqlitePoolOptions};

#[derive(Clone, Debug)]
enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// A pooled connection with the request's RLS context applied.
///
/// Returned to the pool (and reset) on drop.
#[derive(Debug)]
pub enum RlsConn {
    #[cfg(feature = "pg")]
    Postgres(sea_orm::sqlx::pool::PoolConnection<Postgres>),
    #[cfg(feature = "sqlite")]
    Sqlite(sea_orm::sqlx::pool::PoolConnection<Sqlite>),
}

impl RlsConn {
    #[cfg(feature = "pg")]
    pub fn as_postgres(&mut self) -> Option<&mut sea_orm::sqlx::PgConnection> {
        match self {
            Self::Postgres(c) => Some(&mut **c),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => None,
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn as_sqlite(&mut self) -> Option<&mut sea_orm::sqlx::SqliteConnection> {
        match self {
            Self::Sqlite(c) => Some(&mut **c),
            #[cfg(feature = "pg")]
            Self::Postgres(_) => None,
        }
    }
}

/// Database handle bound to one [`RlsSettings`].
#[derive(Clone, Debug)]
pub struct RlsDb {
    engine: DbEngine,
    pool: DbPool,
    sea: DatabaseConnection,
    settings: Arc<RlsSettings>,
}

impl RlsDb {
    /// Connect and install the release hook.
    ///
    /// # Errors
    /// Returns `DbError` if the DSN is unknown, its backend is not compiled
    /// in, or the connection fails.
    pub async fn connect(
        dsn: &str,
        opts: &ConnectOpts,
        settings: Arc<RlsSettings>,
    ) -> Result<Self> {
        let engine = DbEngine::detect(dsn)?;
        tracing::debug!(engine = engine.as_str(), dsn = %redact_dsn(dsn), "connecting");

        match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let on_release = Arc::clone(&settings);
                let pool = PgPoolOptions::new()
                    .apply(opts)
                    .after_release(move |conn, _meta| {
                        let settings = Arc::clone(&on_release);
                        Box::pin(async move {
                            match reset_session(&mut PgSessionWriter(conn), &settings).await {
                                Ok(_) => Ok(true),
                                Err(e) => {
                                    tracing::warn!(
                                        error = %e,
                                        "RLS reset failed; closing connection"
                                    );
                                    Ok(false)
                                }
                            }
                        })
                    })
                    .connect(dsn)
                    .await?;
                let sea = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
                Ok(Self {
                    engine,
                    pool: DbPool::Postgres(pool),
                    sea,
                    settings,
                })
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(DbError::FeatureDisabled("PostgreSQL feature not enabled")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let pool = SqlitePoolOptions::new().apply(opts).connect(dsn).await?;
                let sea = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());
                Ok(Self {
                    engine,
                    pool: DbPool::Sqlite(pool),
                    sea,
                    settings,
                })
            }
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(DbError::FeatureDisabled("SQLite feature not enabled")),
            DbEngine::MySql => Err(DbError::FeatureDisabled("MySQL is not supported")),
        }
    }

    /// Check out a connection with `ctx` applied to its session.
    ///
    /// # Errors
    /// Returns `DbError` if acquisition or any assignment fails. A connection
    /// that failed mid-assignment is closed, never returned to the pool.
    pub async fn acquire(&self, ctx: &RlsContext) -> Result<RlsConn> {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                let applied =
                    apply_session(&mut PgSessionWriter(&mut *conn), &self.settings, ctx).await;
                if let Err(e) = applied {
                    conn.close_on_drop();
                    return Err(e);
                }
                Ok(RlsConn::Postgres(conn))
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                tracing::debug!(
                    engine = "sqlite",
                    "no session variables; RLS context not applied"
                );
                Ok(RlsConn::Sqlite(pool.acquire().await?))
            }
        }
    }

    /// Begin a transaction with `ctx` applied for its duration.
    ///
    /// # Errors
    /// Returns `DbError` if the transaction cannot be started or the context
    /// cannot be applied; the transaction is rolled back in the latter case.
    pub async fn begin(&self, ctx: &RlsContext) -> Result<DatabaseTransaction> {
        let txn = self.sea.begin().await?;
        apply_session(&mut TxSessionWriter(&txn), &self.settings, ctx).await?;
        Ok(txn)
    }

    /// Run a multi-statement script outside any RLS context.
    ///
    /// # Errors
    /// Returns `DbError::Sea` if any statement fails.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        self.sea.execute_unprepared(sql).await?;
        Ok(())
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    #[must_use]
    pub fn settings(&self) -> &RlsSettings {
        &self.settings
    }

    /// Underlying `SeaORM` connection. Statements run on it carry no RLS
    /// context; use [`RlsDb::begin`] for scoped access.
    #[must_use]
    pub fn sea(&self) -> &DatabaseConnection {
        &self.sea
    }

    pub async fn close(self) {
        match self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }
}
