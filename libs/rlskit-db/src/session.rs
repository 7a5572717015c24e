//! Writing an [`RlsContext`] into `PostgreSQL` session variables.
//!
//! Every configured field owns two variables:
//!
//! | variable              | content                                          |
//! |-----------------------|--------------------------------------------------|
//! | `<prefix>.<field>`    | wire form of a concrete value, `''` otherwise    |
//! | `<prefix>_mode.<field>` | `value`, `all`, `none`, or `''` when unset     |
//!
//! Policies branch on the mode variable, so no value a caller can put in the
//! first variable is ever interpreted as a wildcard.
//!
//! Variables are written with `set_config()` and bound parameters. A field the
//! context does not mention is reset to `''` on every application, so nothing
//! from a previous request survives on a reused connection.

use async_trait::async_trait;
use rlskit_security::{RlsContext, RlsSettings, RlsValue};
use sea_orm::{ConnectionTrait, DatabaseTransaction, Statement};

use crate::{DbEngine, Result};

/// Interpretation of a field's value variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Compare the column with the value variable.
    Value,
    /// Wildcard: every row matches.
    All,
    /// Explicitly unrestricted by identity, but matches no row.
    None,
    /// Field not supplied for this request.
    Reset,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::All => "all",
            Self::None => "none",
            Self::Reset => "",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `set_config(name, value, ..)` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionAssignment {
    pub name: String,
    pub value: String,
}

impl SessionAssignment {
    fn new(name: String, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Ordered assignments for every configured field: value variable first,
/// mode variable second, fields in `enforce_fields` order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionPlan {
    assignments: Vec<SessionAssignment>,
}

impl SessionPlan {
    /// Plan for `ctx`. Keys of `ctx` outside `enforce_fields` are ignored.
    #[must_use]
    pub fn build(settings: &RlsSettings, ctx: &RlsContext) -> Self {
        let mut assignments = Vec::with_capacity(settings.enforce_fields.len() * 2);
        for field in &settings.enforce_fields {
            let (value, mode) = match ctx.get(field) {
                Some(RlsValue::Concrete(v)) => (v.to_wire(), SessionMode::Value),
                Some(RlsValue::All) => (String::new(), SessionMode::All),
                Some(RlsValue::NoValue) => (String::new(), SessionMode::None),
                None => (String::new(), SessionMode::Reset),
            };
            assignments.push(SessionAssignment::new(settings.value_var(field), value));
            assignments.push(SessionAssignment::new(settings.mode_var(field), mode.as_str()));
        }
        Self { assignments }
    }

    /// Plan that clears every configured field.
    #[must_use]
    pub fn reset(settings: &RlsSettings) -> Self {
        Self::build(settings, &RlsContext::empty())
    }

    #[must_use]
    pub fn assignments(&self) -> &[SessionAssignment] {
        &self.assignments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Outcome of [`apply_session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The backend has no session variables; nothing was written.
    Skipped(DbEngine),
    /// Number of variables written.
    Written(usize),
}

/// Sink for session variable assignments on one connection.
#[async_trait]
pub trait SessionVarWriter: Send {
    fn engine(&self) -> DbEngine;

    /// # Errors
    /// Returns the driver error of the failed assignment.
    async fn write(&mut self, name: &str, value: &str) -> Result<()>;
}

/// Session-scoped writer for a pooled `PostgreSQL` connection.
///
/// Values outlive transactions, so the pool must reset them on release.
#[cfg(feature = "pg")]
pub struct PgSessionWriter<'c>(pub &'c mut sea_orm::sqlx::PgConnection);

#[cfg(feature = "pg")]
#[async_trait]
impl SessionVarWriter for PgSessionWriter<'_> {
    fn engine(&self) -> DbEngine {
        DbEngine::Postgres
    }

    async fn write(&mut self, name: &str, value: &str) -> Result<()> {
        sea_orm::sqlx::query("SELECT set_config($1, $2, false)")
            .bind(name)
            .bind(value)
            .execute(&mut *self.0)
            .await?;
        Ok(())
    }
}

/// Transaction-scoped writer: values vanish at commit or rollback.
pub struct TxSessionWriter<'t>(pub &'t DatabaseTransaction);

#[async_trait]
impl SessionVarWriter for TxSessionWriter<'_> {
    fn engine(&self) -> DbEngine {
        self.0.get_database_backend().into()
    }

    async fn write(&mut self, name: &str, value: &str) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            self.0.get_database_backend(),
            "SELECT set_config($1, $2, true)",
            [name.into(), value.into()],
        );
        self.0.execute(stmt).await?;
        Ok(())
    }
}

/// Write `ctx` through `writer`.
///
/// Backends without session variables are skipped, which is not an error.
///
/// # Errors
/// Returns the first failed assignment. Earlier assignments of the same call
/// may already be in effect, so the caller must discard the connection.
pub async fn apply_session<W>(
    writer: &mut W,
    settings: &RlsSettings,
    ctx: &RlsContext,
) -> Result<Applied>
where
    W: SessionVarWriter + ?Sized,
{
    write_plan(writer, &SessionPlan::build(settings, ctx)).await
}

/// Reset every configured field on the connection behind `writer`.
///
/// # Errors
/// Same as [`apply_session`].
pub async fn reset_session<W>(writer: &mut W, settings: &RlsSettings) -> Result<Applied>
where
    W: SessionVarWriter + ?Sized,
{
    write_plan(writer, &SessionPlan::reset(settings)).await
}

async fn write_plan<W>(writer: &mut W, plan: &SessionPlan) -> Result<Applied>
where
    W: SessionVarWriter + ?Sized,
{
    let engine = writer.engine();
    if !engine.supports_session_vars() {
        tracing::debug!(engine = engine.as_str(), "no session variables; RLS context not applied");
        return Ok(Applied::Skipped(engine));
    }

    for a in plan.assignments() {
        writer.write(&a.name, &a.value).await?;
    }
    tracing::trace!(vars = plan.len(), "RLS session variables written");
    Ok(Applied::Written(plan.len()))
}
