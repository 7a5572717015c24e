//! Auto-fill of RLS columns on new records.
//!
//! Entities opt in through [`RlsScopedEntity`] and the `tenant_scoped`
//! setting. Only columns the caller left `NotSet` are filled, and only from
//! concrete context values: wildcards never reach a row.

use std::str::FromStr;

use rlskit_security::{RlsContext, RlsSettings, RlsValue, Scalar};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ColumnType, ConnectionTrait, DbErr, EntityTrait,
    Value,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutofillError {
    #[error("cannot store {field}={value} in {entity}.{field} of type {column_type}")]
    TypeMismatch {
        entity: &'static str,
        field: String,
        value: String,
        column_type: String,
    },

    #[error("{entity}.{field} has a column type auto-fill does not handle: {column_type}")]
    Unsupported {
        entity: &'static str,
        field: String,
        column_type: String,
    },

    #[error(transparent)]
    Db(#[from] DbErr),
}

/// An entity whose rows carry RLS fields.
///
/// `ENTITY_NAME` is matched against `tenant_scoped` and `skip_models`.
pub trait RlsScopedEntity: EntityTrait {
    const ENTITY_NAME: &'static str;

    /// Column holding `field`; defaults to the column of the same name.
    fn rls_column(field: &str) -> Option<Self::Column> {
        Self::Column::from_str(field).ok()
    }
}

/// Fill unset RLS columns of `am` from `ctx`.
///
/// Returns the number of columns filled.
///
/// # Errors
/// Returns `AutofillError` when a context value cannot be stored in its
/// column.
pub fn autofill<E>(
    am: &mut E::ActiveModel,
    settings: &RlsSettings,
    ctx: &RlsContext,
) -> Result<usize, AutofillError>
where
    E: RlsScopedEntity,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
{
    if !settings.autofills(E::ENTITY_NAME) {
        return Ok(0);
    }

    let mut filled = 0;
    for field in &settings.enforce_fields {
        let Some(col) = E::rls_column(field) else {
            continue;
        };
        if !matches!(am.get(col), ActiveValue::NotSet) {
            continue;
        }
        let Some(RlsValue::Concrete(scalar)) = ctx.get(field) else {
            continue;
        };

        let value = to_column_value(col.def().get_column_type(), scalar).map_err(|e| match e {
            Conversion::Mismatch(column_type) => AutofillError::TypeMismatch {
                entity: E::ENTITY_NAME,
                field: field.clone(),
                value: scalar.to_wire(),
                column_type,
            },
            Conversion::Unsupported(column_type) => AutofillError::Unsupported {
                entity: E::ENTITY_NAME,
                field: field.clone(),
                column_type,
            },
        })?;
        am.set(col, value);
        filled += 1;
    }

    if filled > 0 {
        tracing::debug!(entity = E::ENTITY_NAME, filled, "RLS fields auto-filled");
    }
    Ok(filled)
}

/// Auto-fill `am`, then insert it.
///
/// # Errors
/// Returns `AutofillError::Db` if the insert fails, or the auto-fill error.
pub async fn scoped_insert<E>(
    mut am: E::ActiveModel,
    settings: &RlsSettings,
    ctx: &RlsContext,
    conn: &impl ConnectionTrait,
) -> Result<E::Model, AutofillError>
where
    E: RlsScopedEntity,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + sea_orm::ActiveModelBehavior + Send,
    E::Model: sea_orm::IntoActiveModel<E::ActiveModel>,
{
    autofill::<E>(&mut am, settings, ctx)?;
    Ok(am.insert(conn).await?)
}

enum Conversion {
    Mismatch(String),
    Unsupported(String),
}

fn to_column_value(ty: &ColumnType, scalar: &Scalar) -> Result<Value, Conversion> {
    let mismatch = || Conversion::Mismatch(format!("{ty:?}"));
    let int = || match scalar {
        Scalar::Int(v) => Some(*v),
        Scalar::Text(s) => s.parse().ok(),
        _ => None,
    };

    match ty {
        ColumnType::BigInteger => int().map(Value::from).ok_or_else(mismatch),
        ColumnType::Integer => int()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        ColumnType::SmallInteger => int()
            .and_then(|v| i16::try_from(v).ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        ColumnType::Uuid => scalar.as_uuid().map(Value::from).ok_or_else(mismatch),
        ColumnType::String(_) | ColumnType::Text | ColumnType::Char(_) => {
            Ok(Value::from(scalar.to_wire()))
        }
        ColumnType::Boolean => match scalar {
            Scalar::Bool(b) => Ok(Value::from(*b)),
            _ => Err(mismatch()),
        },
        other => Err(Conversion::Unsupported(format!("{other:?}"))),
    }
}
