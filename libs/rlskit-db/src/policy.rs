//! `CREATE POLICY` migration scripts.
//!
//! The generated condition reads the two session variables written by
//! [`crate::session`]. For every field:
//!
//! ```sql
//! CASE current_setting('rls_mode.tenant_id', true)
//!     WHEN 'all' THEN TRUE
//!     WHEN 'value' THEN "tenant_id" = current_setting('rls.tenant_id', true)::int
//!     ELSE FALSE
//! END
//! ```
//!
//! Fields are combined with `AND`. A field that was never set, reset, or
//! resolved to no value matches nothing.

use std::fmt;
use std::str::FromStr;

use rlskit_security::{PG_IDENT_MAX, RlsSettings, SettingsError, check_identifier};
use sea_orm::ColumnType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("at least one field is required")]
    NoFields,

    #[error("field '{0}' is not listed in enforce_fields")]
    NotEnforced(String),

    #[error("field '{0}' is listed more than once")]
    DuplicateField(String),

    #[error("unknown SQL type '{0}'")]
    UnknownType(String),

    #[error("unknown policy command '{0}'")]
    UnknownCommand(String),

    #[error("'{0}' exceeds 63 bytes")]
    NameTooLong(String),

    #[error(transparent)]
    Identifier(#[from] SettingsError),
}

/// SQL type a session variable is cast to before comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Int,
    Bigint,
    Smallint,
    Uuid,
    #[default]
    Text,
    Boolean,
}

impl SqlType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Bigint => "bigint",
            Self::Smallint => "smallint",
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Boolean => "boolean",
        }
    }

    /// Cast type for a `SeaORM` column; anything unrecognised compares as text.
    #[must_use]
    pub fn from_column_type(ty: &ColumnType) -> Self {
        match ty {
            ColumnType::Integer => Self::Int,
            ColumnType::BigInteger => Self::Bigint,
            ColumnType::SmallInteger => Self::Smallint,
            ColumnType::Uuid => Self::Uuid,
            ColumnType::Boolean => Self::Boolean,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SqlType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" | "int4" => Ok(Self::Int),
            "bigint" | "int8" => Ok(Self::Bigint),
            "smallint" | "int2" => Ok(Self::Smallint),
            "uuid" => Ok(Self::Uuid),
            "text" | "varchar" | "char" => Ok(Self::Text),
            "boolean" | "bool" => Ok(Self::Boolean),
            _ => Err(PolicyError::UnknownType(s.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCommand {
    #[default]
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    /// INSERT policies only accept `WITH CHECK`.
    fn has_using(self) -> bool {
        !matches!(self, Self::Insert)
    }

    /// SELECT and DELETE policies only accept `USING`.
    fn has_check(self) -> bool {
        !matches!(self, Self::Select | Self::Delete)
    }
}

impl fmt::Display for PolicyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "ALL",
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

impl FromStr for PolicyCommand {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(PolicyError::UnknownCommand(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyField {
    pub name: String,
    pub sql_type: SqlType,
}

impl PolicyField {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// A validated RLS policy on one table.
#[derive(Clone, Debug)]
pub struct RlsPolicy {
    table: Vec<String>,
    name: String,
    command: PolicyCommand,
    fields: Vec<PolicyField>,
    prefix: String,
}

impl RlsPolicy {
    /// Policy on `table` (optionally `schema.table`) restricted by `fields`,
    /// named `<table>_rls_policy`, for all commands.
    ///
    /// # Errors
    /// Returns `PolicyError` when `fields` is empty, names a field outside
    /// `enforce_fields` or twice, or any identifier is invalid.
    pub fn new(
        settings: &RlsSettings,
        table: &str,
        fields: Vec<PolicyField>,
    ) -> Result<Self, PolicyError> {
        let table: Vec<String> = table.split('.').map(str::to_owned).collect();
        for part in &table {
            check_identifier("table", part)?;
        }
        check_identifier(
            "session_namespace_prefix",
            &settings.session_namespace_prefix,
        )?;

        if fields.is_empty() {
            return Err(PolicyError::NoFields);
        }
        for (i, f) in fields.iter().enumerate() {
            check_identifier("fields", &f.name)?;
            if !settings.is_enforced(&f.name) {
                return Err(PolicyError::NotEnforced(f.name.clone()));
            }
            if fields[..i].iter().any(|p| p.name == f.name) {
                return Err(PolicyError::DuplicateField(f.name.clone()));
            }
        }

        let bare = table.last().map_or("", String::as_str);
        let policy = Self {
            name: format!("{bare}_rls_policy"),
            table,
            command: PolicyCommand::All,
            fields,
            prefix: settings.session_namespace_prefix.clone(),
        };
        policy.check_name()?;
        Ok(policy)
    }

    #[must_use]
    pub fn with_command(mut self, command: PolicyCommand) -> Self {
        self.command = command;
        self
    }

    /// # Errors
    /// Returns `PolicyError` if `name` is not a valid identifier.
    pub fn with_name(mut self, name: &str) -> Result<Self, PolicyError> {
        check_identifier("policy_name", name)?;
        name.clone_into(&mut self.name);
        self.check_name()?;
        Ok(self)
    }

    fn check_name(&self) -> Result<(), PolicyError> {
        if self.name.len() > PG_IDENT_MAX {
            return Err(PolicyError::NameTooLong(self.name.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unqualified table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table.last().map_or("", String::as_str)
    }

    #[must_use]
    pub fn command(&self) -> PolicyCommand {
        self.command
    }

    #[must_use]
    pub fn fields(&self) -> &[PolicyField] {
        &self.fields
    }

    fn qualified_table(&self) -> String {
        self.table
            .iter()
            .map(|p| quote_ident(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Row condition shared by `USING` and `WITH CHECK`.
    #[must_use]
    pub fn condition(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "CASE current_setting('{p}_mode.{n}', true) \
                     WHEN 'all' THEN TRUE \
                     WHEN 'value' THEN {col} = current_setting('{p}.{n}', true)::{ty} \
                     ELSE FALSE END",
                    p = self.prefix,
                    n = f.name,
                    col = quote_ident(&f.name),
                    ty = f.sql_type,
                )
            })
            .map(|c| format!("({c})"))
            .collect::<Vec<_>>()
            .join("\n    AND ")
    }

    /// Enable and force RLS on the table, then create the policy.
    ///
    /// `FORCE` subjects the table owner to the policy as well.
    #[must_use]
    pub fn up_sql(&self) -> String {
        let table = self.qualified_table();
        let cond = self.condition();

        let mut create = vec![format!(
            "CREATE POLICY {} ON {table} FOR {}",
            quote_ident(&self.name),
            self.command
        )];
        if self.command.has_using() {
            create.push(format!("  USING (\n    {cond}\n  )"));
        }
        if self.command.has_check() {
            create.push(format!("  WITH CHECK (\n    {cond}\n  )"));
        }
        let create = create.join("\n");

        format!(
            "ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;\n\
             ALTER TABLE {table} FORCE ROW LEVEL SECURITY;\n\
             {create};\n"
        )
    }

    /// Reverse of [`RlsPolicy::up_sql`].
    #[must_use]
    pub fn down_sql(&self) -> String {
        let table = self.qualified_table();
        format!(
            "DROP POLICY IF EXISTS {} ON {table};\n\
             ALTER TABLE {table} NO FORCE ROW LEVEL SECURITY;\n\
             ALTER TABLE {table} DISABLE ROW LEVEL SECURITY;\n",
            quote_ident(&self.name)
        )
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
