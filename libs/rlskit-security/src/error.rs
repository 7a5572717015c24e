/// Errors raised while turning a request into an [`RlsContext`](crate::RlsContext).
///
/// None of these are ever mapped to a bypass: the request fails instead.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The caller is not allowed to proceed at all.
    #[error("{0}")]
    Unauthorized(String),

    /// The resolver could not extract a value.
    #[error("resolver failed: {0}")]
    Resolver(String),

    /// The bypass check itself failed.
    #[error("bypass check failed: {0}")]
    Bypass(String),
}

impl ResolveError {
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_owned())
    }
}

/// Invalid RLS settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("session namespace prefix must not be empty")]
    EmptyPrefix,

    #[error("invalid identifier '{value}' in {setting}: {reason}")]
    InvalidIdentifier {
        setting: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("field '{0}' is listed more than once in enforce_fields")]
    DuplicateField(String),

    #[error("migration_user.enabled requires both user and password")]
    MissingMigrationCredentials,
}

impl From<figment::Error> for SettingsError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}
