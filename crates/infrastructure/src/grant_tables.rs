use citadel_core::{AppError, AppResult};
use citadel_domain::ResourceKind;

/// Table names backing one resource family.
///
/// Names are interpolated into SQL, so they are restricted to lowercase
/// ASCII letters, digits and underscores. Values are always bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTables {
    target_table: String,
    job_table: String,
    user_table: String,
}

impl GrantTables {
    /// Creates a validated table mapping.
    pub fn new(
        target_table: impl Into<String>,
        job_table: impl Into<String>,
        user_table: impl Into<String>,
    ) -> AppResult<Self> {
        let tables = Self {
            target_table: target_table.into(),
            job_table: job_table.into(),
            user_table: user_table.into(),
        };

        validate_identifier(&tables.target_table)?;
        validate_identifier(&tables.job_table)?;
        validate_identifier(&tables.user_table)?;

        Ok(tables)
    }

    /// Returns the tables shipped with the bundled migrations for `kind`.
    #[must_use]
    pub fn for_kind(kind: ResourceKind) -> Self {
        let (target_table, job_table, user_table) = match kind {
            ResourceKind::Document => (
                "documents",
                "document_access_jobs",
                "document_access_users",
            ),
            ResourceKind::DocumentTemplate => (
                "document_templates",
                "template_access_jobs",
                "template_access_users",
            ),
            ResourceKind::MessengerThread => (
                "messenger_threads",
                "thread_access_jobs",
                "thread_access_users",
            ),
        };

        Self {
            target_table: target_table.to_owned(),
            job_table: job_table.to_owned(),
            user_table: user_table.to_owned(),
        }
    }

    /// Returns the table holding the protected resources.
    #[must_use]
    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    /// Returns the job grant table.
    #[must_use]
    pub fn job_table(&self) -> &str {
        &self.job_table
    }

    /// Returns the user grant table.
    #[must_use]
    pub fn user_table(&self) -> &str {
        &self.user_table
    }
}

fn validate_identifier(value: &str) -> AppResult<()> {
    let starts_with_letter = value
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_lowercase());
    let valid_chars = value.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    });

    if !starts_with_letter || !valid_chars || value.len() > 63 {
        return Err(AppError::Validation(format!(
            "invalid table name '{value}': expected lowercase letters, digits and underscores"
        )));
    }

    Ok(())
}
