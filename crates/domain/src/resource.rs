use std::str::FromStr;

use citadel_core::AppError;
use serde::{Deserialize, Serialize};

/// Protected resource families sharing the access engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Case files and documents.
    Document,
    /// Document templates.
    DocumentTemplate,
    /// Messenger threads.
    MessengerThread,
}

impl ResourceKind {
    /// Returns the stable registry key for this family.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::DocumentTemplate => "document_templates",
            Self::MessengerThread => "messenger_threads",
        }
    }

    /// Returns all known resource families.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ResourceKind] = &[
            ResourceKind::Document,
            ResourceKind::DocumentTemplate,
            ResourceKind::MessengerThread,
        ];

        ALL
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "documents" => Ok(Self::Document),
            "document_templates" => Ok(Self::DocumentTemplate),
            "messenger_threads" => Ok(Self::MessengerThread),
            _ => Err(AppError::Validation(format!(
                "unknown resource kind '{value}'"
            ))),
        }
    }
}
