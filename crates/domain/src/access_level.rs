use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use citadel_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Ordered permission tier of one protected-resource family.
///
/// Levels compare numerically: a grant allows a request when its level is
/// greater than or equal to the required level. Every family has a `Blocked`
/// sentinel below its lowest usable level.
pub trait AccessLevel:
    Copy + Eq + Ord + Hash + Debug + Display + FromStr<Err = AppError> + Send + Sync + 'static
{
    /// Stable family name used in logs and error messages.
    const FAMILY: &'static str;

    /// Sentinel level that never satisfies a requirement above itself.
    const BLOCKED: Self;

    /// Returns the stable storage value.
    fn storage_value(self) -> i16;

    /// Decodes a stored value, rejecting values outside the family.
    fn from_storage(value: i16) -> AppResult<Self>;

    /// Returns the stable transport name.
    fn as_str(self) -> &'static str;

    /// Returns every level of the family in ascending order.
    fn all() -> &'static [Self];

    /// Returns whether this level satisfies `required`.
    fn allows(self, required: Self) -> bool {
        self >= required
    }
}

macro_rules! access_level_family {
    (
        $(#[$meta:meta])*
        $name:ident, family = $family:literal {
            $( $(#[$variant_meta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(i16)]
        pub enum $name {
            $( $(#[$variant_meta])* $variant = $value, )+
        }

        impl AccessLevel for $name {
            const FAMILY: &'static str = $family;
            const BLOCKED: Self = Self::Blocked;

            fn storage_value(self) -> i16 {
                self as i16
            }

            fn from_storage(value: i16) -> AppResult<Self> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(AppError::Validation(format!(
                        "unknown {} access level value {value}",
                        $family
                    ))),
                }
            }

            fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }

            fn all() -> &'static [Self] {
                const ALL: &[$name] = &[ $( $name::$variant, )+ ];

                ALL
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $( $label => Ok(Self::$variant), )+
                    _ => Err(AppError::Validation(format!(
                        "unknown {} access level '{value}'",
                        $family
                    ))),
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str(self.as_str())
            }
        }
    };
}

access_level_family! {
    /// Access tiers for documents.
    DocumentAccessLevel, family = "document" {
        /// Explicitly denied.
        Blocked = 1 => "blocked",
        /// May read the document.
        View = 2 => "view",
        /// May comment on the document.
        Comment = 3 => "comment",
        /// May edit the document body.
        Edit = 4 => "edit",
        /// May change the document status.
        Status = 5 => "status",
        /// May manage who has access.
        Access = 6 => "access",
        /// Full control including deletion.
        Admin = 7 => "admin",
    }
}

access_level_family! {
    /// Access tiers for document templates.
    TemplateAccessLevel, family = "template" {
        /// Explicitly denied.
        Blocked = 1 => "blocked",
        /// May use the template.
        View = 2 => "view",
        /// May edit the template.
        Edit = 3 => "edit",
        /// Full control including deletion.
        Admin = 4 => "admin",
    }
}

access_level_family! {
    /// Access tiers for messenger threads.
    ThreadAccessLevel, family = "thread" {
        /// Explicitly denied.
        Blocked = 1 => "blocked",
        /// May read messages.
        View = 2 => "view",
        /// May post messages.
        Message = 3 => "message",
        /// May rename the thread and manage participants.
        Manage = 4 => "manage",
        /// Full control including deletion.
        Admin = 5 => "admin",
    }
}
