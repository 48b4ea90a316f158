use std::collections::BTreeSet;
use std::str::FromStr;

use citadel_core::{AppError, AppResult, CallerIdentity, UserId};
use serde::{Deserialize, Serialize};

/// Capability limiting which colleagues' resources a caller may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OwnershipScope {
    /// Any resource of the caller's job.
    Any,
    /// Only resources the caller created.
    Own,
    /// Resources created by strictly lower grades.
    #[serde(rename = "Lower_Rank")]
    LowerRank,
    /// Resources created by lower or equal grades.
    #[serde(rename = "Same_Rank")]
    SameRank,
}

impl OwnershipScope {
    /// Returns the stable capability value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Own => "Own",
            Self::LowerRank => "Lower_Rank",
            Self::SameRank => "Same_Rank",
        }
    }
}

impl FromStr for OwnershipScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Any" => Ok(Self::Any),
            "Own" => Ok(Self::Own),
            "Lower_Rank" => Ok(Self::LowerRank),
            "Same_Rank" => Ok(Self::SameRank),
            _ => Err(AppError::Validation(format!(
                "unknown ownership scope '{value}'"
            ))),
        }
    }
}

/// Closed set of ownership capabilities held by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipScopes(BTreeSet<OwnershipScope>);

impl OwnershipScopes {
    /// Creates a set from typed scopes.
    #[must_use]
    pub fn new(scopes: impl IntoIterator<Item = OwnershipScope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    /// Parses capability strings, rejecting unknown values.
    pub fn parse<I, S>(values: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|value| OwnershipScope::from_str(value.as_ref().trim()))
            .collect::<AppResult<BTreeSet<_>>>()
            .map(Self)
    }

    /// Returns whether the set holds `scope`.
    #[must_use]
    pub fn contains(&self, scope: OwnershipScope) -> bool {
        self.0.contains(&scope)
    }

    /// Returns whether no capability was granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Creator of a resource as seen by the ownership gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorRef {
    /// Creator account.
    pub user_id: UserId,
    /// Creator grade inside the owning job.
    pub grade: i32,
}

/// Decides whether `caller` may act on a resource created by a colleague.
///
/// Only same-job resources are restricted; cross-job access belongs to the
/// grant system. An empty scope set behaves like `Own`.
#[must_use]
pub fn has_ownership_access(
    scopes: &OwnershipScopes,
    caller: &CallerIdentity,
    owner_job: Option<&str>,
    creator: Option<&CreatorRef>,
) -> bool {
    if caller.is_superuser() {
        return true;
    }

    if owner_job != Some(caller.job()) {
        return true;
    }

    let Some(creator) = creator else {
        return true;
    };

    let is_own = creator.user_id == caller.user_id();
    if scopes.is_empty() {
        return is_own;
    }

    scopes.contains(OwnershipScope::Any)
        || (scopes.contains(OwnershipScope::LowerRank) && creator.grade < caller.grade())
        || (scopes.contains(OwnershipScope::SameRank) && creator.grade <= caller.grade())
        || (scopes.contains(OwnershipScope::Own) && is_own)
}

#[cfg(test)]
mod tests {
    use citadel_core::{CallerIdentity, UserId};

    use super::{CreatorRef, OwnershipScope, OwnershipScopes, has_ownership_access};

    fn user_id(value: i32) -> UserId {
        UserId::new(value).unwrap_or_else(|error| panic!("invalid user id: {error}"))
    }

    fn caller() -> CallerIdentity {
        CallerIdentity::new(user_id(1), "police", 5)
    }

    fn creator(user: i32, grade: i32) -> CreatorRef {
        CreatorRef {
            user_id: user_id(user),
            grade,
        }
    }

    #[test]
    fn lower_rank_allows_only_strictly_lower_creators() {
        let scopes = OwnershipScopes::new([OwnershipScope::LowerRank]);
        assert!(has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 3))));
        assert!(!has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 7))));
        assert!(!has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 5))));
    }

    #[test]
    fn same_rank_includes_equal_grade() {
        let scopes = OwnershipScopes::new([OwnershipScope::SameRank]);
        assert!(has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 5))));
        assert!(!has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 6))));
    }

    #[test]
    fn empty_scopes_default_to_own() {
        let scopes = OwnershipScopes::default();
        assert!(has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(1, 9))));
        assert!(!has_ownership_access(&scopes, &caller(), Some("police"), Some(&creator(2, 1))));
    }

    #[test]
    fn other_job_and_unknown_creator_pass() {
        let scopes = OwnershipScopes::new([OwnershipScope::Own]);
        assert!(has_ownership_access(&scopes, &caller(), Some("ems"), Some(&creator(2, 9))));
        assert!(has_ownership_access(&scopes, &caller(), None, Some(&creator(2, 9))));
        assert!(has_ownership_access(&scopes, &caller(), Some("police"), None));
    }

    #[test]
    fn superuser_and_any_always_pass() {
        let scopes = OwnershipScopes::new([OwnershipScope::Own]);
        let admin = caller().with_superuser(true);
        assert!(has_ownership_access(&scopes, &admin, Some("police"), Some(&creator(2, 9))));

        let any = OwnershipScopes::new([OwnershipScope::Any]);
        assert!(has_ownership_access(&any, &caller(), Some("police"), Some(&creator(2, 9))));
    }

    #[test]
    fn parse_rejects_unknown_capability() {
        assert!(OwnershipScopes::parse(["Own", "Lower_Rank"]).is_ok());
        assert!(OwnershipScopes::parse(["Own", "Everything"]).is_err());
    }
}
