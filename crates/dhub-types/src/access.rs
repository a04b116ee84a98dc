use serde::{Deserialize, Serialize};

/// Access level of a caller, resolved by the authorization layer before any
/// registry call.
///
/// The registries trust this value for privilege decisions and only re-check
/// ownership themselves: a [`Access::Member`] caller sees and changes an
/// element only through a dataset that owns it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Ordinary caller scoped to the datasets it acts through.
    #[default]
    Member,
    /// Administrative bypass: ownership checks are skipped and
    /// administrative-only fields may be used.
    Admin,
}

impl Access {
    /// Returns `true` for the administrative bypass.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}
