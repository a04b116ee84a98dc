//! Dataset name validation and slug construction.
//!
//! A slug is `owner_prefix/name`. Ordinary callers supply a bare name and
//! the owner prefix is prepended. Administrators may supply a full slug
//! containing `/`, which is then used as is.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain any of [`ILLEGAL_CHARS`] (`/` is allowed for administrators)
//! - Full slugs must not start or end with `/` nor contain `//`

use dhub_types::Access;

use crate::error::{DatasetError, DatasetResult};

/// Characters that are forbidden in dataset names.
pub const ILLEGAL_CHARS: &str = "/*;:,.ç´`+Ç¨^><¿?'¡!\"·$%&()@~¬";

/// Validate a dataset name for the given caller.
pub fn validate_name(name: &str, access: Access) -> DatasetResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }

    let slash_allowed = access.is_admin();
    if let Some(ch) = name
        .chars()
        .find(|ch| ILLEGAL_CHARS.contains(*ch) && !(slash_allowed && *ch == '/'))
    {
        return Err(invalid(name, &format!("contains forbidden character {ch:?}")));
    }

    if name.contains('/') {
        if name.starts_with('/') || name.ends_with('/') {
            return Err(invalid(name, "must not start or end with '/'"));
        }
        if name.contains("//") {
            return Err(invalid(name, "must not contain '//'"));
        }
    }
    Ok(())
}

/// Validate `name` and build the slug it maps to.
///
/// # Examples
///
/// ```
/// use dhub_dataset::names::slug_for;
/// use dhub_types::Access;
///
/// assert_eq!(slug_for("alice", "cats", Access::Member).unwrap(), "alice/cats");
/// assert_eq!(slug_for("alice", "bob/dogs", Access::Admin).unwrap(), "bob/dogs");
/// assert!(slug_for("alice", "bob/dogs", Access::Member).is_err());
/// ```
pub fn slug_for(owner_prefix: &str, name: &str, access: Access) -> DatasetResult<String> {
    validate_name(name, access)?;
    if name.contains('/') {
        return Ok(name.to_string());
    }
    // The prefix becomes the first slug segment, so it follows member rules.
    validate_name(owner_prefix, Access::Member)
        .map_err(|_| DatasetError::Validation(format!("invalid owner prefix {owner_prefix:?}")))?;
    Ok(format!("{owner_prefix}/{name}"))
}

fn invalid(name: &str, reason: &str) -> DatasetError {
    DatasetError::Validation(format!("invalid dataset name {name:?}: {reason}"))
}
