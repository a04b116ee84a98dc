//! Dataset elements for DataHub.
//!
//! An element is a record that may be owned by several datasets at once. The
//! first owner is the *primary* owner; every later owner got the element by
//! forking or sharing, without any copy. Writes go through a copy-on-write
//! protocol so that a change made through one owner is never observed by the
//! others.
//!
//! # Modules
//!
//! - [`error`] — Error types for element operations
//! - [`element`] — The [`Element`] row and its [`ElementMetadata`]
//! - [`patch`] — Creation inputs ([`NewElement`], [`ContentSource`]) and edits ([`ElementPatch`])
//! - [`traits`] — The [`ElementStore`] persistence seam
//! - [`memory`] — [`InMemoryElementStore`] with owner, blob and lineage indexes
//! - [`registry`] — [`ElementRegistry`], the copy-on-write front end
//!
//! # Copy-on-write
//!
//! For an element owned by `[D0, D1..Dn]` mutated through `Dx`:
//!
//! 1. Sole owner: mutate in place.
//! 2. `Dx == D0`: unlink every fork, give each one a clone of the old state,
//!    then mutate the original.
//! 3. `Dx != D0`: unlink `Dx` and mutate a clone owned only by `Dx`.
//!
//! Clones record the id they were copied from in `previous_id`, which
//! [`ElementRegistry::discover_real_id`] follows to translate stale ids.

pub mod element;
pub mod error;
pub mod memory;
pub mod patch;
pub mod registry;
pub mod traits;

pub use element::{Element, ElementMetadata};
pub use error::{ElementError, ElementResult};
pub use memory::InMemoryElementStore;
pub use patch::{ContentSource, ElementPatch, NewElement};
pub use registry::{ElementRegistry, ReleaseReport, DEFAULT_PAGE_SIZE, MAX_LINEAGE_DEPTH};
pub use traits::ElementStore;
