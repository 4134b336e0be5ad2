//! The HTTP surface in SPEC_FULL.md SS6. Transport, request validation and
//! authentication are external collaborators (SS1); this module only wires the
//! representative routes onto `AppState`'s already-built services and maps every
//! crate's error taxonomy onto a status code.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod pagination;
pub mod router;

pub use router::build_router;
