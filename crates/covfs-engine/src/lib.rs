//! The mirror repository: a copy-on-write union of a read-only source tree
//! and a read-write overlay.
//!
//! [`Repository`] is the single long-lived entry point. Everything else in
//! this crate — [`local_set`], [`whiteout`], [`mirror_table`] — is private
//! machinery it composes.

pub mod adapter;
mod local_set;
mod mirror_table;
pub mod repository;
mod whiteout;

pub use repository::Repository;
