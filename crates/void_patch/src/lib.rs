//! # Void Patch - Path-Addressed Document Patches
//!
//! Documents are plain `serde_json::Value` trees. A [`Patch`] is an ordered
//! list of `add` / `remove` / `replace` operations, each addressed by a
//! [`DocPath`] pointer into the document.
//!
//! ## Flow
//!
//! ```text
//! before ──┐
//!          ├──► diff ──► Patch ──► prefix / remap ──► apply ──► document
//! after  ──┘
//! ```
//!
//! - [`diff`] compares two documents structurally. Arrays are compared by index.
//! - [`apply`] is all-or-nothing; [`apply_lenient`] applies what it can and
//!   reports the rest.
//! - [`AliasRemap`] rewrites alias references segment by segment, never by
//!   substring.

pub mod apply;
pub mod diff;
pub mod error;
pub mod patch;
pub mod pointer;
pub mod remap;

pub use apply::{apply, apply_lenient, apply_op, ApplyReport};
pub use diff::diff;
pub use error::{PatchError, Result};
pub use patch::{OpKind, Patch, PatchOp};
pub use pointer::DocPath;
pub use remap::AliasRemap;
