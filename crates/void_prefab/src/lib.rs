//! # Void Prefab - Templates, Nested Instances & Overrides
//!
//! Reusable sub-scenes are stored as template documents. Instantiating one
//! nests it inside another template through a link; the link carries the
//! override patch that sets this instance apart from its template.
//!
//! ## Architecture
//!
//! ```text
//! edit ──► diff ──► qualify ──┬──► template patch ──┐
//!                             └──► link patch ──────┴──► propagate ──► live instances
//! ```
//!
//! ## Key Concepts
//!
//! - **Template**: canonical document keyed by source path
//! - **Instance**: live copy of a template; owns its entities and nested instances
//! - **Link**: edge from a parent template to a nested instance, with its overrides
//! - **Alias**: stable name of an entity or nested instance inside its owner
//! - **PrefabWorld**: owns all of the above plus the undo log
//!
//! Link patches are applied outermost first, so the override closest to an
//! instance wins.

pub mod alias;
pub mod config;
pub mod cycle;
pub mod dom;
pub mod entity;
pub mod error;
pub mod handle;
pub mod id;
pub mod instance;
pub mod link;
pub mod placement;
pub mod template;
pub mod transaction;
pub mod world;

pub use alias::{Alias, AliasGenerator, AliasPath, CONTAINER_ALIAS};
pub use config::PrefabConfig;
pub use cycle::CycleDetector;
pub use entity::{Entity, Transform, IDENTITY_ROTATION};
pub use error::{PrefabError, Result};
pub use handle::{Arena, Handle};
pub use id::{EntityId, LinkId, TemplateId};
pub use instance::{Instance, InstanceHandle, InstanceTree};
pub use link::{Link, LinkTable};
pub use template::{Template, TemplateStore};
pub use transaction::{Batch, BatchId, BatchState, Direction, TransactionLog, UndoNode};
pub use world::{EntityOwner, PatchScope, PrefabWorld};

pub use void_patch::{AliasRemap, DocPath, OpKind, Patch, PatchOp};
