//! Named-Node Tree
//!
//! An ordered hierarchy of named nodes addressed with filesystem-like paths.
//!
//! ## Architecture
//!
//! - **Tree**: arena owning every node; nodes refer to each other by [`NodeId`]
//! - **Path**: `/a/b`, `./b`, `../sibling` parsing (see [`path`])
//! - **Slice**: Python-style `start:stop:step` selection over children (see [`slice`])
//!
//! Children keep insertion order, which is what slicing and iteration use.
//! Node ids are never reused, so an id obtained from [`Tree::resolve`] keeps
//! identifying the same node until that node is removed.

mod error;
mod node;
pub mod path;
pub mod slice;

pub use error::{TreeError, TreeResult};
pub use node::{NodeId, Tree, TreeNode};
pub use slice::{SliceBound, SliceSpec};
