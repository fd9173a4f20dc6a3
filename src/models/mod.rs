//! Data models for the Theme Studio backend.
//!
//! Field names serialize in camelCase to match the editor's JSON contract.

mod block;
mod customization;
mod publish;
mod section;
mod store;

pub use block::*;
pub use customization::*;
pub use publish::*;
pub use section::*;
pub use store::*;
