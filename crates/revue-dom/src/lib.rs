//! In-memory platform for Revue.
//!
//! [`Document`] is a plain node tree that records every structural change
//! it receives; [`App`] wires it to a [`Patcher`](revue_vdom::Patcher) with
//! the standard [`modules`] and mounts root components into it.

pub mod app;
pub mod document;
pub mod modules;
pub mod tests;

pub use app::App;
pub use document::{Document, Mutation, NodeKind};
