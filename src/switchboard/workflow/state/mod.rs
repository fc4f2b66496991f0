// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declared field types and reducers
//! - `State` - the full document threaded through a run, with typed accessors
//! - `PartialState` - the update a step returns
//! - `Message` - conversation entries for `messages` fields

mod message;
mod schema;
mod store;

pub use message::{roles, Message};
pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{merge, PartialState, State};
