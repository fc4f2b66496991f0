// SPDX-License-Identifier: MIT

//! Switchboard: stateful workflow graphs for routing free-text requests.
//!
//! The [`switchboard`] module holds the engine (state model, graph compiler,
//! executor, checkpoint stores and the category dispatcher). The [`adk`]
//! module holds the model plumbing shared by LLM-backed steps and the error
//! hierarchy.

pub mod adk;
pub mod switchboard;
