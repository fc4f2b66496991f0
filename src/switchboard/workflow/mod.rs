// SPDX-License-Identifier: MIT

//! Workflow engine
//!
//! - `state` - state document, schema and merge rules
//! - `step` / `router` - the two kinds of user code a graph runs
//! - `graph` - definition, compiler, executor and sub-graph adapter
//! - `retry` - bounded generate/verify loop
//! - `types` / `loader` / `registry` / `builder` - graphs declared in YAML

pub mod agent_factory;
pub mod builder;
pub mod condition;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod retry;
pub mod router;
pub mod state;
pub mod step;
pub mod types;
