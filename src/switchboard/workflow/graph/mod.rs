// SPDX-License-Identifier: MIT

//! Graph definition, compilation and execution

mod builder;
mod compiler;
mod executor;
mod subgraph;

pub use builder::{Edge, GraphBuilder, Strictness, DEFAULT_RECURSION_LIMIT, END};
pub use compiler::CompiledGraph;
pub use executor::{RunConfig, RunOutput, StepRecord, OBSERVATION_KEY};
pub use subgraph::SubgraphStep;
