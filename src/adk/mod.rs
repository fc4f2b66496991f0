// SPDX-License-Identifier: MIT

//! Agent development kit: model plumbing and shared error types.

pub mod agent;
pub mod error;
pub mod model;
