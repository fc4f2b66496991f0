// SPDX-License-Identifier: MIT

//! Switchboard application layer

pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod workflow;
