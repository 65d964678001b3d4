//! `MentorLink` Bridge Server library.
//!
//! Exposes the bridge server for use in tests and embedding. The bridge
//! accepts WebSocket connections from session participants, registers
//! them under a role, and routes typed messages between them with
//! conversation replay for late joiners.

pub mod bridge;
pub mod config;
pub mod history;
pub mod questions;
pub mod registry;
pub mod router;
