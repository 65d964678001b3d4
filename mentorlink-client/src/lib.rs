//! Participant-side client library for the `MentorLink` bridge.
//!
//! One [`AgentClient`] serves every role: the coding agent, the teaching
//! agent, and (behind a thin UI adapter) the student all connect, register,
//! and exchange messages through the same API.

pub mod client;

pub use client::{AgentClient, ClientError};
