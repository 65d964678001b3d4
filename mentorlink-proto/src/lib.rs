//! Shared protocol definitions for the `MentorLink` wire format.

pub mod agent;
pub mod codec;
pub mod message;
