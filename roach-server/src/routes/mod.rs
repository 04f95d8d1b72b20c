//! HTTP route handlers

pub mod games;
pub mod participants;
pub mod sessions;
pub mod status;
pub mod tickets;
