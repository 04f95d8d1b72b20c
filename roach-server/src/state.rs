//! Server state
//!
//! Handlers only see the arena; every mutation goes through its services.

use roach_relay::Arena;
use std::sync::Arc;

pub struct ServerState {
    pub arena: Arc<Arena>,
}

impl ServerState {
    pub fn new(arena: Arc<Arena>) -> Self {
        Self { arena }
    }
}
