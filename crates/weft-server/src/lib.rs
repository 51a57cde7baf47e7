//! weft-server: maps incoming messages to handlers and runs the accept
//! loops that feed them.
//!
//! A [`Processor`] owns the method table and guarantees a well-formed
//! reply envelope for every CALL, even when the handler fails. The two
//! servers differ only in scheduling: [`SimpleServer`] serves one
//! connection at a time on the accept task, [`TaskServer`] spawns a task
//! per connection.

#![deny(unsafe_code)]

mod processor;
mod server;

pub use processor::{MethodHandler, Processor, ServiceProcessor};
pub use server::{SimpleServer, StopHandle, TaskServer};
