//! weft-testkit: hand-expanded stubs for the sample services, written the
//! way the code generator writes them, plus shared client plumbing.
//!
//! Every struct knows how to read and write itself through the
//! [`Protocol`](weft_protocol::Protocol) contract and nothing else; the
//! handlers adapt those structs to [`MethodHandler`](weft_server::MethodHandler).

#![deny(unsafe_code)]

pub mod calculator;
pub mod client;
pub mod echo;

pub use client::ClientError;
