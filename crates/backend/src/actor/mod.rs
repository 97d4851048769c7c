//! Action serialization
//!
//! Every client call becomes one action, and actions run strictly one at a
//! time. Instead of guarding the domain managers with locks, a single worker
//! task owns them and the transport only talks to it through the queue.
//!
//! # Architecture
//!
//! ```text
//! connection ─┐
//! connection ─┼─ Gateway::submit ─▶ queue (FIFO) ─▶ ActionWorker ─▶ dispatch ─▶ handler
//! connection ─┘         ▲                                │
//!                       └──────── completion ◀───────────┘
//! ```
//!
//! - [`Gateway`]: cloneable front door; `submit` enqueues and waits for completion
//! - [`ActionWorker`](worker::ActionWorker): dequeues, reads the opening message, dispatches
//! - [`ActionIo`](action::ActionIo): the handler's view of the call's stream, with
//!   progress, chunked replies and continuation prompts
//!
//! A handler waiting for a continuation answer holds up the whole queue until
//! its client answers or disconnects.

pub mod action;
pub mod chunk;
pub mod handle;
mod handlers;
pub mod message;
pub mod worker;

#[cfg(test)]
mod __tests__;

pub use handle::{Gateway, GatewayError};
pub use message::{ClientEnd, ClientHandle};
pub use worker::DomainState;
