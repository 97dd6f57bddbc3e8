//! Radio streaming module
//!
//! This module contains the streaming core:
//! - front-end channel abstraction ([`frontend`])
//! - producer/consumer callback contract ([`callback`])
//! - thread-per-direction streaming engine ([`engine`])
//! - counters and event reporting ([`monitor`])
//! - simulated loopback front end ([`sim`])

pub mod callback;
pub mod engine;
pub mod frontend;
pub mod monitor;
pub mod sim;
