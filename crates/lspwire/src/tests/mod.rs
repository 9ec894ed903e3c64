//! Crate-level tests driving sessions against in-process peers.

mod session_behaviour;
mod support;
