//! Host-side dispatcher for Editor Command Bridge.
//!
//! A persistent host (editor, game engine, long-lived tool) embeds this
//! crate and calls [`Dispatcher::tick`] from its own scheduler callback.
//! The dispatcher guarantees at most one command in flight, degrades to
//! `error` responses instead of crashing, self-heals from a wedged state,
//! and writes every response atomically under a validated id.
//!
//! The `ecbd` binary wraps the same dispatcher in a loopback host driven by
//! a timer, for development and end-to-end testing without a real editor.

pub mod capability;
pub mod dispatcher;
pub mod loopback;
pub mod registry;

pub use capability::{BusyCondition, ConsoleSource, HostProbe, IdleProbe, is_read_only};
pub use dispatcher::{Clock, CompletionHandle, Dispatcher, SystemClock};
pub use loopback::{ConsoleBuffer, LoopbackHost, SettableProbe};
pub use registry::{Handler, HandlerRegistry, Outcome};
