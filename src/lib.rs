//! pixelflut-server: a shared canvas driven by the Pixelflut text protocol
//!
//! Clients connect over TCP and send newline-terminated commands:
//! - `SIZE` reports the canvas dimensions
//! - `PX <x> <y>` reads a pixel from the last presented frame
//! - `PX <x> <y> <COLOR>` queues a pixel write
//! - `HELP` prints usage text
//!
//! Writes from all connections funnel through one bounded queue into the
//! frame cycle, which applies them and publishes an immutable snapshot each
//! tick. Display backends and input devices plug in through the traits in
//! [`display`].

pub mod buffer;
pub mod canvas;
pub mod config;
pub mod display;
pub mod frame;
pub mod protocol;
pub mod queue;
pub mod server;
