//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - One shared [`TimeBase`] per process, re-anchored when a recording starts
//! - Every reading, fix and sync tick carries a microsecond [`Timestamp`] from it
//! - Sync ticks carry a sequence number starting at 1; synchronized sensor
//!   readings echo that sequence back

mod blueprint;
mod device;
mod error;
mod frame;
mod listener;
mod metadata;
mod sensor;
mod settings;
mod sink;
mod sync;
mod time_base;

pub use blueprint::*;
pub use device::*;
pub use error::*;
pub use frame::{Frame, PixelLayout};
pub use listener::{Listener, ListenerRegistry, SubscriptionId};
pub use metadata::*;
pub use sensor::*;
pub use settings::*;
pub use sink::*;
pub use sync::*;
pub use time_base::{TimeBase, Timestamp};
