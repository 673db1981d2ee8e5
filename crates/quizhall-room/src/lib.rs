//! Quiz rooms for Quizhall.
//!
//! Each room runs as an isolated Tokio task (actor model) with its own
//! roster, session state, answers, and question countdown.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates/destroys rooms, routes participants
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`QuestionCatalog`]: the question sets rooms are created for
//! - [`RoomConfig`]: capacity, countdown, and channel sizing

mod catalog;
mod config;
mod error;
mod manager;
mod room;
mod roster;
mod scoring;

pub use catalog::QuestionCatalog;
pub use config::RoomConfig;
pub use error::{CatalogError, RoomError};
pub use manager::RoomManager;
pub use room::{JoinOutcome, RemoveOutcome, RoomHandle, RoomInfo, StartOutcome};
