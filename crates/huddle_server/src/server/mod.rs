#![forbid(unsafe_code)]

pub mod connection;
pub mod error;
pub mod handle;
pub mod health;
pub mod hub;
pub mod lifecycle;
pub mod registry;
pub mod room_index;
pub mod router;
pub mod state;
