#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;

pub use config::ListenerConfig;
pub use error::ListenerError;
pub use handler::{Handler, HandlerFn};
pub use listener::StoreListener;
