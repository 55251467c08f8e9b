//! Core data types shared by the chainwatch crates.

pub mod event;
pub mod health;
pub mod price;

pub use event::*;
pub use health::*;
pub use price::*;
