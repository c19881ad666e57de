pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod gate;
pub mod log;
pub mod orchestration;
pub mod store;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};
