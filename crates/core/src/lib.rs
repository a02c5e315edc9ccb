pub mod error;
pub mod executor;
pub mod generator;
pub mod history;
pub mod input;
pub mod locate;
pub mod logger;
pub mod macro_rt;
pub mod paste;
pub mod platform;
pub mod points;
pub mod recorder;
pub mod runner;
pub mod settings;
pub mod sleep;
pub mod store;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FlowError, Result};
