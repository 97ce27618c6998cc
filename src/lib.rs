pub mod archive;
pub mod chunk;
pub mod error;
pub mod event;
pub mod interval;
pub mod remix;
pub mod runner;
pub mod smil;

pub use error::{Error, Result};
