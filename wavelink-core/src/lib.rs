pub mod error;
pub mod model;

pub use error::{Result, SignalError, TransportError};
pub use model::*;
