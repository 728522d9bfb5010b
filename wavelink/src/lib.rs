pub use wavelink_core::model::MemberId;
pub use wavelink_core::{SignalError, TransportError};

pub mod model {
    pub use wavelink_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use wavelink_server::*;
}
