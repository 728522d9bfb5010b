mod bridge;
mod bridge_config;
mod line_codec;
mod publisher;
mod room_output;

pub use bridge::*;
pub use bridge_config::*;
pub use line_codec::*;
pub use publisher::*;
pub use room_output::*;
