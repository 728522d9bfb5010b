mod demultiplexer;
mod registry;
mod session;
mod session_event;

pub use demultiplexer::*;
pub use registry::*;
pub use session::*;
pub use session_event::*;
