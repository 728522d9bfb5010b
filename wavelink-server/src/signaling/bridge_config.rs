use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(2);

/// How to launch the room bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Interpreter or executable, e.g. `node`.
    pub program: String,
    /// Bridge script passed as the first argument.
    pub script: PathBuf,
    /// Room name passed as the second argument.
    pub room: String,
    /// Upper bound on draining outbound lines at shutdown.
    pub flush_timeout: Duration,
    /// How long the process may outlive its closed stdout before it is
    /// killed.
    pub exit_grace: Duration,
    /// Capacity of the inbound event queue.
    pub event_buffer: usize,
}

impl BridgeConfig {
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            ..Self::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "node".to_owned(),
            script: PathBuf::from("room-bridge.js"),
            room: "lobby".to_owned(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            exit_grace: DEFAULT_EXIT_GRACE,
            event_buffer: 256,
        }
    }
}
