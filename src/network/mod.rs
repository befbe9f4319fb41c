//! Transport and orchestration: wire protocol, external collaborators,
//! the event dispatcher, and the WebSocket server.

pub mod external;
pub mod gateway;
pub mod protocol;
pub mod server;
