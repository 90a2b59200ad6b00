pub mod actor;
pub mod dispatch;
pub mod handler;
pub mod protocol;
pub mod registry;

pub use dispatch::{Callback, CallbackTable};
pub use protocol::{MessageType, WsMessage};
pub use registry::{Connection, ConnectionId, ConnectionSender, SessionRegistry};
