pub mod backends;
pub mod config_loader;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod media;
pub mod protocol;
pub mod server;
pub mod wav;

pub use dispatcher::Dispatcher;
pub use protocol::{Request, Response};
