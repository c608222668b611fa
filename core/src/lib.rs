pub mod channel;
pub mod config;
pub mod errors;
pub mod files;
pub mod session;
pub mod sim;

pub use channel::RegisterChannel;
pub use config::SdConfig;
pub use errors::{ChannelError, SdError};
pub use session::SdSession;
