pub mod channel;
pub mod session;

pub use channel::ChannelState;
pub use session::SessionMode;
