//! Command implementations.

mod publish;
mod serve;

pub use publish::PublishCommand;
pub use serve::ServeCommand;
