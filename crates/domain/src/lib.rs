pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod trace;

pub use error::{Error, Result};
pub use message::{Message, Role};
pub use stream::{BoxStream, ChatChunk, Usage};
