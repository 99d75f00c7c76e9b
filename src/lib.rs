#![allow(dead_code)]
pub mod binlog;
mod buf_ext;
mod conn;
pub mod constants;
mod debug;
pub mod error;
pub mod handler;
pub mod json_binary;
pub mod query;
mod scramble;
mod session;
mod stream;
pub mod value;

pub use conn::{BinlogCursor, BinlogStream, Connection, ConnectionOptions};
pub use session::Session;

#[cfg(feature = "ssl")]
pub use openssl;
