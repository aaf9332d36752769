pub mod config;
pub mod init;

pub use config::*;
