//! HTTP front end that streams uploads into object storage

pub mod config;
pub mod handlers;
pub mod server;

pub use config::{Args, Backend};
pub use handlers::{handle_request, SharedUploader};
pub use server::PartwiseServer;
