// Spond 远端访问：标识符、数据模型、HTTP 客户端和会话

pub mod client;
pub mod identifier;
pub mod models;
pub mod session;


pub use client::{RemoteApi, SpondClient};
pub use identifier::{SpondId, normalize};
pub use session::SpondSession;
