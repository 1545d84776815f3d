//! Application services built on storage and providers

pub mod chat;

pub use chat::ChatService;
