//! REST collaborator.

pub mod http;

pub use http::HttpChatApi;
