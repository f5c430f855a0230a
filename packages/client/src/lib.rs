//! Livedesk client library.
//!
//! Keeps a live-chat client in sync with the backend over one realtime
//! connection per signed-in identity:
//!
//! - `domain`: identities, messages, events, the event dispatcher and the ports
//!   the session core depends on
//! - `infrastructure`: WebSocket transport with bounded reconnect, REST client,
//!   wire DTOs
//! - `usecase`: room session controller, typing coordinator, read-receipt tracker
//! - `ui`: the interactive terminal client
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use livedesk_client::{
//!     config::ClientConfig,
//!     domain::{Identity, UserId},
//!     infrastructure::{api::HttpChatApi, transport::ConnectionManager},
//!     usecase::ChatSession,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let identity = Identity::customer(UserId::new("c1")?);
//! let manager = Arc::new(ConnectionManager::new(&config.ws_url, config.reconnect));
//! let api = Arc::new(HttpChatApi::new(&config.api_url, "token", identity.role));
//!
//! let session = ChatSession::new(identity.clone(), manager.clone(), api, config.session);
//! manager.connect(identity, Some("token"));
//! session.attach(manager.as_ref());
//! session.watch_connection(manager.watch_state());
//! session.open_own_room("Alice").await;
//! session.send_message("hello", None);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
