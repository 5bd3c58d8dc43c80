//! # Tubecast
//!
//! A self-hostable video sharing backend, usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::Path;
//! use chrono::Duration;
//! use tubecast::auth::TokenSigner;
//! use tubecast::media::DiskMediaStore;
//! use tubecast::server::{AppState, create_router};
//! use tubecast::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/tubecast.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     DiskMediaStore::new(Path::new("./data"), "http://localhost:8080"),
//!     TokenSigner::new("access", "refresh", Duration::days(1), Duration::days(10)),
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod server;
pub mod store;
pub mod types;
pub mod views;
