pub mod comments;
pub mod dashboard;
pub mod dto;
pub mod likes;
pub mod media;
pub mod playlists;
pub mod response;
mod router;
pub mod subscriptions;
pub mod tweets;
pub mod users;
pub mod validation;
pub mod videos;

pub use router::{AppState, create_router};
