//! HTTP API handlers

pub mod album;
pub mod disc;
pub mod health;
pub mod playback;
pub mod settings;
pub mod stream;

pub use album::album_routes;
pub use disc::disc_routes;
pub use health::health_routes;
pub use playback::playback_routes;
pub use settings::settings_routes;
pub use stream::stream_routes;
