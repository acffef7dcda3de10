pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
pub(self) mod stream_audio;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
