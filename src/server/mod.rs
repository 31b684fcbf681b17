pub mod admin;
mod http_layers;
pub mod server;
pub mod state;

pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
