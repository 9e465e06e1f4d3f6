mod state;

pub use state::{AppState, ConnectionGuard};
