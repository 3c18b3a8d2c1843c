//! Monitor-side state.

pub mod session_manager;

pub use session_manager::SessionManager;
