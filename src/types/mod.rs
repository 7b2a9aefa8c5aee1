pub mod session;
pub mod session_manager;

pub use session::{Bearer, Session, SessionState};
pub use session_manager::SessionDirectory;
