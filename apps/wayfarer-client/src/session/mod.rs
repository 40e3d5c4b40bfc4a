pub mod models;
pub mod state;
pub mod store;

pub use models::{CheckResponse, Credentials, LoginResponse, SessionUpdate};
pub use state::{AuthState, SessionState, SessionStatus, UserIdentity};
pub use store::SessionStore;
