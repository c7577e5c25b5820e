pub mod credential_service;
pub mod session_service;
pub mod shift_service;

pub use credential_service::{CredentialService, TokenPair};
pub use session_service::SessionService;
pub use shift_service::{ShiftRequest, ShiftService};
