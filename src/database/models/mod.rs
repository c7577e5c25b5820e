pub mod session;
pub mod token_shift;
pub mod user;
