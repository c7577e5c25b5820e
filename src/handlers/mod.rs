// Public handlers issue credentials; everything else sits behind the
// /api access gate.

pub mod auth;
pub mod shifting;
