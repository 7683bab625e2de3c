//! ClinicBook Types - foundation types for the auth subsystem
//!
//! This crate has no dependencies on other clinicbook crates. It defines:
//!
//! - Identity types (UserId, SessionId, SecurityEventId)
//! - The authenticated user identity and role
//! - The [`Clock`] abstraction used for every expiry decision

pub mod clock;
pub mod identity;
pub mod user;

pub use clock::*;
pub use identity::*;
pub use user::*;
