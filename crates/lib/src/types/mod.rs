//! Core data types shared by the engine, resolver and adapters.

mod identity;
mod profile;
mod session;

pub use identity::{CurrentUser, DerivedIdentity};
pub use profile::{DisplayName, Profile, Role};
pub use session::{Credentials, Session};
