//! Auth-domain token models, expiry evaluation, and user profile shapes.

pub mod clock;
pub mod profile;
pub mod token;

pub use clock::*;
pub use profile::*;
pub use token::*;
