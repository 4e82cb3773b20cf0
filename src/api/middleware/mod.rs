pub mod auth;

pub use auth::{AuthenticatedUser, BearerIdentity, Identity, MaybeUser};
