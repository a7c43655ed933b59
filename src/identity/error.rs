use thiserror::Error;
use crate::models::face::{FaceId, PersonId};

/// Failures the caller can act on. Store failures travel as plain `anyhow`
/// errors next to these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("face {0} not found")]
    FaceNotFound(FaceId),
    #[error("person {0} not found")]
    PersonNotFound(PersonId),
    #[error("cannot merge a person into itself")]
    SelfMerge,
    #[error("name must not be empty")]
    EmptyName,
    #[error("face {0} has no person to confirm or reject")]
    NotLabeled(FaceId),
}
