pub mod cluster;
pub mod engine;
pub mod error;
pub mod gc;
pub mod ingest;
pub mod nearest;
pub mod noise;
pub mod reconcile;

pub use cluster::ClusterParams;
pub use engine::{IdentityEngine, LabelOutcome, RenameOutcome, ResolveReport};
pub use error::IdentityError;
