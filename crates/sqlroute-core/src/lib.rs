pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod model;
pub mod providers;
pub mod redaction;
pub mod schema;
pub mod similarity;
pub mod storage;
pub mod tabular;
pub mod translator;

pub use engine::router::{RoutePolicy, Router};
pub use errors::{ErrorKind, RouteError, RouteResult};
pub use model::{Answer, Interaction, QueryOutcome, RecordOutcome, Target};
