pub mod driver;
pub mod identity;
pub mod job;
pub mod memory;
pub mod model;
pub mod repo;

pub use driver::Driver;
pub use identity::WorkerId;
pub use job::{Job, Outcome};
pub use memory::{MemoryDriver, MemoryStore};
pub use model::{ClaimSize, JobFilter, JobId, JobRecord, NewJob, Scope};
pub use repo::PgDriver;
