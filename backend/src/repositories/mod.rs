pub mod change_request;
pub mod common;
pub mod memory;
pub mod target;

pub use change_request::{
    ApprovalOutcome, ChangeRequestFilters, ChangeRequestRepositoryTrait, PgChangeRequestRepository,
    RequestScope, TargetWrite,
};
pub use memory::InMemoryStore;
pub use target::{PgTargetRepository, TargetRepositoryTrait};

#[cfg(test)]
pub use change_request::MockChangeRequestRepositoryTrait;
#[cfg(test)]
pub use target::MockTargetRepositoryTrait;
