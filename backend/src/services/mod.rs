pub mod authorization;
pub mod change_request;
pub mod target;

pub use authorization::{AuthorizationPolicy, RolePolicy, WorkflowAction};
pub use change_request::{ChangeRequestService, NewChangeRequest, MAX_APPROVAL_ATTEMPTS};
pub use target::TargetService;
