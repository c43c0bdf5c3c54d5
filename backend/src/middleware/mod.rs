pub mod caller;
pub mod logging;
pub mod request_id;

pub use caller::*;
pub use logging::*;
pub use request_id::*;
