pub mod change_requests;
pub mod entities;
pub mod health;
