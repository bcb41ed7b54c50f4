pub mod plan;
pub mod session;
pub mod user;
