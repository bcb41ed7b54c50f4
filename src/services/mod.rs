pub mod accounts;
pub mod genius;
pub mod limits;
pub mod parser;
pub mod resolver;
pub mod subscription;
