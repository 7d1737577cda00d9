pub mod members;
pub mod org;
pub mod pagination;
pub mod query;
pub mod roles;
