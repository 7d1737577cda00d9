pub mod members;
pub mod org;
pub mod serve;
