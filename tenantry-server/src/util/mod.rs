pub mod app_state;
pub mod bson_query;
pub mod logging;
pub mod query;
