pub mod builds;
pub mod schema;
