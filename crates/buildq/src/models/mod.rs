pub mod build;

pub use build::{
    BuildId, BuildProperties, BuildRow, BuildView, PropertyBundle, PropertyEntry, json_schema,
};
