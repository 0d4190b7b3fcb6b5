pub mod publisher;
pub mod store;

pub use publisher::{EventPublisher, HttpPublisher, PublisherOptions};
pub use store::{RecordStore, SqliteRecordStore};
