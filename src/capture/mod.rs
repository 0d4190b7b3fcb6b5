pub mod naming;
pub mod persist;
pub mod record;
pub mod storage;
pub mod worker;

pub use naming::claim_capture_file;
pub use persist::{CaptureBlock, CapturePersist, PersistReport, Persister};
pub use record::{EventRecord, EventTemplate, SharedTemplate, StoreRecord};
pub use worker::PersistWorker;
