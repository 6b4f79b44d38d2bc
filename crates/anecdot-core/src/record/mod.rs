pub mod schema;
pub mod store;

pub use schema::{validate_record, DataRecord, TaskType};
pub use store::{read_records, RecordStore};
