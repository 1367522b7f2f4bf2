//! Read phase: staged files back into typed rows and record batches.
//!
//! The reader module is organized into:
//! - `source` - listing and opening staged files
//! - `record` - splitting and converting a single staged record
//! - `partition` - streaming rows out of one staged file
//! - `batch` - assembling rows into Arrow record batches

pub mod batch;
pub mod partition;
pub mod record;
pub mod source;

pub use batch::{count_batch, rows_to_batch};
pub use partition::{PartitionReader, RowStream, DEFAULT_BATCH_SIZE};
pub use record::{convert_row, decode_field, split_record, StagedRecord};
pub use source::{LocalStagedFiles, PartitionInput, StagedFileSource, StagedPartition};
