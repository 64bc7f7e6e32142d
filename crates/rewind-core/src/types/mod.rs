//! Core types for rewind.

mod event;
mod key;
mod report;
mod value_type;
mod version;

pub use event::{decode_batch, parse_event_time, ChangeEvent, DecodedMessage, Operation};
pub use key::{validate_key, Target, SEPARATOR};
pub use report::{
    BatchReport, KeyFailure, PreviewRow, ResolvedState, ResolvedValue, RestoreOutcome, RestoreRow,
};
pub use value_type::ValueType;
pub use version::{
    etag, KeyHistory, VersionMetadata, VersionRecord, TAG_APPROXIMATE, TAG_DESCRIPTION, TAG_TIME,
    TAG_TYPE,
};
