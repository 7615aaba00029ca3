//! Partition reader components
//!
//! This module provides the binary row codec, the async partition reader and
//! its blocking iterator wrapper.

pub mod binary;
pub mod decode;
pub mod encode;
mod iter;
mod value;

pub use binary::{open_reader, BinaryRecordReader, ReaderState, ReaderStatus};
pub use decode::{
    decode_boolean, decode_data, decode_index_entry, decode_integer, decode_length, decode_list,
    decode_real, decode_record, decode_string, decode_unsigned, decode_value, skip_value,
    RecordPlan,
};
pub use encode::{encode_index_entry_into, encode_record, encode_record_into, encode_value};
pub use iter::RecordReadIterator;
pub use value::{Record, Value};
