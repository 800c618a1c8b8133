//! Connectors over newline-delimited JSON files.
//!
//! Every connector here takes a required `path` configuration key. Each
//! non-blank line of a file holds one JSON object, which maps to one record.

mod config;
mod factory;
mod reader;
mod stream_reader;
mod stream_writer;
mod writer;

pub use config::JsonlConfig;
pub use factory::{
    register_all, JsonlReaderFactory, JsonlStreamReaderFactory, JsonlStreamWriterFactory,
    JsonlWriterFactory,
};
pub use reader::JsonlReader;
pub use stream_reader::JsonlStreamReader;
pub use stream_writer::JsonlStreamWriter;
pub use writer::JsonlWriter;
