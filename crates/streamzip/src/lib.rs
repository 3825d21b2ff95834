//! Streaming ZIP archive reading.
//!
//! This crate reads ZIP archives as a single forward pass over a byte stream,
//! yielding one entry at a time without loading the archive (or any entry)
//! fully into memory. It handles ZIP64 sizes, data-descriptor entries written
//! by streaming producers, and the Store, DEFLATE and bzip2 compression
//! methods.
//!
//! Seeking on the input is an optional capability expressed through the
//! [`Source`] trait: seekable sources skip unread payload cheaply, while
//! unseekable ones (wrap them in [`Pipe`]) are read strictly forward and
//! spooled into a temporary only if a streamed entry forces a central
//! directory lookup.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use streamzip::ZipStreamReader;
//!
//! let mut archive = ZipStreamReader::open("bundle.zip")?;
//! while let Some(mut entry) = archive.next_entry()? {
//!     println!("{} ({} bytes)", entry.name(), entry.size());
//!     let mut content = String::new();
//!     entry.read_to_string(&mut content)?;
//! }
//! # Ok::<(), streamzip::Error>(())
//! ```

mod archive;
mod cdir;
mod entry;
mod error;
mod source;
mod substream;
pub mod zip;

pub use archive::ZipStreamReader;
pub use entry::ZipEntry;
pub use error::{Error, Result};
pub use source::{Pipe, Source};
pub use zip::CompressionMethod;
