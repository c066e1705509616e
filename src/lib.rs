//! A library for reading, writing, and searching for [Windows
//! cabinet](https://en.wikipedia.org/wiki/Cabinet_(file_format)) (CAB)
//! files.
//!
//! A cabinet is a container format that bundles one or more files, grouped
//! into folders that each carry their own compression scheme (stored
//! uncompressed, or compressed with MSZIP, Quantum, or LZX).  Large payloads
//! are commonly split across a *cabinet set*, a chain of physical `.cab`
//! files whose folders continue from one cabinet into the next; see
//! [`CabinetSet`] for reassembling files that span that chain.
//!
//! ```no_run
//! # fn run() -> std::io::Result<()> {
//! let file = std::fs::File::open("example.cab")?;
//! let mut cabinet = cabinet_engine::Cabinet::new(file)?;
//! for folder in cabinet.folder_entries() {
//!     for file in folder.file_entries() {
//!         println!("{}", file.name());
//!     }
//! }
//! let mut reader = cabinet.read_file("README.txt")?;
//! std::io::copy(&mut reader, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;

mod bitstream;
mod builder;
mod cabinet;
mod checksum;
mod consts;
mod ctype;
mod datetime;
pub mod factory;
mod file;
mod folder;
mod huffman;
pub mod lzss;
mod lzx;
mod mszip;
mod options;
mod quantum;
mod set;
mod string;

pub use crate::builder::{
    CabinetBuilder, CabinetWriter, FileBuilder, FileWriter, FolderBuilder,
};
pub use crate::cabinet::Cabinet;
pub use crate::ctype::CompressionType;
pub use crate::error::{CabError, ErrorKind};
pub use crate::file::{FileEntries, FileEntry, FileReader};
pub use crate::folder::{FolderEntries, FolderEntry};
pub use crate::options::{ExtractOptions, SearchOptions};
pub use crate::set::{CabinetSet, FoundCabinet, OffsetReader};

/// Scans a reader for embedded cabinet files, without assuming one starts
/// at the beginning of the stream.  See [`set::search`] for details.
pub fn search<R: std::io::Read + std::io::Seek>(
    reader: R,
    options: SearchOptions,
) -> std::io::Result<Vec<FoundCabinet>> {
    set::search(reader, options)
}
