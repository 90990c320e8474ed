//! This library reads, edits and creates the archive formats of classic game engines.
//!
//! An [`Archive`] holds a tree of [`Directory`] nodes and [`Entry`] leaves. Each format is
//! implemented by a [`FormatHandler`] which turns bytes into that tree and back, and a
//! [`FormatRegistry`] picks the right handler for unknown data.
//!
//! ## Supported Formats
//!
//! Formats are listed in detection order. POD has no signature and is tried last.
//!
//! | Id          | Format                    | Signature              | Directories | Name limit |
//! |-------------|---------------------------|------------------------|-------------|------------|
//! | `wad`       | Doom IWAD/PWAD            | `IWAD`, `PWAD`         | no          | 8          |
//! | `wad2`      | Quake WAD2, Half-Life WAD3| `WAD2`, `WAD3`         | no          | 15         |
//! | `pak`       | Quake PAK                 | `PACK`                 | yes         | 55         |
//! | `sin`       | SiN PAK                   | `SPAK`                 | yes         | 119        |
//! | `grp`       | Build engine GRP          | `KenSilverman`         | no          | 12         |
//! | `gob`       | Dark Forces GOB           | `GOB\x0A`              | no          | 12         |
//! | `chasm_bin` | Chasm: The Rift BIN       | `CSid`                 | no          | 12         |
//! | `hog`       | Descent HOG               | `DHF`                  | no          | 12         |
//! | `bz2`       | BZip2 stream              | `BZh1` to `BZh9`       | single file | -          |
//! | `gz`        | GZip stream               | `1F 8B 08`             | single file | -          |
//! | `pod`       | Terminal Velocity POD     | none                   | yes         | 31         |
//!
//! ## Entries
//!
//! Directory-table formats do not copy entry data on open. Entries point into the source the
//! archive was read from and are loaded on first access:
//!
//! ```
//! use lump_archive::{Archive, ByteBuffer, Entry, FormatId};
//!
//! let mut wad = Archive::new(FormatId::Wad);
//! wad.add_entry("", Entry::with_data("DEMO1", vec![1, 2, 3]), None)?;
//! let bytes = wad.write()?;
//!
//! let mut reopened = Archive::new(FormatId::Wad);
//! reopened.open(bytes)?;
//! assert_eq!(reopened.entry_data("DEMO1")?, &[1, 2, 3]);
//! # Ok::<(), lump_archive::error::Error>(())
//! ```
//!
//! Names longer than a format allows are cut when writing, and each cut is reported as a
//! [`Warning`].
//!
//! ## Additional Information
//!
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Path separator**: `/`, whatever the format stores on disk

pub mod archive;
pub mod buffer;
pub mod directory;
pub mod entry;
pub mod error;
pub mod formats;
pub mod handler;
pub mod hooks;
pub mod options;
pub mod registry;
pub mod source;

pub use archive::{Archive, SignalBlocker};
pub use buffer::ByteBuffer;
pub use directory::Directory;
pub use entry::{Content, Entry, EntryState, PropertyValue, TypeTag};
pub use error::{Error, Warning};
pub use handler::{Capabilities, FormatHandler, FormatId, Mutation};
pub use hooks::{ArchiveEvent, ArchiveObserver, Classifier, ProgressSink};
pub use options::OpenOptions;
pub use registry::FormatRegistry;
pub use source::{DataSource, FileSource};
