//! One handler per supported archive format.

pub mod bz2;
pub mod chasm;
pub mod gob;
pub mod grp;
pub mod gz;
pub mod hog;
pub mod pak;
pub mod pod;
pub mod wad;
pub mod wad2;

use crate::archive::Archive;
use crate::entry::Entry;
use crate::handler::{FormatHandler, FormatId};

static WAD: wad::WadHandler = wad::WadHandler;
static WAD2: wad2::Wad2Handler = wad2::Wad2Handler;
static PAK: pak::PakHandler = pak::PakHandler::QUAKE;
static SIN: pak::PakHandler = pak::PakHandler::SIN;
static GRP: grp::GrpHandler = grp::GrpHandler;
static GOB: gob::GobHandler = gob::GobHandler;
static CHASM_BIN: chasm::ChasmBinHandler = chasm::ChasmBinHandler;
static HOG: hog::HogHandler = hog::HogHandler;
static BZ2: bz2::Bz2Handler = bz2::Bz2Handler;
static GZ: gz::GzHandler = gz::GzHandler;
static POD: pod::PodHandler = pod::PodHandler;

pub(crate) fn handler(id: FormatId) -> &'static dyn FormatHandler {
    match id {
        FormatId::Wad => &WAD,
        FormatId::Wad2 => &WAD2,
        FormatId::Pak => &PAK,
        FormatId::Sin => &SIN,
        FormatId::Grp => &GRP,
        FormatId::Gob => &GOB,
        FormatId::ChasmBin => &CHASM_BIN,
        FormatId::Hog => &HOG,
        FormatId::Bz2 => &BZ2,
        FormatId::Gz => &GZ,
        FormatId::Pod => &POD,
    }
}

/// Offsets for payloads laid out back to back from `start`, and the offset past the last one
pub(crate) fn layout(start: u64, entries: &[(String, &Entry)]) -> (Vec<u64>, u64) {
    let mut offsets = Vec::with_capacity(entries.len());
    let mut next = start;
    for (_, entry) in entries {
        offsets.push(next);
        next += entry.size();
    }
    (offsets, next)
}

/// Name for the single entry of a compressed stream, derived from the archive's file name.
///
/// `renames` maps extensions to the extension the unpacked file gets (`tgz` unpacks to a
/// `tar`); any other matching extension is simply dropped.
pub(crate) fn stream_entry_name(archive: &Archive, renames: &[(&str, Option<&str>)]) -> String {
    let Some(path) = archive.filename() else {
        return "data".to_owned();
    };
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return "data".to_owned();
    };
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    match ext {
        Some(ext) => match renames.iter().find(|(from, _)| *from == ext) {
            Some((_, Some(to))) => format!("{stem}.{to}"),
            Some((_, None)) => stem,
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(stem),
        },
        None => stem,
    }
}
