//! Scanning a file for embedded cabinets, and linking/merging the
//! cabinets of a multi-part set.
//!
//! [`search`] finds candidate cabinet headers anywhere in a file (a
//! cabinet need not start at offset zero: self-extracting installers and
//! some disk images embed one after other data). [`CabinetSet`] then links
//! cabinets found this way (or opened by name from a prev/next-cabinet
//! chain) and reconstructs files whose data spans more than one of them.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::cabinet::Cabinet;
use crate::consts;
use crate::ctype::Decompressor;
use crate::error::{corrupt_directory, invalid_input, not_found};
use crate::file::FileEntry;
use crate::folder;
use crate::options::{ExtractOptions, SearchOptions};

/// A candidate cabinet header found by [`search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundCabinet {
    /// The byte offset of the candidate's "MSCF" signature within the
    /// scanned file.
    pub offset: u64,
    /// The candidate's self-reported total length, in bytes.
    pub length: u32,
}

/// Scans `reader` for "MSCF" cabinet signatures, reading it in
/// `options.buffer_size`-byte chunks, and returns every candidate whose
/// header fields are internally consistent.
///
/// A candidate is accepted only if: its reported total length does not
/// run more than 32 bytes past the end of the file (some cabinets carry a
/// few bytes of trailing padding); its first-file offset falls inside its
/// own length; and its format version is 1.3, unless `options.salvage` is
/// set. An "ISc(" signature (used by InstallShield's own cabinet-like
/// container) is recognized and logged as a warning, but never treated as
/// a Microsoft cabinet.
///
/// Results are returned in ascending offset order, which is also the
/// order a caller should feed them pairwise into [`CabinetSet::append`]
/// to link them into a chain.
pub fn search<R: Read + Seek>(
    mut reader: R,
    options: SearchOptions,
) -> io::Result<Vec<FoundCabinet>> {
    let file_length = reader.seek(SeekFrom::End(0))?;
    let buffer_size = options.buffer_size.max(4);
    let mut found = Vec::new();
    let mut position = 0u64;
    let mut overlap: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; buffer_size];
    while position < file_length {
        reader.seek(SeekFrom::Start(position))?;
        let bytes_read = read_chunk(&mut reader, &mut buf)?;
        if bytes_read == 0 {
            break;
        }
        let window_start = position - overlap.len() as u64;
        let mut window = std::mem::take(&mut overlap);
        window.extend_from_slice(&buf[..bytes_read]);

        let mut i = 0;
        while i + 4 <= window.len() {
            match &window[i..i + 4] {
                b"MSCF" => {
                    let offset = window_start + i as u64;
                    if let Some(candidate) = validate_candidate(
                        &mut reader,
                        offset,
                        file_length,
                        options,
                    )? {
                        found.push(candidate);
                    }
                }
                b"ISc(" => {
                    tracing::warn!(
                        "InstallShield cabinet signature at offset {} is \
                         not a Microsoft cabinet; skipping",
                        window_start + i as u64
                    );
                }
                _ => {}
            }
            i += 1;
        }

        let keep = window.len().min(3);
        overlap = window[window.len() - keep..].to_vec();
        position += bytes_read as u64;
    }
    Ok(found)
}

fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Header field layout, relative to the "MSCF" signature: see
/// `Cabinet::new` for the authoritative field-by-field parse.
const TOTAL_SIZE_OFFSET: u64 = 8;
const FIRST_FILE_OFFSET_OFFSET: u64 = 16;
const VERSION_OFFSET: u64 = 24;

fn validate_candidate<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    file_length: u64,
    options: SearchOptions,
) -> io::Result<Option<FoundCabinet>> {
    reader.seek(SeekFrom::Start(offset + TOTAL_SIZE_OFFSET))?;
    let total_size = reader.read_u32::<LittleEndian>()?;
    if total_size == 0 || offset + total_size as u64 > file_length + 32 {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(offset + FIRST_FILE_OFFSET_OFFSET))?;
    let first_file_offset = reader.read_u32::<LittleEndian>()?;
    if first_file_offset >= total_size {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(offset + VERSION_OFFSET))?;
    let minor_version = reader.read_u8()?;
    let major_version = reader.read_u8()?;
    let is_1_3 =
        major_version == consts::VERSION_MAJOR && minor_version == consts::VERSION_MINOR;
    if !is_1_3 && !options.salvage {
        return Ok(None);
    }
    if !is_1_3 {
        tracing::warn!(
            "cabinet at offset {} reports version {}.{} instead of {}.{}; \
             accepting in salvage mode",
            offset,
            major_version,
            minor_version,
            consts::VERSION_MAJOR,
            consts::VERSION_MINOR
        );
    }
    Ok(Some(FoundCabinet { offset, length: total_size }))
}

/// A `Read + Seek` view of `inner` that treats `base` as position zero.
///
/// Lets [`Cabinet::new`] parse a cabinet embedded at a nonzero offset
/// within a larger file (as [`search`] finds them) as though it were a
/// standalone file. Only `SeekFrom::Start` and `SeekFrom::Current` are
/// translated; cabinet parsing never issues a `SeekFrom::End`, so that
/// case is passed straight through to `inner` rather than guessing at
/// this sub-cabinet's length.
pub struct OffsetReader<R> {
    inner: R,
    base: u64,
}

impl<R: Read + Seek> OffsetReader<R> {
    /// Wraps `inner`, treating byte `base` of `inner` as position zero.
    /// Seeks `inner` to `base` immediately so reads can begin right away.
    pub fn new(mut inner: R, base: u64) -> io::Result<OffsetReader<R>> {
        inner.seek(SeekFrom::Start(base))?;
        Ok(OffsetReader { inner, base })
    }
}

impl<R: Read> Read for OffsetReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Seek for OffsetReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let translated = match pos {
            SeekFrom::Start(offset) => SeekFrom::Start(self.base + offset),
            other => other,
        };
        let absolute = self.inner.seek(translated)?;
        Ok(absolute.saturating_sub(self.base))
    }
}

/// A collection of cabinets linked into one or more multi-part chains,
/// able to reconstruct files whose data spans more than one cabinet.
pub struct CabinetSet<R> {
    cabinets: Vec<Cabinet<R>>,
    next_link: Vec<Option<usize>>,
    prev_link: Vec<Option<usize>>,
}

impl<R: Read + Seek> CabinetSet<R> {
    /// Returns a new, empty cabinet set.
    pub fn new() -> CabinetSet<R> {
        CabinetSet { cabinets: Vec::new(), next_link: Vec::new(), prev_link: Vec::new() }
    }

    /// Adds `cabinet` to the set, unlinked, and returns its index.
    pub fn add(&mut self, cabinet: Cabinet<R>) -> usize {
        self.cabinets.push(cabinet);
        self.next_link.push(None);
        self.prev_link.push(None);
        self.cabinets.len() - 1
    }

    /// Returns the number of cabinets in the set.
    pub fn len(&self) -> usize {
        self.cabinets.len()
    }

    /// Returns whether the set has no cabinets.
    pub fn is_empty(&self) -> bool {
        self.cabinets.is_empty()
    }

    /// Returns the cabinet at `index`.
    pub fn cabinet(&self, index: usize) -> &Cabinet<R> {
        &self.cabinets[index]
    }

    /// Links `later` as the cabinet immediately following `earlier` in a
    /// multi-part chain. Rejects linking a cabinet to itself, an
    /// out-of-range index, or either cabinet being already linked on that
    /// side.
    pub fn append(&mut self, earlier: usize, later: usize) -> io::Result<()> {
        self.link(earlier, later)
    }

    /// Links `earlier` as the cabinet immediately preceding `later` in a
    /// multi-part chain. Equivalent to `append(earlier, later)`; provided
    /// for call sites that naturally have the later cabinet in hand first.
    pub fn prepend(&mut self, later: usize, earlier: usize) -> io::Result<()> {
        self.link(earlier, later)
    }

    fn link(&mut self, earlier: usize, later: usize) -> io::Result<()> {
        if earlier == later {
            invalid_input!("Cannot merge a cabinet with itself");
        }
        if earlier >= self.cabinets.len() || later >= self.cabinets.len() {
            invalid_input!(
                "Cabinet index out of range (set has {} cabinets)",
                self.cabinets.len()
            );
        }
        if self.next_link[earlier].is_some() {
            invalid_input!(
                "Cabinet {} is already linked to a following cabinet",
                earlier
            );
        }
        if self.prev_link[later].is_some() {
            invalid_input!(
                "Cabinet {} is already linked to a preceding cabinet",
                later
            );
        }
        self.next_link[earlier] = Some(later);
        self.prev_link[later] = Some(earlier);
        Ok(())
    }

    /// Reads the full decompressed contents of the file named `name`,
    /// reconstructing it across cabinet boundaries if its data was split
    /// at merge time.
    ///
    /// A single decompressor is reused across every cabinet segment a
    /// spanning file touches, so that LZX/Quantum window state (and the
    /// MSZIP dictionary) carries across the boundary exactly as it would
    /// reading the data as one continuous stream.
    pub fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        let (mut cab_index, mut entry) = self.find_chain_start(name)?;
        let mut decompressor: Option<Decompressor> = None;
        let mut out = Vec::new();
        loop {
            let cab = &self.cabinets[cab_index];
            let folder_index = physical_folder_index(cab, entry.folder_index());
            if folder_index >= cab.folders().len() {
                corrupt_directory!(
                    "Cabinet {} has no folder for continuation of {:?}",
                    cab_index,
                    name
                );
            }
            let folder_entry = &cab.folders()[folder_index];
            if decompressor.is_none() {
                decompressor = Some(folder_entry.compression_type().into_decompressor()?);
            }
            let decompressed = folder::read_all_blocks(
                cab.as_dyn(),
                folder_entry,
                cab.data_reserve_size(),
                ExtractOptions::default(),
                decompressor.as_mut().unwrap(),
            )?;
            let local_offset = entry.uncompressed_offset() as usize;
            let local_len = entry.uncompressed_size() as usize;
            if local_offset.saturating_add(local_len) > decompressed.len() {
                corrupt_directory!(
                    "Folder data for {:?} is shorter than its file entry claims",
                    name
                );
            }
            out.extend_from_slice(&decompressed[local_offset..local_offset + local_len]);

            let continues = matches!(
                entry.folder_index(),
                consts::FOLDER_CONTINUES_TO_NEXT
                    | consts::FOLDER_CONTINUES_PREV_AND_NEXT
            );
            if !continues {
                break;
            }
            let next_index = match self.next_link[cab_index] {
                Some(index) => index,
                None => corrupt_directory!(
                    "File {:?} continues into a cabinet that was never linked",
                    name
                ),
            };
            let next_entry = self.cabinets[next_index]
                .files()
                .iter()
                .find(|file| {
                    file.name() == name
                        && matches!(
                            file.folder_index(),
                            consts::FOLDER_CONTINUES_FROM_PREV
                                | consts::FOLDER_CONTINUES_PREV_AND_NEXT
                        )
                })
                .cloned();
            entry = match next_entry {
                Some(entry) => entry,
                None => not_found!(
                    "Cabinet {} has no continuation entry for {:?}",
                    next_index,
                    name
                ),
            };
            cab_index = next_index;
        }
        Ok(out)
    }

    fn find_chain_start(&self, name: &str) -> io::Result<(usize, FileEntry)> {
        for (index, cab) in self.cabinets.iter().enumerate() {
            if let Some(file) = cab.files().iter().find(|file| file.name() == name) {
                if file.folder_index() != consts::FOLDER_CONTINUES_FROM_PREV {
                    return Ok((index, file.clone()));
                }
            }
        }
        not_found!("No such file in cabinet set: {:?}", name);
    }
}

impl<R: Read + Seek> Default for CabinetSet<R> {
    fn default() -> CabinetSet<R> {
        CabinetSet::new()
    }
}

/// Maps a file entry's folder index to the physical folder that actually
/// backs it: sentinel indices select the last folder (continuing into
/// the next cabinet) or the first folder (continuing from the previous
/// one); an ordinary index is used as-is.
fn physical_folder_index<R: Read + Seek>(
    cab: &Cabinet<R>,
    folder_index: u16,
) -> usize {
    match folder_index {
        consts::FOLDER_CONTINUES_FROM_PREV => 0,
        consts::FOLDER_CONTINUES_TO_NEXT => cab.folders().len().saturating_sub(1),
        consts::FOLDER_CONTINUES_PREV_AND_NEXT => 0,
        other => other as usize,
    }
}
