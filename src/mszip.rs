use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;

use crate::error::{corrupt_input, decompression_error};

const MSZIP_SIGNATURE: u16 = 0x4B43; // "CK" stored little-endian
const MSZIP_SIGNATURE_LEN: usize = 2;
const MSZIP_BLOCK_TERMINATOR: u16 = 0x0003;
const DEFLATE_MAX_DICT_LEN: usize = 0x8000;
/// How far into a block we'll search for a displaced "CK" signature when
/// tolerant mode is on.
const SIGNATURE_SEARCH_WINDOW: usize = 32;

/// Returns the offset of the "CK" signature within `data`, if present. In
/// non-tolerant mode only offset 0 is checked; in tolerant mode a short
/// window is scanned.
fn find_signature(data: &[u8], tolerant: bool) -> Option<usize> {
    let limit =
        if tolerant { data.len().min(SIGNATURE_SEARCH_WINDOW) } else { 1 };
    (0..limit).find(|&offset| {
        offset + MSZIP_SIGNATURE_LEN <= data.len()
            && ((data[offset] as u16) | ((data[offset + 1] as u16) << 8))
                == MSZIP_SIGNATURE
    })
}

pub struct MsZipCompressor {
    compressor: flate2::Compress,
}

impl MsZipCompressor {
    pub fn new() -> MsZipCompressor {
        MsZipCompressor {
            compressor: flate2::Compress::new(Compression::best(), false),
        }
    }

    pub fn compress_block(
        &mut self,
        data: &[u8],
        is_last_block: bool,
    ) -> io::Result<Vec<u8>> {
        debug_assert!(data.len() <= 0x8000);
        let mut out = Vec::<u8>::with_capacity(0xffff);
        out.write_u16::<LittleEndian>(MSZIP_SIGNATURE)?;
        let flush = if is_last_block {
            flate2::FlushCompress::Finish
        } else {
            flate2::FlushCompress::Sync
        };
        match self.compressor.compress_vec(data, &mut out, flush) {
            Ok(_) => {}
            Err(error) => {
                decompression_error!("MSZIP compression failed: {}", error)
            }
        }
        if !is_last_block {
            out.write_u16::<LittleEndian>(MSZIP_BLOCK_TERMINATOR)?;
        }
        let max_out_len = data.len() + 7;
        if out.len() > max_out_len {
            out = Vec::with_capacity(max_out_len);
            out.write_u16::<LittleEndian>(MSZIP_SIGNATURE)?;
            out.push(1);
            out.write_u16::<LittleEndian>(data.len() as u16)?;
            out.write_u16::<LittleEndian>(!(data.len() as u16))?;
            out.extend_from_slice(data);
            debug_assert_eq!(out.len(), max_out_len);
            debug_assert_eq!(out.capacity(), max_out_len);
        }
        Ok(out)
    }
}

pub struct MsZipDecompressor {
    decompressor: flate2::Decompress,
    dictionary: Vec<u8>,
}

impl MsZipDecompressor {
    pub fn new() -> MsZipDecompressor {
        MsZipDecompressor {
            decompressor: flate2::Decompress::new(false),
            dictionary: Vec::with_capacity(DEFLATE_MAX_DICT_LEN),
        }
    }

    pub fn reset(&mut self) {
        self.decompressor.reset(true);
        self.dictionary = Vec::with_capacity(DEFLATE_MAX_DICT_LEN);
    }

    pub fn decompress_block(
        &mut self,
        data: &[u8],
        uncompressed_size: usize,
        tolerant: bool,
    ) -> io::Result<Vec<u8>> {
        // Check signature. In tolerant mode (salvage or fix_mszip), search a
        // short distance into the block for a displaced "CK" signature
        // rather than failing outright; a few cabinets in the wild insert
        // stray bytes ahead of it.
        let data = match find_signature(data, tolerant) {
            Some(offset) => &data[offset + MSZIP_SIGNATURE_LEN..],
            None => {
                corrupt_input!(
                    "MSZIP decompression failed: Invalid block signature"
                );
            }
        };
        // Reset decompressor with appropriate dictionary:
        self.decompressor.reset(false);
        if !self.dictionary.is_empty() {
            // TODO: Avoid doing extra allocations/copies here.
            debug_assert!(self.dictionary.len() <= DEFLATE_MAX_DICT_LEN);
            let length = self.dictionary.len() as u16;
            let mut chunk: Vec<u8> = vec![0];
            chunk.write_u16::<LittleEndian>(length)?;
            chunk.write_u16::<LittleEndian>(!length)?;
            chunk.extend_from_slice(&self.dictionary);
            let mut out = Vec::with_capacity(self.dictionary.len());
            let flush = flate2::FlushDecompress::Sync;
            match self.decompressor.decompress_vec(&chunk, &mut out, flush) {
                Ok(flate2::Status::Ok) => {}
                _ => unreachable!(),
            }
        }
        // Decompress data:
        let mut out = Vec::<u8>::with_capacity(uncompressed_size);
        let flush = flate2::FlushDecompress::Finish;
        match self.decompressor.decompress_vec(data, &mut out, flush) {
            Ok(_) => {}
            Err(error) => {
                if tolerant {
                    tracing::warn!(
                        "MSZIP block failed to inflate ({}); \
                         padding with zeros in salvage mode",
                        error
                    );
                    out.resize(uncompressed_size, 0);
                } else {
                    corrupt_input!("MSZIP decompression failed: {}", error);
                }
            }
        }
        if out.len() != uncompressed_size {
            if tolerant {
                tracing::warn!(
                    "MSZIP block produced {} bytes (expected {}); \
                     padding with zeros in salvage mode",
                    out.len(),
                    uncompressed_size
                );
                out.resize(uncompressed_size, 0);
            } else {
                corrupt_input!(
                    "MSZIP decompression failed: Incorrect uncompressed size \
                     (expected {}, was actually {})",
                    uncompressed_size,
                    out.len()
                );
            }
        }
        // Update dictionary for next block:
        if out.len() >= DEFLATE_MAX_DICT_LEN {
            let start = out.len() - DEFLATE_MAX_DICT_LEN;
            self.dictionary = out[start..].to_vec();
        } else {
            let total = self.dictionary.len() + out.len();
            if total > DEFLATE_MAX_DICT_LEN {
                self.dictionary.drain(..(total - DEFLATE_MAX_DICT_LEN));
            }
            self.dictionary.extend_from_slice(&out);
        }
        debug_assert_eq!(self.dictionary.capacity(), DEFLATE_MAX_DICT_LEN);
        Ok(out)
    }
}
