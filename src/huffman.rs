//! Canonical Huffman table builder and decoder shared by the LZX pretree,
//! main tree, length tree and aligned-offset tree.
//!
//! Build a `2^table_bits`-entry fast-lookup table from code lengths; codes
//! that fit within `table_bits` decode in one table probe, longer codes
//! fall back to a canonical first-code/first-symbol scan (the "overflow
//! tree" of the contract) keyed by the extra bits beyond `table_bits`.

use std::io;

use crate::bitstream::Bitstream;
use crate::error::corrupt_input;

const MAX_CODE_LENGTH: usize = 16;

#[derive(Clone, Copy)]
struct TableEntry {
    /// Symbol index, or `u16::MAX` if this slot is unused (unreachable
    /// with a complete code, but reachable with an intentionally
    /// incomplete one).
    symbol: u16,
    /// Code length in bits, or 0 if this slot falls through to `overflow`.
    length: u8,
}

/// A decode table built from one vector of per-symbol code lengths.
pub struct HuffmanTable {
    table_bits: u8,
    table: Vec<TableEntry>,
    /// Per-length (first_code, first_symbol_index, count), used for codes
    /// longer than `table_bits` and sorted symbols by (length, symbol).
    overflow_sorted_symbols: Vec<u16>,
    first_code: [u32; MAX_CODE_LENGTH + 1],
    first_symbol_index: [u32; MAX_CODE_LENGTH + 1],
    lengths: Vec<u8>,
    max_length: u8,
    empty: bool,
}

impl HuffmanTable {
    /// Builds a decode table from `lengths` (one entry per symbol, 0 =
    /// unused). `table_bits` bounds the size of the fast-path table, and
    /// should be chosen around the expected common code length (7-9 for
    /// CAB's trees). `allow_incomplete` permits a code whose Kraft sum is
    /// less than 1 (LZX's aligned-offset tree); anything else with a
    /// non-exhausted Kraft sum is a hard error, as is any oversubscribed
    /// code regardless of `allow_incomplete`.
    pub fn build(
        lengths: &[u8],
        table_bits: u8,
        allow_incomplete: bool,
    ) -> io::Result<HuffmanTable> {
        let max_length =
            lengths.iter().copied().max().unwrap_or(0) as usize;
        if max_length == 0 {
            return Ok(HuffmanTable {
                table_bits,
                table: Vec::new(),
                overflow_sorted_symbols: Vec::new(),
                first_code: [0; MAX_CODE_LENGTH + 1],
                first_symbol_index: [0; MAX_CODE_LENGTH + 1],
                lengths: lengths.to_vec(),
                max_length: 0,
                empty: true,
            });
        }
        if max_length > MAX_CODE_LENGTH {
            corrupt_input!(
                "Huffman code length {} exceeds maximum of {}",
                max_length,
                MAX_CODE_LENGTH
            );
        }

        let mut count_per_length = [0u32; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if len > 0 {
                count_per_length[len as usize] += 1;
            }
        }

        // Kraft-inequality check.
        let mut kraft: u64 = 0;
        for (len, &count) in count_per_length.iter().enumerate().skip(1) {
            kraft += (count as u64) << (MAX_CODE_LENGTH - len);
        }
        let full: u64 = 1 << MAX_CODE_LENGTH;
        if kraft > full {
            corrupt_input!(
                "Huffman code table is oversubscribed (Kraft sum {} > 1)",
                kraft as f64 / full as f64
            );
        }
        if kraft < full && !allow_incomplete {
            corrupt_input!(
                "Huffman code table is incomplete (Kraft sum {} < 1)",
                kraft as f64 / full as f64
            );
        }

        // Canonical code assignment: sort symbols by (length, symbol).
        let mut symbols: Vec<u16> = (0..lengths.len() as u16)
            .filter(|&sym| lengths[sym as usize] > 0)
            .collect();
        symbols.sort_by_key(|&sym| (lengths[sym as usize], sym));

        let mut first_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut first_symbol_index = [0u32; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            first_code[len] = code;
            first_symbol_index[len] = index;
            code = (code + count_per_length[len]) << 1;
            index += count_per_length[len];
        }

        let table_size = 1usize << table_bits;
        let mut table = vec![TableEntry { symbol: u16::MAX, length: 0 }; table_size];

        // Assign codes in canonical order and fill the fast-path table.
        let mut code_by_length = first_code;
        for &sym in &symbols {
            let len = lengths[sym as usize];
            let this_code = code_by_length[len as usize];
            code_by_length[len as usize] += 1;
            if len as u8 <= table_bits {
                let shift = table_bits - len;
                let base = (this_code as usize) << shift;
                for fill in 0..(1usize << shift) {
                    table[base | fill] = TableEntry { symbol: sym, length: len };
                }
            }
        }

        Ok(HuffmanTable {
            table_bits,
            table,
            overflow_sorted_symbols: symbols,
            first_code,
            first_symbol_index,
            lengths: lengths.to_vec(),
            max_length: max_length as u8,
            empty: false,
        })
    }

    /// True for the distinguished "all lengths zero" empty tree; decoding
    /// from one is always a hard error for the caller to check up front.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn decode(&self, bits: &mut Bitstream) -> io::Result<u16> {
        if self.empty {
            corrupt_input!("attempted to decode from an empty Huffman tree");
        }
        let probe = bits.peek_bits(self.table_bits)? as usize;
        let entry = self.table[probe];
        if entry.length != 0 {
            bits.read_bits(entry.length)?;
            return Ok(entry.symbol);
        }

        // Overflow: codes longer than table_bits. Walk length by length
        // using the canonical first-code/first-symbol arrays.
        let code = bits.peek_bits(self.max_length)? as u32;
        for len in (self.table_bits + 1)..=self.max_length {
            let shifted = code >> (self.max_length - len);
            let count_at_len = if len as usize + 1 <= MAX_CODE_LENGTH {
                self.first_symbol_index[len as usize + 1]
                    - self.first_symbol_index[len as usize]
            } else {
                self.overflow_sorted_symbols.len() as u32
                    - self.first_symbol_index[len as usize]
            };
            if count_at_len > 0
                && shifted >= self.first_code[len as usize]
                && shifted
                    < self.first_code[len as usize] + count_at_len
            {
                let idx = self.first_symbol_index[len as usize]
                    + (shifted - self.first_code[len as usize]);
                bits.read_bits(len)?;
                return Ok(self.overflow_sorted_symbols[idx as usize]);
            }
        }
        corrupt_input!("Huffman decode found no matching code")
    }

    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }
}
