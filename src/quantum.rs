//! The Quantum decoder: adaptive arithmetic coding over four literal
//! models, three match-position models, a length model, and a selector
//! model, fed one 32 KiB frame at a time.
//!
//! Grounded on the adaptive-model/arithmetic-coder algorithm of
//! `examples/other_examples/75fccfca_dcarrero-unquantum__src-main.rs.rs`
//! (itself derived from libmspack and QUANTUM.DOC), adapted to CAB framing:
//! Quantum's own container reads one 16-bit checksum between files, but a
//! CAB folder's Quantum stream is instead split into CFDATA blocks, so here
//! each `decompress` call re-reads the frame's `C` initializer and, for a
//! full 32,768-byte frame, scans for the `0xFF` trailer afterward (see
//! DESIGN.md for this adaptation).

use std::io;

use crate::bitstream::{BitWriter, Bitstream};
use crate::consts::FRAME_SIZE;
use crate::error::corrupt_input;

const NUM_CHARS: usize = 256;

const POSITION_BASE: [u32; 42] = [
    0, 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512,
    768, 1024, 1536, 2048, 3072, 4096, 6144, 8192, 12288, 16384, 24576,
    32768, 49152, 65536, 98304, 131072, 196608, 262144, 393216, 524288,
    786432, 1048576, 1572864,
];

const EXTRA_BITS: [u8; 42] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10,
    11, 11, 12, 12, 13, 13, 14, 14, 15, 15, 16, 16, 17, 17, 18, 18, 19, 19,
];

const LENGTH_BASE: [u16; 27] = [
    0, 1, 2, 3, 4, 5, 6, 8, 10, 12, 14, 18, 22, 26, 30, 38, 46, 54, 62, 78,
    94, 110, 126, 158, 190, 222, 254,
];

const LENGTH_EXTRA: [u8; 27] = [
    0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5,
    5, 0,
];

const FRAME_TRAILER: u8 = 0xff;

#[derive(Clone)]
struct ModelSym {
    sym: u16,
    cumfreq: u16,
}

#[derive(Clone)]
struct Model {
    shift_left: i32,
    entries: usize,
    syms: Vec<ModelSym>,
}

impl Model {
    fn new(start: u16, len: usize) -> Self {
        let mut syms = Vec::with_capacity(len + 1);
        for i in 0..=len {
            syms.push(ModelSym { sym: start + i as u16, cumfreq: (len - i) as u16 });
        }
        Model { shift_left: 4, entries: len, syms }
    }

    fn update(&mut self) {
        self.shift_left -= 1;
        if self.shift_left > 0 {
            for i in (0..self.entries).rev() {
                self.syms[i].cumfreq >>= 1;
                if self.syms[i].cumfreq <= self.syms[i + 1].cumfreq {
                    self.syms[i].cumfreq = self.syms[i + 1].cumfreq + 1;
                }
            }
        } else {
            self.shift_left = 50;
            for i in 0..self.entries {
                self.syms[i].cumfreq -= self.syms[i + 1].cumfreq;
                self.syms[i].cumfreq += 1;
                self.syms[i].cumfreq >>= 1;
            }
            for i in 0..self.entries.saturating_sub(1) {
                for j in (i + 1)..self.entries {
                    if self.syms[i].cumfreq < self.syms[j].cumfreq {
                        self.syms.swap(i, j);
                    }
                }
            }
            for i in (0..self.entries).rev() {
                self.syms[i].cumfreq += self.syms[i + 1].cumfreq;
            }
        }
    }

    /// Bumps the cumulative frequency of symbol index `i` (and of every
    /// symbol before it) by 8, rescaling once the total exceeds 3800.
    fn bump(&mut self, i: usize) {
        let mut j = i;
        loop {
            self.syms[j].cumfreq += 8;
            if j == 0 {
                break;
            }
            j -= 1;
        }
        if self.syms[0].cumfreq > 3800 {
            self.update();
        }
    }
}

struct Models {
    literals: [Model; 4],
    pos4: Model,
    pos5: Model,
    pos6: Model,
    length: Model,
    selector: Model,
}

impl Models {
    fn new(window_bits: u8) -> Models {
        let i = (window_bits as usize) * 2;
        Models {
            literals: [
                Model::new(0, 64),
                Model::new(64, 64),
                Model::new(128, 64),
                Model::new(192, 64),
            ],
            pos4: Model::new(0, i.min(24)),
            pos5: Model::new(0, i.min(36)),
            pos6: Model::new(0, i),
            length: Model::new(0, 27),
            selector: Model::new(0, 7),
        }
    }
}

/// The three 16-bit arithmetic-coder registers, shared shape between the
/// decoder and encoder below.
struct Coder {
    h: u16,
    l: u16,
}

impl Coder {
    fn new() -> Coder {
        Coder { h: 0xffff, l: 0 }
    }
}

/// Decodes a Quantum-compressed stream one CAB data block at a time.
pub struct QuantumDecoder {
    window: Vec<u8>,
    window_posn: usize,
    window_bits: u8,
    models: Models,
    coder: Coder,
    c: u16,
}

impl QuantumDecoder {
    pub fn new(window_bits: u8) -> io::Result<QuantumDecoder> {
        if !(10..=21).contains(&window_bits) {
            corrupt_input!(
                "Quantum window bits {} out of the supported 10..=21 range",
                window_bits
            );
        }
        Ok(QuantumDecoder {
            window: vec![0u8; 1usize << window_bits],
            window_posn: 0,
            window_bits,
            models: Models::new(window_bits),
            coder: Coder::new(),
            c: 0,
        })
    }

    pub fn reset(&mut self) {
        self.window_posn = 0;
        self.models = Models::new(self.window_bits);
        self.coder = Coder::new();
        self.c = 0;
    }

    fn decode_symbol(
        &mut self,
        model: usize,
        bits: &mut Bitstream,
    ) -> io::Result<u16> {
        let m = self.model_mut(model);
        let total = m.syms[0].cumfreq as u32;
        if total == 0 {
            corrupt_input!("Quantum model has zero total frequency");
        }
        let range = ((self.coder.h as u32).wrapping_sub(self.coder.l as u32)
            & 0xffff)
            + 1;
        let symf = ((self.c as u32)
            .wrapping_sub(self.coder.l as u32)
            .wrapping_add(1)
            .wrapping_mul(total)
            .wrapping_sub(1)
            / range)
            & 0xffff;

        let mut i = 1usize;
        while i < m.entries {
            if (m.syms[i].cumfreq as u32) <= symf {
                break;
            }
            i += 1;
        }
        let sym = m.syms[i - 1].sym;

        let range2 = (self.coder.h as u32).wrapping_sub(self.coder.l as u32) + 1;
        let new_h = self.coder.l as u32
            + ((m.syms[i - 1].cumfreq as u32 * range2) / total)
            - 1;
        let new_l =
            self.coder.l as u32 + ((m.syms[i].cumfreq as u32 * range2) / total);
        self.coder.h = new_h as u16;
        self.coder.l = new_l as u16;
        m.bump(i - 1);

        loop {
            if (self.coder.l & 0x8000) != (self.coder.h & 0x8000) {
                if (self.coder.l & 0x4000) != 0 && (self.coder.h & 0x4000) == 0
                {
                    self.c ^= 0x4000;
                    self.coder.l &= 0x3fff;
                    self.coder.h |= 0x4000;
                } else {
                    break;
                }
            }
            self.coder.l <<= 1;
            self.coder.h = (self.coder.h << 1) | 1;
            let bit = bits.read_bit()?;
            self.c = (self.c << 1) | bit;
        }

        Ok(sym)
    }

    fn model_mut(&mut self, selector: usize) -> &mut Model {
        match selector {
            0..=3 => &mut self.models.literals[selector],
            4 => &mut self.models.pos4,
            5 => &mut self.models.pos5,
            6 => &mut self.models.pos6,
            7 => &mut self.models.length,
            _ => &mut self.models.selector,
        }
    }

    fn read_position(
        &mut self,
        model: usize,
        bits: &mut Bitstream,
    ) -> io::Result<u32> {
        let slot = self.decode_symbol(model, bits)? as usize;
        if slot >= POSITION_BASE.len() {
            corrupt_input!("Quantum position slot {} out of range", slot);
        }
        let extra = EXTRA_BITS[slot];
        let extra_bits = if extra == 0 { 0 } else { read_many_bits(bits, extra)? };
        Ok(POSITION_BASE[slot] + extra_bits + 1)
    }

    fn push_byte(&mut self, byte: u8) {
        self.window[self.window_posn] = byte;
        self.window_posn = (self.window_posn + 1) & (self.window.len() - 1);
    }

    fn copy_match(&mut self, offset: u32, length: usize) -> io::Result<()> {
        let window_size = self.window.len();
        if offset as usize > window_size {
            corrupt_input!(
                "Quantum match offset {} exceeds window size {}",
                offset,
                window_size
            );
        }
        let mut src =
            (self.window_posn + window_size - offset as usize) & (window_size - 1);
        for _ in 0..length {
            let byte = self.window[src];
            self.push_byte(byte);
            src = (src + 1) & (window_size - 1);
        }
        Ok(())
    }

    /// Decodes exactly `output_size` bytes (at most [`FRAME_SIZE`]) from
    /// `bits`. Re-reads the frame's `C` initializer up front and, once the
    /// full frame has been produced, consumes bytes up to and including the
    /// `0xFF` frame trailer.
    pub fn decompress(
        &mut self,
        bits: &mut Bitstream,
        output_size: usize,
    ) -> io::Result<Vec<u8>> {
        if output_size > FRAME_SIZE {
            corrupt_input!(
                "requested {} bytes from one Quantum frame, more than the {} frame size",
                output_size,
                FRAME_SIZE
            );
        }
        self.c = bits.read_bits(16)?;

        let frame_start = self.window_posn;
        let mut produced = 0usize;
        while produced < output_size {
            let selector = self.decode_symbol(8, bits)? as usize;
            match selector {
                0..=3 => {
                    let sym = self.decode_symbol(selector, bits)?;
                    self.push_byte(sym as u8);
                    produced += 1;
                }
                4 => {
                    let offset = self.read_position(4, bits)?;
                    self.copy_match(offset, 3)?;
                    produced += 3;
                }
                5 => {
                    let offset = self.read_position(5, bits)?;
                    self.copy_match(offset, 4)?;
                    produced += 4;
                }
                6 => {
                    let len_sym = self.decode_symbol(7, bits)? as usize;
                    if len_sym >= LENGTH_BASE.len() {
                        corrupt_input!(
                            "Quantum length slot {} out of range",
                            len_sym
                        );
                    }
                    let extra = LENGTH_EXTRA[len_sym];
                    let extra_bits =
                        if extra == 0 { 0 } else { read_many_bits(bits, extra)? };
                    let length =
                        LENGTH_BASE[len_sym] as u32 + extra_bits + 5;
                    let offset = self.read_position(6, bits)?;
                    let take = (length as usize).min(output_size - produced);
                    self.copy_match(offset, take)?;
                    produced += take;
                }
                other => {
                    corrupt_input!(
                        "Quantum selector {} is out of range",
                        other
                    );
                }
            }
        }

        if output_size == FRAME_SIZE {
            bits.align();
            let mut attempts = 0;
            loop {
                if bits.is_empty() || attempts > 8 {
                    break;
                }
                let byte = bits.read_bits(8)? as u8;
                attempts += 1;
                if byte == FRAME_TRAILER {
                    break;
                }
            }
        }

        let window_size = self.window.len();
        let mut out = Vec::with_capacity(produced);
        let mut pos = frame_start;
        for _ in 0..produced {
            out.push(self.window[pos]);
            pos = (pos + 1) & (window_size - 1);
        }
        Ok(out)
    }
}

fn read_many_bits(bits: &mut Bitstream, mut n: u8) -> io::Result<u32> {
    let mut val = 0u32;
    while n > 0 {
        let chunk = n.min(16);
        val = (val << chunk) | bits.read_bits(chunk)? as u32;
        n -= chunk;
    }
    Ok(val)
}

/// Encodes bytes through the literal-only subset of Quantum: every input
/// byte becomes a selector in 0..=3 (the top two bits) plus a 6-bit
/// remainder through the matching literal model, so `decode(encode(x)) ==
/// x` for any input, even though no real Quantum encoder would forgo
/// matches. See DESIGN.md for why this restricted subset is what `builder`
/// offers for `CompressionType::Quantum`.
pub struct QuantumEncoder {
    window_bits: u8,
    models: Models,
    coder: Coder,
    pending: u32,
}

impl QuantumEncoder {
    pub fn new(window_bits: u8) -> QuantumEncoder {
        QuantumEncoder {
            window_bits,
            models: Models::new(window_bits),
            coder: Coder::new(),
            pending: 0,
        }
    }

    pub fn reset(&mut self) {
        self.models = Models::new(self.window_bits);
        self.coder = Coder::new();
        self.pending = 0;
    }

    fn emit_bit_with_pending(&mut self, writer: &mut BitWriter, bit: u16) {
        writer.write_bit(bit);
        while self.pending > 0 {
            writer.write_bit(bit ^ 1);
            self.pending -= 1;
        }
    }

    fn encode_index(&mut self, model: usize, writer: &mut BitWriter, index: usize) {
        let total;
        let (cum_hi, cum_lo);
        {
            let m = self.model_mut(model);
            total = m.syms[0].cumfreq as u32;
            cum_hi = m.syms[index].cumfreq as u32;
            cum_lo = m.syms[index + 1].cumfreq as u32;
        }
        let range2 = (self.coder.h as u32).wrapping_sub(self.coder.l as u32) + 1;
        let new_h = self.coder.l as u32 + ((cum_hi * range2) / total) - 1;
        let new_l = self.coder.l as u32 + ((cum_lo * range2) / total);
        self.coder.h = new_h as u16;
        self.coder.l = new_l as u16;
        self.model_mut(model).bump(index);

        loop {
            if (self.coder.l & 0x8000) == (self.coder.h & 0x8000) {
                let bit = (self.coder.l >> 15) & 1;
                self.emit_bit_with_pending(writer, bit);
            } else if (self.coder.l & 0x4000) != 0 && (self.coder.h & 0x4000) == 0
            {
                self.pending += 1;
                self.coder.l &= 0x3fff;
                self.coder.h |= 0x4000;
            } else {
                break;
            }
            self.coder.l <<= 1;
            self.coder.h = (self.coder.h << 1) | 1;
        }
    }

    fn model_mut(&mut self, selector: usize) -> &mut Model {
        match selector {
            0..=3 => &mut self.models.literals[selector],
            8 => &mut self.models.selector,
            _ => unreachable!("literal-only encoder never uses model {}", selector),
        }
    }

    fn flush(&mut self, writer: &mut BitWriter) {
        let bit0 = (self.coder.l >> 15) & 1;
        self.emit_bit_with_pending(writer, bit0);
        let bit1 = (self.coder.l >> 14) & 1;
        self.emit_bit_with_pending(writer, bit1);
    }

    /// Encodes `data` (at most [`FRAME_SIZE`] bytes) as one Quantum frame:
    /// every byte through the selector model and its literal model, then a
    /// flush and the `0xFF` frame trailer if this is a full-size frame.
    pub fn compress(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        if data.len() > FRAME_SIZE {
            crate::error::invalid_input!(
                "Quantum frame of {} bytes exceeds the {} frame size",
                data.len(),
                FRAME_SIZE
            );
        }
        let mut writer = BitWriter::new();
        for &byte in data {
            let selector = (byte >> 6) as usize;
            let remainder = (byte & 0x3f) as usize;
            self.encode_index(8, &mut writer, selector);
            self.encode_index(selector, &mut writer, remainder);
        }
        self.flush(&mut writer);
        if data.len() == FRAME_SIZE {
            writer.write_aligned_byte(FRAME_TRAILER);
        }
        Ok(writer.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_tables_agree_on_length() {
        assert_eq!(POSITION_BASE.len(), EXTRA_BITS.len());
        assert_eq!(LENGTH_BASE.len(), LENGTH_EXTRA.len());
    }

    #[test]
    fn literal_round_trip_small_frame() {
        let data = b"Hello, Quantum world! Hello again.".to_vec();
        let mut encoder = QuantumEncoder::new(16);
        let compressed = encoder.compress(&data).unwrap();

        let mut decoder = QuantumDecoder::new(16).unwrap();
        let mut bits = Bitstream::new(&compressed, false);
        let decompressed = decoder.decompress(&mut bits, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn literal_round_trip_repeats_bytes() {
        let data = vec![b'z'; 500];
        let mut encoder = QuantumEncoder::new(12);
        let compressed = encoder.compress(&data).unwrap();

        let mut decoder = QuantumDecoder::new(12).unwrap();
        let mut bits = Bitstream::new(&compressed, false);
        let decompressed = decoder.decompress(&mut bits, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn rejects_out_of_range_window_bits() {
        assert!(QuantumDecoder::new(9).is_err());
        assert!(QuantumDecoder::new(22).is_err());
    }
}
