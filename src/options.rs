//! Configuration structs consumed by the extractor and by cabinet search.
//!
//! Kept as small, explicit option structs rather than positional bools,
//! following the teacher's settings-on-a-builder convention (compare
//! `FileBuilder::set_is_read_only`).

/// Options controlling how a cabinet's files are extracted.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Convert checksum, CK-signature, and bitstream-underflow failures into
    /// warnings plus best-effort continuation instead of hard errors.
    pub salvage: bool,
    /// Enable MSZIP's CK-signature search tolerance even when `salvage` is
    /// off. A handful of cabinets in the wild have a `CK` block signature
    /// that isn't at the very start of the block's payload.
    pub fix_mszip: bool,
    /// Apply each file's DOS date/time as the extracted file's last-modified
    /// timestamp.
    pub set_timestamps: bool,
}

impl Default for ExtractOptions {
    fn default() -> ExtractOptions {
        ExtractOptions { salvage: false, fix_mszip: false, set_timestamps: true }
    }
}

impl ExtractOptions {
    /// Returns new default extraction options (no salvage, timestamps set).
    pub fn new() -> ExtractOptions {
        ExtractOptions::default()
    }

    /// Sets whether checksum/bitstream failures should be downgraded to
    /// warnings with best-effort continuation.
    pub fn set_salvage(&mut self, salvage: bool) -> &mut ExtractOptions {
        self.salvage = salvage;
        self
    }

    /// Sets whether MSZIP's CK-signature search tolerance is enabled outside
    /// of salvage mode.
    pub fn set_fix_mszip(&mut self, fix_mszip: bool) -> &mut ExtractOptions {
        self.fix_mszip = fix_mszip;
        self
    }

    /// Sets whether extracted files should have their timestamp set from
    /// the cabinet's DOS date/time field.
    pub fn set_timestamps(&mut self, set_timestamps: bool) -> &mut ExtractOptions {
        self.set_timestamps = set_timestamps;
        self
    }

    pub(crate) fn tolerant(&self) -> bool {
        self.salvage || self.fix_mszip
    }
}

/// Options controlling how [`crate::set::search`] scans a file for embedded
/// cabinets.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Size, in bytes, of the chunks read while scanning for the "MSCF"
    /// signature.
    pub buffer_size: usize,
    /// Accept candidate headers with a cabinet format version other than
    /// 1.3, instead of rejecting them as unsupported.
    pub salvage: bool,
}

impl Default for SearchOptions {
    fn default() -> SearchOptions {
        SearchOptions {
            buffer_size: crate::consts::DEFAULT_SEARCH_BUFFER_SIZE,
            salvage: false,
        }
    }
}

impl SearchOptions {
    /// Returns new default search options (32,768-byte scan buffer, strict
    /// version checking).
    pub fn new() -> SearchOptions {
        SearchOptions::default()
    }

    /// Sets the size of the chunks read while scanning for "MSCF".
    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut SearchOptions {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets whether candidate headers with a non-1.3 format version are
    /// accepted rather than rejected.
    pub fn set_salvage(&mut self, salvage: bool) -> &mut SearchOptions {
        self.salvage = salvage;
        self
    }
}
