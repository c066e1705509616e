//! Name-indexed registry of compression algorithms.
//!
//! Generalizes the dispatch [`crate::ctype::CompressionType::from_bitfield`]
//! already does by numeric tag into a name-addressable registry, so that
//! callers (and tests) can register, list, and swap out algorithms without
//! touching `ctype.rs`. A process-wide default registry is seeded with the
//! four built-in algorithms; callers needing isolation (parallel tests,
//! dependency injection) can build their own [`AlgorithmRegistry`] instead.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::ctype::CompressionType;
use crate::error::invalid_input;
use std::io;

/// Whether a registered algorithm is used for encoding or decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// An algorithm used to compress data into a folder.
    Encoder,
    /// An algorithm used to decompress a folder's data.
    Decoder,
}

/// The parameters a construction function may need, gathered into one bag
/// since different algorithms use different subsets of them (MSZIP and
/// None need none of these; Quantum needs `level`/`memory`; LZX needs
/// `window_bits`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlgorithmParams {
    /// Quantum compression level (1-7).
    pub level: u16,
    /// Quantum memory/window size, as a base-2 exponent (10-21).
    pub memory: u16,
    /// LZX window size, as a base-2 exponent (15-21).
    pub window_bits: u8,
}

/// A function that builds a [`CompressionType`] from registry parameters.
/// This is the "required construction signature" registration checks for.
pub type ConstructFn = fn(&AlgorithmParams) -> io::Result<CompressionType>;

#[derive(Clone, Copy)]
struct Registration {
    construct: ConstructFn,
    priority: i32,
    format_tag: Option<u16>,
}

/// A registry of named encoder/decoder algorithms.
///
/// [`AlgorithmRegistry::default_registry`] returns the process-wide
/// registry, lazily initialized with the four built-in algorithms and
/// guarded by a mutex, per the single mutable-shared-resource policy this
/// engine allows. Construct a fresh [`AlgorithmRegistry::new`] (unseeded)
/// or [`AlgorithmRegistry::with_builtins`] for a private, unsynchronized
/// instance, e.g. in tests that register fakes.
pub struct AlgorithmRegistry {
    decoders: HashMap<String, Registration>,
    encoders: HashMap<String, Registration>,
}

static DEFAULT_REGISTRY: OnceLock<Mutex<AlgorithmRegistry>> = OnceLock::new();

impl AlgorithmRegistry {
    /// Returns a new, empty registry (no built-in algorithms registered).
    pub fn new() -> AlgorithmRegistry {
        AlgorithmRegistry {
            decoders: HashMap::new(),
            encoders: HashMap::new(),
        }
    }

    /// Returns a new registry pre-populated with the four built-in
    /// algorithms (`none`, `mszip`, `quantum`, `lzx`) as both encoders and
    /// decoders.
    pub fn with_builtins() -> AlgorithmRegistry {
        let mut registry = AlgorithmRegistry::new();
        for &(name, construct) in BUILTINS {
            registry
                .register(name, Category::Decoder, construct, 0, None)
                .expect("built-in registration is always well-formed");
            registry
                .register(name, Category::Encoder, construct, 0, None)
                .expect("built-in registration is always well-formed");
        }
        registry
    }

    /// Returns the process-wide default registry, lazily seeded with the
    /// built-in algorithms on first use.
    pub fn default_registry() -> MutexGuard<'static, AlgorithmRegistry> {
        DEFAULT_REGISTRY
            .get_or_init(|| Mutex::new(AlgorithmRegistry::with_builtins()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `name` under `category`, built by `construct` when
    /// requested. `priority` and `format_tag` are stored but only advisory:
    /// `format_tag`, when set, is the numeric compression-type tag this
    /// name should also resolve from in [`AlgorithmRegistry::create`].
    pub fn register(
        &mut self,
        name: &str,
        category: Category,
        construct: ConstructFn,
        priority: i32,
        format_tag: Option<u16>,
    ) -> io::Result<()> {
        if name.is_empty() {
            invalid_input!("Algorithm name must not be empty");
        }
        let table = self.table_mut(category);
        table.insert(
            name.to_string(),
            Registration { construct, priority, format_tag },
        );
        Ok(())
    }

    /// Removes `name`'s registration under `category`, if present.
    pub fn unregister(&mut self, name: &str, category: Category) {
        self.table_mut(category).remove(name);
    }

    /// Returns whether `name` is registered under `category`.
    pub fn registered(&self, name: &str, category: Category) -> bool {
        self.table(category).contains_key(name)
            || normalize_numeric_tag(name)
                .map(|normalized| self.table(category).contains_key(normalized))
                .unwrap_or(false)
    }

    /// Returns the registered names under `category`, highest priority
    /// first, ties broken alphabetically.
    pub fn list(&self, category: Category) -> Vec<String> {
        let mut names: Vec<(&String, &Registration)> =
            self.table(category).iter().collect();
        names.sort_by(|(name_a, reg_a), (name_b, reg_b)| {
            reg_b.priority.cmp(&reg_a.priority).then_with(|| name_a.cmp(name_b))
        });
        names.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Builds the algorithm named (or numerically tagged) `name_or_tag`
    /// under `category`. Numeric tags `"0"`/`"1"`/`"2"`/`"3"` normalize to
    /// `none`/`mszip`/`quantum`/`lzx` before lookup.
    pub fn create(
        &self,
        name_or_tag: &str,
        category: Category,
        params: &AlgorithmParams,
    ) -> io::Result<CompressionType> {
        let name = normalize_numeric_tag(name_or_tag).unwrap_or(name_or_tag);
        match self.table(category).get(name) {
            Some(registration) => (registration.construct)(params),
            None => invalid_input!(
                "No {} registered named {:?}",
                match category {
                    Category::Encoder => "encoder",
                    Category::Decoder => "decoder",
                },
                name_or_tag
            ),
        }
    }

    fn table(&self, category: Category) -> &HashMap<String, Registration> {
        match category {
            Category::Encoder => &self.encoders,
            Category::Decoder => &self.decoders,
        }
    }

    fn table_mut(
        &mut self,
        category: Category,
    ) -> &mut HashMap<String, Registration> {
        match category {
            Category::Encoder => &mut self.encoders,
            Category::Decoder => &mut self.decoders,
        }
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> AlgorithmRegistry {
        AlgorithmRegistry::new()
    }
}

/// Normalizes a numeric compression-type tag ("0"/"1"/"2"/"3") to its
/// canonical algorithm name, per spec.md's `none`/`mszip`/`quantum`/`lzx`
/// mapping. Returns `None` for anything else (including already-canonical
/// names, which the caller falls back to unchanged).
fn normalize_numeric_tag(name_or_tag: &str) -> Option<&'static str> {
    match name_or_tag {
        "0" => Some("none"),
        "1" => Some("mszip"),
        "2" => Some("quantum"),
        "3" => Some("lzx"),
        _ => None,
    }
}

fn construct_none(_params: &AlgorithmParams) -> io::Result<CompressionType> {
    Ok(CompressionType::None)
}

fn construct_mszip(_params: &AlgorithmParams) -> io::Result<CompressionType> {
    Ok(CompressionType::MsZip)
}

fn construct_quantum(
    params: &AlgorithmParams,
) -> io::Result<CompressionType> {
    Ok(CompressionType::Quantum(params.level, params.memory))
}

fn construct_lzx(params: &AlgorithmParams) -> io::Result<CompressionType> {
    Ok(CompressionType::Lzx(params.window_bits))
}

const BUILTINS: &[(&str, ConstructFn)] = &[
    ("none", construct_none as ConstructFn),
    ("mszip", construct_mszip as ConstructFn),
    ("quantum", construct_quantum as ConstructFn),
    ("lzx", construct_lzx as ConstructFn),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_as_both_encoder_and_decoder() {
        let registry = AlgorithmRegistry::with_builtins();
        for name in ["none", "mszip", "quantum", "lzx"] {
            assert!(registry.registered(name, Category::Decoder));
            assert!(registry.registered(name, Category::Encoder));
        }
    }

    #[test]
    fn numeric_tags_normalize_to_builtin_names() {
        let registry = AlgorithmRegistry::with_builtins();
        let params = AlgorithmParams::default();
        assert_eq!(
            registry.create("1", Category::Decoder, &params).unwrap(),
            CompressionType::MsZip
        );
        assert_eq!(
            registry.create("3", Category::Decoder, &params).unwrap(),
            CompressionType::Lzx(0)
        );
    }

    #[test]
    fn create_with_quantum_params() {
        let registry = AlgorithmRegistry::with_builtins();
        let params = AlgorithmParams { level: 3, memory: 16, window_bits: 0 };
        assert_eq!(
            registry.create("quantum", Category::Decoder, &params).unwrap(),
            CompressionType::Quantum(3, 16)
        );
    }

    #[test]
    fn unregister_removes_only_the_given_category() {
        let mut registry = AlgorithmRegistry::with_builtins();
        registry.unregister("lzx", Category::Decoder);
        assert!(!registry.registered("lzx", Category::Decoder));
        assert!(registry.registered("lzx", Category::Encoder));
    }

    #[test]
    fn create_rejects_unknown_name() {
        let registry = AlgorithmRegistry::with_builtins();
        let params = AlgorithmParams::default();
        assert!(registry
            .create("rot13", Category::Decoder, &params)
            .is_err());
    }

    #[test]
    fn list_is_stable_and_alphabetical_within_priority() {
        let registry = AlgorithmRegistry::with_builtins();
        let mut names = registry.list(Category::Decoder);
        names.sort();
        assert_eq!(names, vec!["lzx", "mszip", "none", "quantum"]);
    }

    #[test]
    fn custom_registration_can_shadow_a_builtin() {
        fn always_none(_: &AlgorithmParams) -> io::Result<CompressionType> {
            Ok(CompressionType::None)
        }
        let mut registry = AlgorithmRegistry::with_builtins();
        registry
            .register("lzx", Category::Decoder, always_none, 10, Some(3))
            .unwrap();
        let params = AlgorithmParams::default();
        assert_eq!(
            registry.create("lzx", Category::Decoder, &params).unwrap(),
            CompressionType::None
        );
    }

    #[test]
    fn default_registry_is_process_wide_and_seeded() {
        let registry = AlgorithmRegistry::default_registry();
        assert!(registry.registered("mszip", Category::Decoder));
    }
}
