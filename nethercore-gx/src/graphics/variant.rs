//! Geometry program variants
//!
//! Seven per-frame feature bits select one of 128 geometry programs. Every
//! variant also bakes in the program-wide `ProgramSettings`; changing those
//! (or the framebuffer size) invalidates the whole cache.

use gx_common::FogProgramKey;
use hashbrown::HashMap;

use crate::error::GxResult;

/// Feature bitmask selecting a geometry program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GeometryFlags(u8);

impl GeometryFlags {
    pub const FOG: Self = Self(1 << 0);
    pub const EDGE_MARK: Self = Self(1 << 1);
    /// Writes the back-facing mask to the working buffer
    pub const OPAQUE_DRAW: Self = Self(1 << 2);
    pub const W_DEPTH: Self = Self(1 << 3);
    pub const ALPHA_TEST: Self = Self(1 << 4);
    pub const TEXTURE_SAMPLING: Self = Self(1 << 5);
    pub const TOON_HIGHLIGHT: Self = Self(1 << 6);

    pub const ALL: Self = Self(0x7F);
    /// Number of distinct variants
    pub const VARIANT_COUNT: usize = 128;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    pub const fn with(self, other: Self, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | other.0)
        } else {
            Self(self.0 & !other.0)
        }
    }

    /// Iterate over every possible variant.
    pub fn all_variants() -> impl Iterator<Item = Self> {
        (0..Self::VARIANT_COUNT as u8).map(Self)
    }

    /// Short label for logs and shader names, e.g. `geometry_fog_edge`.
    pub fn label(self) -> String {
        const NAMES: [(GeometryFlags, &str); 7] = [
            (GeometryFlags::FOG, "fog"),
            (GeometryFlags::EDGE_MARK, "edge"),
            (GeometryFlags::OPAQUE_DRAW, "opaque"),
            (GeometryFlags::W_DEPTH, "wdepth"),
            (GeometryFlags::ALPHA_TEST, "atest"),
            (GeometryFlags::TEXTURE_SAMPLING, "tex"),
            (GeometryFlags::TOON_HIGHLIGHT, "highlight"),
        ];
        let mut label = String::from("geometry");
        for (flag, name) in NAMES {
            if self.contains(flag) {
                label.push('_');
                label.push_str(name);
            }
        }
        label
    }
}

impl std::ops::BitOr for GeometryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Settings shared by every geometry variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramSettings {
    pub texture_smoothing: bool,
    pub nds_depth_calculation: bool,
    pub depth_lequal_facing: bool,
    pub framebuffer_width: u32,
    pub framebuffer_height: u32,
}

impl ProgramSettings {
    /// Fragment programs must write depth themselves when emulating the
    /// console depth format or when fog needs that depth.
    pub fn writes_fragment_depth(&self, flags: GeometryFlags) -> bool {
        self.nds_depth_calculation || flags.contains(GeometryFlags::FOG)
    }
}

// =============================================================================
// Caches
// =============================================================================

/// Cache of geometry programs keyed by feature bitmask.
///
/// Entries are built on demand by the backend-supplied constructor.
pub struct VariantCache<T> {
    settings: Option<ProgramSettings>,
    variants: HashMap<GeometryFlags, T>,
}

impl<T> Default for VariantCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VariantCache<T> {
    pub fn new() -> Self {
        Self {
            settings: None,
            variants: HashMap::new(),
        }
    }

    pub fn settings(&self) -> Option<&ProgramSettings> {
        self.settings.as_ref()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Drop every variant if the program-wide settings changed.
    ///
    /// Returns true when the cache was rebuilt.
    pub fn invalidate(&mut self, settings: ProgramSettings) -> bool {
        if self.settings == Some(settings) {
            return false;
        }
        tracing::info!(
            "Rebuilding geometry programs: smoothing={}, nds_depth={}, lequal_facing={}, size={}x{}",
            settings.texture_smoothing,
            settings.nds_depth_calculation,
            settings.depth_lequal_facing,
            settings.framebuffer_width,
            settings.framebuffer_height
        );
        self.variants.clear();
        self.settings = Some(settings);
        true
    }

    /// Get or create the variant for `flags`.
    ///
    /// Returns a reference to the cached variant, creating it if necessary.
    pub fn get_or_create(
        &mut self,
        flags: GeometryFlags,
        create: impl FnOnce(GeometryFlags, &ProgramSettings) -> GxResult<T>,
    ) -> GxResult<&T> {
        let Some(settings) = self.settings else {
            return Err(crate::error::GxError::ProgramsNotBuilt);
        };

        if !self.variants.contains_key(&flags) {
            tracing::debug!("Creating geometry variant: {}", flags.label());
            let variant = create(flags, &settings)?;
            self.variants.insert(flags, variant);
        }

        Ok(&self.variants[&flags])
    }

    /// Build all 128 variants up front.
    pub fn pregenerate(
        &mut self,
        mut create: impl FnMut(GeometryFlags, &ProgramSettings) -> GxResult<T>,
    ) -> GxResult<()> {
        for flags in GeometryFlags::all_variants() {
            self.get_or_create(flags, &mut create)?;
        }
        Ok(())
    }
}

/// Cache of fog programs keyed by (offset, shift).
pub struct FogProgramCache<T> {
    programs: HashMap<FogProgramKey, T>,
}

impl<T> Default for FogProgramCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FogProgramCache<T> {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }

    pub fn get_or_create(
        &mut self,
        key: FogProgramKey,
        create: impl FnOnce(FogProgramKey) -> GxResult<T>,
    ) -> GxResult<&T> {
        if !self.programs.contains_key(&key) {
            tracing::debug!(
                "Creating fog program: offset={:#06x}, shift={}",
                key.offset,
                key.shift
            );
            let program = create(key)?;
            self.programs.insert(key, program);
        }

        Ok(&self.programs[&key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GxError;

    fn settings(width: u32) -> ProgramSettings {
        ProgramSettings {
            texture_smoothing: false,
            nds_depth_calculation: true,
            depth_lequal_facing: false,
            framebuffer_width: width,
            framebuffer_height: 192,
        }
    }

    #[test]
    fn test_flags_set_and_contains() {
        let mut flags = GeometryFlags::empty();
        flags.set(GeometryFlags::FOG, true);
        flags.set(GeometryFlags::EDGE_MARK, true);
        assert!(flags.contains(GeometryFlags::FOG | GeometryFlags::EDGE_MARK));
        flags.set(GeometryFlags::FOG, false);
        assert!(!flags.contains(GeometryFlags::FOG));
        assert_eq!(flags.bits(), 2);
    }

    #[test]
    fn test_all_variants_are_distinct() {
        let variants: Vec<_> = GeometryFlags::all_variants().collect();
        assert_eq!(variants.len(), GeometryFlags::VARIANT_COUNT);
        let unique: hashbrown::HashSet<_> = variants.iter().collect();
        assert_eq!(unique.len(), GeometryFlags::VARIANT_COUNT);
    }

    #[test]
    fn test_label() {
        assert_eq!(GeometryFlags::empty().label(), "geometry");
        assert_eq!(
            (GeometryFlags::FOG | GeometryFlags::TOON_HIGHLIGHT).label(),
            "geometry_fog_highlight"
        );
    }

    #[test]
    fn test_cache_requires_settings() {
        let mut cache: VariantCache<u8> = VariantCache::new();
        let result = cache.get_or_create(GeometryFlags::FOG, |flags, _| Ok(flags.bits()));
        assert!(matches!(result, Err(GxError::ProgramsNotBuilt)));
    }

    #[test]
    fn test_cache_creates_once() {
        let mut cache = VariantCache::new();
        cache.invalidate(settings(256));
        let mut calls = 0;
        for _ in 0..3 {
            let value = cache
                .get_or_create(GeometryFlags::FOG, |flags, _| {
                    calls += 1;
                    Ok(flags.bits())
                })
                .unwrap();
            assert_eq!(*value, 1);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalidate_on_settings_change() {
        let mut cache = VariantCache::new();
        assert!(cache.invalidate(settings(256)));
        cache.pregenerate(|flags, s| Ok((flags, s.framebuffer_width))).unwrap();
        assert_eq!(cache.len(), 128);

        assert!(!cache.invalidate(settings(256)));
        assert_eq!(cache.len(), 128);

        assert!(cache.invalidate(settings(512)));
        assert!(cache.is_empty());
        let (_, width) = *cache
            .get_or_create(GeometryFlags::ALL, |flags, s| Ok((flags, s.framebuffer_width)))
            .unwrap();
        assert_eq!(width, 512);
    }

    #[test]
    fn test_fog_cache_keyed_by_offset_and_shift() {
        let mut cache = FogProgramCache::new();
        let a = FogProgramKey::new(0x100, 2);
        let b = FogProgramKey::new(0x100, 3);
        cache.get_or_create(a, |k| Ok(k.step())).unwrap();
        cache.get_or_create(b, |k| Ok(k.step())).unwrap();
        cache.get_or_create(a, |_| Ok(0)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get_or_create(a, |_| Ok(0)).unwrap(), 256);
    }
}
