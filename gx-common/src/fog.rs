//! Fog density table math
//!
//! Fog weight is looked up from a 32-entry density table. The table index
//! is `(depth - offset) / step` with `step = 1024 >> shift`, and the table is
//! sampled with linear filtering between entries.

use serde::{Deserialize, Serialize};

/// Number of entries in the fog density table.
pub const FOG_TABLE_LEN: usize = 32;
/// Raw density value meaning "fully fogged".
pub const FOG_DENSITY_FULL: u8 = 127;

/// Fog program cache key. Offset and shift are baked into the fog program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FogProgramKey {
    pub offset: u16,
    pub shift: u8,
}

impl FogProgramKey {
    pub fn new(offset: u16, shift: u8) -> Self {
        Self {
            offset: offset & 0x7FFF,
            shift,
        }
    }

    /// Depth distance covered by one table entry. Zero for shifts of 11 and above.
    pub fn step(self) -> u32 {
        0x400u32.checked_shr(u32::from(self.shift)).unwrap_or(0)
    }

    /// Offset in normalized depth units, as compared against when `step == 0`.
    pub fn offset_normalized(self) -> f32 {
        f32::from(self.offset) / 32767.0
    }

    /// Texture coordinate scale and bias applied to normalized depth.
    ///
    /// Returns `None` when `step == 0`, in which case the table degenerates
    /// to a threshold at the offset.
    pub fn coordinate_transform(self) -> Option<(f32, f32)> {
        let step = self.step();
        if step == 0 {
            return None;
        }
        let step = step as f32;
        let scale = 1024.0 / step;
        let bias = ((-f32::from(self.offset) / step) - 0.5) / FOG_TABLE_LEN as f32;
        Some((scale, bias))
    }
}

/// Expand raw 7-bit densities to 8-bit; the full marker saturates at 255.
pub fn expand_density_table(raw: &[u8; FOG_TABLE_LEN]) -> [u8; FOG_TABLE_LEN] {
    raw.map(|value| {
        let value = value & 0x7F;
        if value == FOG_DENSITY_FULL {
            255
        } else {
            value << 1
        }
    })
}

/// Sample a 32-entry table at normalized coordinate `u` with linear filtering
/// and clamp-to-edge addressing.
pub fn sample_table_linear(table: &[f32; FOG_TABLE_LEN], u: f32) -> f32 {
    let x = u * FOG_TABLE_LEN as f32 - 0.5;
    let x0 = x.floor();
    let t = x - x0;
    let last = FOG_TABLE_LEN as i32 - 1;
    let i0 = (x0 as i32).clamp(0, last) as usize;
    let i1 = (x0 as i32 + 1).clamp(0, last) as usize;
    table[i0] + (table[i1] - table[i0]) * t
}

/// Fog weight for a fragment at normalized `depth`.
pub fn fog_weight(depth: f32, key: FogProgramKey, density: &[u8; FOG_TABLE_LEN]) -> f32 {
    let table = density.map(|v| f32::from(v) / 255.0);
    match key.coordinate_transform() {
        Some((scale, bias)) => sample_table_linear(&table, depth * scale + bias),
        None if depth <= key.offset_normalized() => table[0],
        None => table[FOG_TABLE_LEN - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> [u8; FOG_TABLE_LEN] {
        expand_density_table(&std::array::from_fn(|i| (i as u8) * 4))
    }

    #[test]
    fn test_step_from_shift() {
        assert_eq!(FogProgramKey::new(0, 0).step(), 1024);
        assert_eq!(FogProgramKey::new(0, 10).step(), 1);
        assert_eq!(FogProgramKey::new(0, 11).step(), 0);
        assert_eq!(FogProgramKey::new(0, 40).step(), 0);
    }

    #[test]
    fn test_offset_is_masked_to_15_bits() {
        assert_eq!(FogProgramKey::new(0xFFFF, 0).offset, 0x7FFF);
    }

    #[test]
    fn test_density_full_marker_saturates() {
        let mut raw = [0u8; FOG_TABLE_LEN];
        raw[0] = 127;
        raw[1] = 126;
        raw[2] = 64;
        let expanded = expand_density_table(&raw);
        assert_eq!(expanded[0], 255);
        assert_eq!(expanded[1], 252);
        assert_eq!(expanded[2], 128);
    }

    #[test]
    fn test_weight_at_offset_is_first_entry() {
        let table = ramp();
        for shift in 0..=10 {
            let key = FogProgramKey::new(0x2000, shift);
            let depth = f32::from(key.offset) / 32768.0;
            let weight = fog_weight(depth, key, &table);
            assert!(
                (weight - f32::from(table[0]) / 255.0).abs() < 1e-5,
                "shift {shift}: {weight}"
            );
        }
    }

    #[test]
    fn test_weight_is_monotonic_in_depth() {
        let table = ramp();
        for shift in [0u8, 2, 5, 8] {
            let key = FogProgramKey::new(0x1000, shift);
            let mut last = 0.0f32;
            for i in 0..=1000 {
                let weight = fog_weight(i as f32 / 1000.0, key, &table);
                assert!(weight + 1e-6 >= last, "shift {shift} step {i}");
                last = weight;
            }
        }
    }

    #[test]
    fn test_zero_step_thresholds_at_offset() {
        let table = ramp();
        let key = FogProgramKey::new(0x4000, 12);
        assert_eq!(fog_weight(0.1, key, &table), f32::from(table[0]) / 255.0);
        assert_eq!(fog_weight(0.9, key, &table), f32::from(table[31]) / 255.0);
    }

    #[test]
    fn test_linear_sampling_midpoint() {
        let mut table = [0.0f32; FOG_TABLE_LEN];
        table[1] = 1.0;
        // Halfway between texel 0 and texel 1 centers
        let u = 1.0 / FOG_TABLE_LEN as f32;
        assert!((sample_table_linear(&table, u) - 0.5).abs() < 1e-6);
    }
}
