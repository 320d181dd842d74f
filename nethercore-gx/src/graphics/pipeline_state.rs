//! Depth, stencil and color-write state
//!
//! `DrawState` is the fixed-function state a rasterizer applies to each draw.
//! The stencil primitive (`StencilState::test` / `StencilState::apply`) is
//! evaluated on the CPU by the software rasterizer and by the protocol tests,
//! and converted to wgpu state by the GPU backend.

/// Comparison function for depth and stencil tests.
///
/// Depth compares `fragment OP stored`; stencil compares
/// `(reference & mask) OP (stored & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

impl CompareFunction {
    #[inline]
    pub fn compare<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => lhs < rhs,
            CompareFunction::Equal => lhs == rhs,
            CompareFunction::LessEqual => lhs <= rhs,
            CompareFunction::Greater => lhs > rhs,
            CompareFunction::NotEqual => lhs != rhs,
            CompareFunction::GreaterEqual => lhs >= rhs,
            CompareFunction::Always => true,
        }
    }

    pub fn to_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

/// Stencil update applied for one test outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
}

impl StencilOperation {
    pub fn to_wgpu(self) -> wgpu::StencilOperation {
        match self {
            StencilOperation::Keep => wgpu::StencilOperation::Keep,
            StencilOperation::Zero => wgpu::StencilOperation::Zero,
            StencilOperation::Replace => wgpu::StencilOperation::Replace,
        }
    }
}

/// Which of the three stencil operations a fragment triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOutcome {
    StencilFail,
    DepthFail,
    Pass,
}

// =============================================================================
// StencilState - the stencil primitive
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub compare: CompareFunction,
    pub reference: u8,
    pub read_mask: u8,
    pub write_mask: u8,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilState {
    fn default() -> Self {
        Self::new(CompareFunction::Always, 0, 0xFF)
    }
}

impl StencilState {
    /// Test function with all operations set to keep and a full write mask.
    pub const fn new(compare: CompareFunction, reference: u8, read_mask: u8) -> Self {
        Self {
            compare,
            reference,
            read_mask,
            write_mask: 0xFF,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }

    /// Operations in (stencil fail, depth fail, pass) order.
    pub const fn with_ops(
        mut self,
        fail_op: StencilOperation,
        depth_fail_op: StencilOperation,
        pass_op: StencilOperation,
    ) -> Self {
        self.fail_op = fail_op;
        self.depth_fail_op = depth_fail_op;
        self.pass_op = pass_op;
        self
    }

    pub const fn with_write_mask(mut self, write_mask: u8) -> Self {
        self.write_mask = write_mask;
        self
    }

    /// Stencil test against a stored value.
    #[inline]
    pub fn test(&self, stored: u8) -> bool {
        self.compare
            .compare(self.reference & self.read_mask, stored & self.read_mask)
    }

    /// Stored value after applying the operation selected by `outcome`.
    #[inline]
    pub fn apply(&self, stored: u8, outcome: StencilOutcome) -> u8 {
        let op = match outcome {
            StencilOutcome::StencilFail => self.fail_op,
            StencilOutcome::DepthFail => self.depth_fail_op,
            StencilOutcome::Pass => self.pass_op,
        };
        let value = match op {
            StencilOperation::Keep => stored,
            StencilOperation::Zero => 0,
            StencilOperation::Replace => self.reference,
        };
        (stored & !self.write_mask) | (value & self.write_mask)
    }

    /// Run the full stencil/depth sequence for one fragment.
    ///
    /// Returns the new stored value and whether the fragment survives both tests.
    pub fn process(&self, stored: u8, depth_passes: impl FnOnce() -> bool) -> (u8, bool) {
        if !self.test(stored) {
            return (self.apply(stored, StencilOutcome::StencilFail), false);
        }
        if !depth_passes() {
            return (self.apply(stored, StencilOutcome::DepthFail), false);
        }
        (self.apply(stored, StencilOutcome::Pass), true)
    }

    /// Returns true if any outcome can modify the stored value
    pub fn writes_stencil(&self) -> bool {
        self.write_mask != 0
            && (self.pass_op != StencilOperation::Keep
                || self.fail_op != StencilOperation::Keep
                || self.depth_fail_op != StencilOperation::Keep)
    }

    /// Copy with the reference cleared; the reference is dynamic state on the GPU.
    pub fn without_reference(mut self) -> Self {
        self.reference = 0;
        self
    }

    /// Generate wgpu StencilState from this config
    pub fn to_wgpu(&self) -> wgpu::StencilState {
        let face_state = wgpu::StencilFaceState {
            compare: self.compare.to_wgpu(),
            fail_op: self.fail_op.to_wgpu(),
            depth_fail_op: self.depth_fail_op.to_wgpu(),
            pass_op: self.pass_op.to_wgpu(),
        };

        wgpu::StencilState {
            front: face_state,
            back: face_state,
            read_mask: u32::from(self.read_mask),
            write_mask: u32::from(self.write_mask),
        }
    }
}

// =============================================================================
// DrawState
// =============================================================================

/// Color channel write mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorMask {
    #[default]
    All,
    /// Alpha untouched
    Rgb,
    None,
}

impl ColorMask {
    pub fn from_bool(enabled: bool) -> Self {
        if enabled { ColorMask::All } else { ColorMask::None }
    }

    pub fn writes_rgb(self) -> bool {
        self != ColorMask::None
    }

    pub fn writes_alpha(self) -> bool {
        self == ColorMask::All
    }

    pub fn to_wgpu(self) -> wgpu::ColorWrites {
        match self {
            ColorMask::All => wgpu::ColorWrites::ALL,
            ColorMask::Rgb => wgpu::ColorWrites::COLOR,
            ColorMask::None => wgpu::ColorWrites::empty(),
        }
    }
}

/// Complete fixed-function state for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawState {
    pub depth_test: bool,
    pub depth_compare: CompareFunction,
    pub depth_write: bool,
    pub stencil_test: bool,
    pub stencil: StencilState,
    pub color_mask: ColorMask,
    pub blend: bool,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_compare: CompareFunction::Less,
            depth_write: true,
            stencil_test: true,
            stencil: StencilState::default(),
            color_mask: ColorMask::All,
            blend: false,
        }
    }
}

impl DrawState {
    /// State for a full-screen pass: no depth test, no stencil, no blending.
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_compare: CompareFunction::Always,
            depth_write: false,
            stencil_test: false,
            stencil: StencilState::default().with_write_mask(0),
            color_mask: ColorMask::All,
            blend: false,
        }
    }

    /// Depth writes only happen while the depth test is enabled.
    pub fn writes_depth(&self) -> bool {
        self.depth_test && self.depth_write
    }

    /// Stencil writes only happen while the stencil test is enabled.
    pub fn writes_stencil(&self) -> bool {
        self.stencil_test && self.stencil.writes_stencil()
    }

    /// Depth test for a fragment against the stored depth.
    #[inline]
    pub fn depth_passes(&self, fragment: u32, stored: u32) -> bool {
        !self.depth_test || self.depth_compare.compare(fragment, stored)
    }

    /// Key used to cache GPU pipelines; excludes dynamic stencil reference.
    pub fn pipeline_key(&self) -> Self {
        let mut key = *self;
        key.stencil = key.stencil.without_reference();
        if !key.stencil_test {
            key.stencil = StencilState::default().with_write_mask(0);
        }
        key
    }

    /// Generate wgpu DepthStencilState from this state
    pub fn to_wgpu_depth_stencil(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let stencil = if self.stencil_test {
            self.stencil.to_wgpu()
        } else {
            wgpu::StencilState::default()
        };
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.writes_depth(),
            depth_compare: if self.depth_test {
                self.depth_compare.to_wgpu()
            } else {
                wgpu::CompareFunction::Always
            },
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::StencilByte;

    #[test]
    fn test_compare_functions() {
        assert!(CompareFunction::Less.compare(1, 2));
        assert!(!CompareFunction::Less.compare(2, 2));
        assert!(CompareFunction::LessEqual.compare(2, 2));
        assert!(CompareFunction::GreaterEqual.compare(3, 2));
        assert!(CompareFunction::NotEqual.compare(3, 2));
        assert!(!CompareFunction::Never.compare(1, 1));
        assert!(CompareFunction::Always.compare(9, 1));
    }

    #[test]
    fn test_stencil_masked_compare() {
        // Translucent identity gate: reject only identity 5 with translucent flag
        let gate = StencilState::new(CompareFunction::NotEqual, StencilByte::translucent_tag(5), 0x7F);
        assert!(gate.test(5));
        assert!(gate.test(StencilByte::translucent_tag(6)));
        assert!(!gate.test(StencilByte::translucent_tag(5)));
        assert!(!gate.test(0x80 | StencilByte::translucent_tag(5)));
    }

    #[test]
    fn test_stencil_apply_respects_write_mask() {
        let state = StencilState::new(CompareFunction::Always, 0x85, 0xFF)
            .with_ops(StencilOperation::Keep, StencilOperation::Keep, StencilOperation::Replace)
            .with_write_mask(0x7F);
        assert_eq!(state.apply(0x80, StencilOutcome::Pass), 0x85);
        assert_eq!(state.apply(0x00, StencilOutcome::Pass), 0x05);
        assert_eq!(state.apply(0x33, StencilOutcome::DepthFail), 0x33);
    }

    #[test]
    fn test_stencil_zero_op() {
        let state = StencilState::new(CompareFunction::Always, 0, 0xFF)
            .with_ops(StencilOperation::Zero, StencilOperation::Zero, StencilOperation::Zero)
            .with_write_mask(0x80);
        assert_eq!(state.apply(0xC5, StencilOutcome::StencilFail), 0x45);
    }

    #[test]
    fn test_process_routes_outcomes() {
        let state = StencilState::new(CompareFunction::Equal, 0x80, 0x80)
            .with_ops(StencilOperation::Zero, StencilOperation::Keep, StencilOperation::Replace)
            .with_write_mask(0x80);
        assert_eq!(state.process(0x05, || true), (0x05, false));
        assert_eq!(state.process(0x85, || false), (0x85, false));
        assert_eq!(state.process(0x85, || true), (0x85, true));
    }

    #[test]
    fn test_writes_stencil() {
        assert!(!StencilState::default().writes_stencil());
        let replace = StencilState::default().with_ops(
            StencilOperation::Keep,
            StencilOperation::Keep,
            StencilOperation::Replace,
        );
        assert!(replace.writes_stencil());
        assert!(!replace.with_write_mask(0).writes_stencil());
    }

    #[test]
    fn test_pipeline_key_ignores_reference() {
        let mut a = DrawState::default();
        a.stencil.reference = 3;
        let mut b = DrawState::default();
        b.stencil.reference = 9;
        assert_eq!(a.pipeline_key(), b.pipeline_key());
    }

    #[test]
    fn test_depth_disabled_disables_writes() {
        let state = DrawState {
            depth_test: false,
            ..Default::default()
        };
        assert!(!state.writes_depth());
        assert!(state.depth_passes(10, 0));
    }

    #[test]
    fn test_wgpu_conversion() {
        let state = StencilState::new(CompareFunction::NotEqual, 0x45, 0x7F).with_write_mask(0x80);
        let wgpu_state = state.to_wgpu();
        assert_eq!(wgpu_state.front.compare, wgpu::CompareFunction::NotEqual);
        assert_eq!(wgpu_state.read_mask, 0x7F);
        assert_eq!(wgpu_state.write_mask, 0x80);
        assert_eq!(ColorMask::Rgb.to_wgpu(), wgpu::ColorWrites::COLOR);
    }
}
