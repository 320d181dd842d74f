//! Per-pixel stencil byte layout
//!
//! The 3D core encodes polygon ordering rules into the 8-bit stencil plane:
//! - bits 0-5: identity of the last accepted fragment
//! - bit 6: the accepted fragment was translucent (also the back-facing mark
//!   and the zero-destination-alpha mark before translucent drawing starts)
//! - bit 7: scratch mask owned by whichever multi-pass sequence is running

use serde::{Deserialize, Serialize};

/// One pixel of the stencil plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StencilByte(pub u8);

impl StencilByte {
    /// Bits 0-5
    pub const IDENTITY_MASK: u8 = 0x3F;
    /// Bit 6
    pub const TRANSLUCENT_BIT: u8 = 0x40;
    /// Bit 7
    pub const SCRATCH_BIT: u8 = 0x80;
    /// Identity plus translucent flag
    pub const TAG_MASK: u8 = Self::IDENTITY_MASK | Self::TRANSLUCENT_BIT;

    pub const fn new(identity: u8, translucent: bool, scratch: bool) -> Self {
        Self(0).with_identity(identity).with_translucent(translucent).with_scratch(scratch)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn identity(self) -> u8 {
        self.0 & Self::IDENTITY_MASK
    }

    #[inline]
    pub const fn is_translucent(self) -> bool {
        self.0 & Self::TRANSLUCENT_BIT != 0
    }

    #[inline]
    pub const fn scratch(self) -> bool {
        self.0 & Self::SCRATCH_BIT != 0
    }

    #[inline]
    pub const fn with_identity(self, identity: u8) -> Self {
        Self((self.0 & !Self::IDENTITY_MASK) | (identity & Self::IDENTITY_MASK))
    }

    #[inline]
    pub const fn with_translucent(self, translucent: bool) -> Self {
        if translucent {
            Self(self.0 | Self::TRANSLUCENT_BIT)
        } else {
            Self(self.0 & !Self::TRANSLUCENT_BIT)
        }
    }

    #[inline]
    pub const fn with_scratch(self, scratch: bool) -> Self {
        if scratch {
            Self(self.0 | Self::SCRATCH_BIT)
        } else {
            Self(self.0 & !Self::SCRATCH_BIT)
        }
    }

    /// Reference value tagging `identity` as a translucent fragment (`0x40 | id`).
    #[inline]
    pub const fn translucent_tag(identity: u8) -> u8 {
        Self::TRANSLUCENT_BIT | (identity & Self::IDENTITY_MASK)
    }

    /// Reference value stamped by a masked pass: scratch bit, translucency and identity.
    #[inline]
    pub const fn stamp(identity: u8, translucent: bool) -> u8 {
        Self::new(identity, translucent, true).0
    }
}

impl From<u8> for StencilByte {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<StencilByte> for u8 {
    fn from(value: StencilByte) -> Self {
        value.0
    }
}
