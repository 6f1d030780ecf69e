//! Small value types shared across the exporter.

use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use glam::{Mat4, Quat, Vec2, Vec3};

/// 128-bit asset identifier (textures, sculpt maps, mesh assets).
///
/// Text form is the usual hyphenated `8-4-4-4-12` lowercase hex layout, which
/// is also how it is serialized.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(u128);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAssetIdError {
    #[error("expected 32 hex digits, found {0}")]
    BadLength(usize),
    #[error("invalid hex digit in asset id")]
    BadDigit,
}

impl AssetId {
    pub const ZERO: AssetId = AssetId(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}

impl FromStr for AssetId {
    type Err = ParseAssetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 {
            return Err(ParseAssetIdError::BadLength(digits.len()));
        }
        u128::from_str_radix(&digits, 16)
            .map(AssetId)
            .map_err(|_| ParseAssetIdError::BadDigit)
    }
}

impl TryFrom<String> for AssetId {
    type Error = ParseAssetIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

/// Linear RGBA color with components in `0.0..=1.0`.
///
/// Serialized as a `[r, g, b, a]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const WHITE: Color4 = Color4::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_bytes(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }
}

impl Default for Color4 {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Mul for Color4 {
    type Output = Color4;

    fn mul(self, rhs: Color4) -> Color4 {
        Color4 {
            r: self.r * rhs.r,
            g: self.g * rhs.g,
            b: self.b * rhs.b,
            a: self.a * rhs.a,
        }
    }
}

impl From<[f32; 4]> for Color4 {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Color4> for [f32; 4] {
    fn from(c: Color4) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}
