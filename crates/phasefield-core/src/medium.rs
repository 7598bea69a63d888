//! Propagation media.
//!
//! The engine never looks a medium up on its own: callers resolve a
//! [`Medium`] to a speed of sound and inject that scalar into each
//! [`ArrayUnit`](crate::array_unit::ArrayUnit).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speed of sound in dry air at 20 °C (m/s).
pub const SPEED_AIR: f64 = 343.0;
/// Speed of sound in fresh water (m/s).
pub const SPEED_WATER: f64 = 1480.0;
/// Average speed of sound in soft tissue (m/s).
pub const SPEED_TISSUE: f64 = 1540.0;

/// Lowest propagation speed accepted for a custom medium (m/s).
pub const MIN_SPEED: f64 = 1.0;

#[derive(Debug, Error)]
pub enum MediumError {
    #[error("Unknown medium '{0}'. Valid media: air, water, tissue, or a speed in m/s")]
    Unknown(String),
}

/// A homogeneous propagation medium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    #[default]
    Air,
    Water,
    Tissue,
    /// Arbitrary medium with the given speed of sound (m/s).
    Custom(f64),
}

impl Medium {
    /// Propagation speed in m/s, never below [`MIN_SPEED`].
    pub fn speed_of_sound(&self) -> f64 {
        match self {
            Medium::Air => SPEED_AIR,
            Medium::Water => SPEED_WATER,
            Medium::Tissue => SPEED_TISSUE,
            Medium::Custom(c) if c.is_finite() => c.max(MIN_SPEED),
            Medium::Custom(_) => SPEED_AIR,
        }
    }

    /// The named media, in listing order.
    pub fn all() -> [Medium; 3] {
        [Medium::Air, Medium::Water, Medium::Tissue]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Medium::Air => "air",
            Medium::Water => "water",
            Medium::Tissue => "tissue",
            Medium::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} m/s)", self.name(), self.speed_of_sound())
    }
}

impl FromStr for Medium {
    type Err = MediumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "air" => Ok(Medium::Air),
            "water" => Ok(Medium::Water),
            "tissue" => Ok(Medium::Tissue),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|c| c.is_finite() && *c >= MIN_SPEED)
                .map(Medium::Custom)
                .ok_or_else(|| MediumError::Unknown(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_media_speeds() {
        assert_eq!(Medium::Air.speed_of_sound(), 343.0);
        assert_eq!(Medium::Water.speed_of_sound(), 1480.0);
        assert_eq!(Medium::Tissue.speed_of_sound(), 1540.0);
    }

    #[test]
    fn test_parse_medium() {
        assert_eq!("Water".parse::<Medium>().unwrap(), Medium::Water);
        assert_eq!("1500".parse::<Medium>().unwrap(), Medium::Custom(1500.0));
        assert!("vacuum".parse::<Medium>().is_err());
        assert!("-3".parse::<Medium>().is_err());
    }

    #[test]
    fn test_custom_speed_is_bounded() {
        assert_eq!(Medium::Custom(0.0).speed_of_sound(), MIN_SPEED);
        assert_eq!(Medium::Custom(f64::NAN).speed_of_sound(), SPEED_AIR);
    }
}
