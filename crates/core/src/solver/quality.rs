//! Quality presets for grid resolution
//!
//! Higher quality means a finer grid but more computational cost. Every preset
//! resolution is a multiple of the dispatch block size.

use serde::{Deserialize, Serialize};

/// Quality preset determining grid resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridQuality {
    /// 32³ voxels
    Low,
    /// 64³ voxels
    Medium,
    /// 128³ voxels
    High,
}

impl GridQuality {
    /// Voxels per axis
    pub const fn edge(&self) -> u32 {
        match self {
            Self::Low => 32,
            Self::Medium => 64,
            Self::High => 128,
        }
    }

    /// Cubic resolution for this preset
    pub const fn resolution(&self) -> [u32; 3] {
        let n = self.edge();
        [n, n, n]
    }

    /// Pick a preset from the available CPU parallelism
    ///
    /// # Returns
    ///
    /// `High` with 16+ threads, `Medium` with 8+, otherwise `Low`
    pub fn recommended() -> Self {
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        if threads >= 16 {
            Self::High
        } else if threads >= 8 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::str::FromStr for GridQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown quality preset: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::config::DISPATCH_BLOCK_SIZE;

    #[test]
    fn test_presets_are_block_multiples() {
        for q in [GridQuality::Low, GridQuality::Medium, GridQuality::High] {
            for axis in q.resolution() {
                assert_eq!(axis % DISPATCH_BLOCK_SIZE, 0);
            }
        }
        assert_eq!(GridQuality::Medium.resolution(), [64, 64, 64]);
    }

    #[test]
    fn test_recommended_matches_thread_count() {
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let expected = match threads {
            16.. => GridQuality::High,
            8..=15 => GridQuality::Medium,
            _ => GridQuality::Low,
        };
        assert_eq!(GridQuality::recommended(), expected);
    }

    #[test]
    fn test_parse() {
        assert_eq!("HIGH".parse::<GridQuality>(), Ok(GridQuality::High));
        assert!("ultra".parse::<GridQuality>().is_err());
    }
}
