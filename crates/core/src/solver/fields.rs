//! Dense 3D grid storage
//!
//! Every field is a flat array of 4-component texels indexed
//! `x + y * nx + z * nx * ny`. The texel is `Pod`, so a field can be viewed
//! as a flat `f32` slice with four channels per voxel.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// One voxel of a grid field
///
/// Temperature fields use `x` for temperature and carry `y..w` as free colour
/// channels. Velocity fields use `x..z` for velocity. Divergence and pressure
/// use `x` only.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct GridTexel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl GridTexel {
    pub const ZERO: GridTexel = GridTexel {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 0.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Texel with only the first channel set
    #[inline]
    pub const fn scalar(x: f32) -> Self {
        Self::new(x, 0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn lerp(self, other: GridTexel, t: f32) -> GridTexel {
        self * (1.0 - t) + other * t
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }
}

impl Add for GridTexel {
    type Output = GridTexel;
    #[inline]
    fn add(self, rhs: GridTexel) -> GridTexel {
        GridTexel::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }
}

impl AddAssign for GridTexel {
    #[inline]
    fn add_assign(&mut self, rhs: GridTexel) {
        *self = *self + rhs;
    }
}

impl Sub for GridTexel {
    type Output = GridTexel;
    #[inline]
    fn sub(self, rhs: GridTexel) -> GridTexel {
        GridTexel::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z, self.w - rhs.w)
    }
}

impl Mul<f32> for GridTexel {
    type Output = GridTexel;
    #[inline]
    fn mul(self, rhs: f32) -> GridTexel {
        GridTexel::new(self.x * rhs, self.y * rhs, self.z * rhs, self.w * rhs)
    }
}

/// Grid extent in voxels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn from_resolution(resolution: [u32; 3]) -> Self {
        Self::new(
            resolution[0] as usize,
            resolution[1] as usize,
            resolution[2] as usize,
        )
    }

    pub fn resolution(&self) -> [u32; 3] {
        [self.nx as u32, self.ny as u32, self.nz as u32]
    }

    /// Voxels in one z slab
    #[inline]
    pub fn slab(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index `x + y * nx + z * nx * ny`
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.nx + z * self.slab()
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.nx && y < self.ny && z < self.nz
    }

    /// Flat index with each coordinate clamped to the boundary
    #[inline]
    pub fn clamped_index(&self, x: isize, y: isize, z: isize) -> usize {
        let cx = x.clamp(0, self.nx as isize - 1) as usize;
        let cy = y.clamp(0, self.ny as isize - 1) as usize;
        let cz = z.clamp(0, self.nz as isize - 1) as usize;
        self.index(cx, cy, cz)
    }
}

/// Dense 3D field of [`GridTexel`]s
#[derive(Debug, Clone)]
pub struct GridField {
    data: Vec<GridTexel>,
    dims: GridDims,
}

impl GridField {
    /// Allocate a zero-filled field
    pub fn new(dims: GridDims) -> Self {
        Self {
            data: vec![GridTexel::ZERO; dims.len()],
            dims,
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn as_slice(&self) -> &[GridTexel] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [GridTexel] {
        &mut self.data
    }

    /// All channels as one flat `f32` slice, four values per voxel
    pub fn as_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.data)
    }

    /// Copy out a single channel (0..4)
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        assert!(channel < 4, "Texel channel out of range: {channel}");
        self.as_flat().iter().skip(channel).step_by(4).copied().collect()
    }

    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn get(&self, x: usize, y: usize, z: usize) -> GridTexel {
        assert!(self.dims.contains(x, y, z), "Coordinates out of bounds");
        self.data[self.dims.index(x, y, z)]
    }

    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: GridTexel) {
        assert!(self.dims.contains(x, y, z), "Coordinates out of bounds");
        let idx = self.dims.index(x, y, z);
        self.data[idx] = value;
    }

    pub fn fill(&mut self, value: GridTexel) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, other: &GridField) {
        self.data.copy_from_slice(&other.data);
    }
}
