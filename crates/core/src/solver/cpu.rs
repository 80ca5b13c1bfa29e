//! CPU grid solver implementation
//!
//! Stores every field as a [`GridField`] and runs each stage as a Rayon
//! parallel pass over z slabs. Iterative stages ping-pong between a field and
//! its back buffer with `std::mem::swap`.

use super::config::GridConfig;
use super::fields::{GridDims, GridField, GridTexel};
use super::kernels;
use super::profiler::ProfilerScope;
use super::readback::{ReadbackQueue, ReadbackStats, ReadbackTicket};
use super::r#trait::{FieldKind, GridSolver};
use crate::core_types::error::ConfigError;
use crate::core_types::vec3::{normalize_or, Vec3};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use tracing::{debug, warn};

/// CPU-based grid solver using Rayon for parallelism
pub struct CpuGridSolver {
    temperature: GridField,
    velocity: GridField,
    divergence: GridField,
    pressure: GridField,

    // Back buffers shared by the temperature and velocity stages
    texel_back: GridField,
    texel_source: GridField,
    pressure_back: GridField,

    dims: GridDims,
    buoyancy: f32,
    velocity_damping: f32,
    readback: ReadbackQueue,
}

impl CpuGridSolver {
    /// Allocate all fields for `config.resolution` and zero them
    ///
    /// # Errors
    ///
    /// Propagates [`GridConfig::validate`] failures.
    pub fn new(config: &GridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let dims = GridDims::from_resolution(config.resolution);
        let mut solver = Self {
            temperature: GridField::new(dims),
            velocity: GridField::new(dims),
            divergence: GridField::new(dims),
            pressure: GridField::new(dims),
            texel_back: GridField::new(dims),
            texel_source: GridField::new(dims),
            pressure_back: GridField::new(dims),
            dims,
            buoyancy: config.buoyancy,
            velocity_damping: config.velocity_damping,
            readback: ReadbackQueue::default(),
        };
        solver.init_fields();
        debug!(
            "CPU grid solver allocated: {}x{}x{} ({} voxels, 7 fields)",
            dims.nx,
            dims.ny,
            dims.nz,
            dims.len()
        );
        Ok(solver)
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Direct access to a field, mostly for inspection
    pub fn field(&self, kind: FieldKind) -> &GridField {
        match kind {
            FieldKind::Temperature => &self.temperature,
            FieldKind::Velocity => &self.velocity,
            FieldKind::Divergence => &self.divergence,
            FieldKind::Pressure => &self.pressure,
        }
    }

    fn init_fields(&mut self) {
        for field in [
            &mut self.temperature,
            &mut self.velocity,
            &mut self.divergence,
            &mut self.pressure,
            &mut self.texel_back,
            &mut self.texel_source,
            &mut self.pressure_back,
        ] {
            field.fill(GridTexel::ZERO);
        }
    }

    /// Implicit diffusion of `field` with `iterations` Jacobi passes
    fn diffuse(
        field: &mut GridField,
        source: &mut GridField,
        back: &mut GridField,
        a: f32,
        iterations: u32,
        dims: GridDims,
    ) {
        if a <= 0.0 || iterations == 0 {
            return;
        }
        source.copy_from(field);
        for _ in 0..iterations {
            kernels::jacobi_diffuse(source.as_slice(), field.as_slice(), back.as_mut_slice(), a, dims);
            std::mem::swap(field, back);
        }
    }

    /// Make the velocity field divergence-free
    fn project(&mut self, iterations: u32) {
        let dims = self.dims;
        kernels::divergence(self.velocity.as_slice(), self.divergence.as_mut_slice(), dims);
        self.pressure.fill(GridTexel::ZERO);
        for _ in 0..iterations {
            kernels::jacobi_pressure(
                self.divergence.as_slice(),
                self.pressure.as_slice(),
                self.pressure_back.as_mut_slice(),
                dims,
            );
            std::mem::swap(&mut self.pressure, &mut self.pressure_back);
        }
        kernels::subtract_gradient(self.velocity.as_mut_slice(), self.pressure.as_slice(), dims);
    }

    fn voxel_of(&self, position: &Vec3) -> Option<[usize; 3]> {
        let d = self.dims;
        let coords = [position.x, position.y, position.z];
        let limits = [d.nx, d.ny, d.nz];
        let mut voxel = [0usize; 3];
        for axis in 0..3 {
            let c = coords[axis];
            if !(c.is_finite() && c >= 0.0 && c < limits[axis] as f32) {
                return None;
            }
            voxel[axis] = c.floor() as usize;
        }
        Some(voxel)
    }
}

impl GridSolver for CpuGridSolver {
    fn resolution(&self) -> [u32; 3] {
        self.dims.resolution()
    }

    fn inject_source(&mut self, position: &Vec3, intensity: f32) -> bool {
        if !intensity.is_finite() {
            warn!("Ignoring non-finite source intensity {intensity}");
            return false;
        }
        let Some([x, y, z]) = self.voxel_of(position) else {
            warn!(
                "Source at ({:.2}, {:.2}, {:.2}) lies outside the grid",
                position.x, position.y, position.z
            );
            return false;
        };
        let idx = self.dims.index(x, y, z);
        self.temperature.as_mut_slice()[idx].x += intensity;
        true
    }

    fn step(&mut self, dt: f32, diffusion: f32, viscosity: f32, iterations: u32) {
        let _scope = ProfilerScope::new("grid_step");
        let dims = self.dims;

        // 1. Diffuse velocity
        Self::diffuse(
            &mut self.velocity,
            &mut self.texel_source,
            &mut self.texel_back,
            viscosity * dt,
            iterations,
            dims,
        );

        // 2. Project
        self.project(iterations);

        // 3. Advect velocity along itself
        kernels::advect(
            self.velocity.as_slice(),
            self.velocity.as_slice(),
            self.texel_back.as_mut_slice(),
            dt,
            dims,
        );
        std::mem::swap(&mut self.velocity, &mut self.texel_back);

        // 4. Project again
        self.project(iterations);

        // 5. Diffuse temperature
        Self::diffuse(
            &mut self.temperature,
            &mut self.texel_source,
            &mut self.texel_back,
            diffusion * dt,
            iterations,
            dims,
        );

        // 6. Advect temperature along the updated velocity
        kernels::advect(
            self.temperature.as_slice(),
            self.velocity.as_slice(),
            self.texel_back.as_mut_slice(),
            dt,
            dims,
        );
        std::mem::swap(&mut self.temperature, &mut self.texel_back);
    }

    fn simulate_wind(&mut self, direction: &Vec3, intensity: f32, dt: f32) {
        let dir = normalize_or(direction, Vec3::zeros());
        let bias = dir * (intensity * dt);
        let damping_scale = 1.0 / (1.0 + self.velocity_damping * dt);
        kernels::apply_wind(
            self.velocity.as_mut_slice(),
            self.temperature.as_slice(),
            &bias,
            self.buoyancy * dt,
            damping_scale,
            self.dims,
        );
    }

    fn scatter_temperature(&mut self, writes: &[(usize, f32)]) {
        let len = self.dims.len();
        let mut last: FxHashMap<usize, f32> = FxHashMap::default();
        for &(index, delta) in writes {
            if index < len {
                last.insert(index, delta);
            }
        }
        let data = self.temperature.as_mut_slice();
        for (index, delta) in last {
            data[index].x += delta;
        }
    }

    fn write_temperature(&mut self, index: usize, value: f32) {
        if let Some(texel) = self.temperature.as_mut_slice().get_mut(index) {
            texel.x = value;
        }
    }

    fn sample_temperature(&self, voxel: [u32; 3]) -> f32 {
        let [x, y, z] = voxel.map(|c| c as usize);
        if self.dims.contains(x, y, z) {
            self.temperature.as_slice()[self.dims.index(x, y, z)].x
        } else {
            0.0
        }
    }

    fn read_temperature(&self) -> Cow<'_, [f32]> {
        Cow::Owned(self.temperature.channel(0))
    }

    fn read_field(&self, field: FieldKind) -> Cow<'_, [f32]> {
        Cow::Borrowed(self.field(field).as_flat())
    }

    fn clear(&mut self) {
        self.init_fields();
    }

    fn submit_readback(&mut self) -> Option<ReadbackTicket> {
        self.readback.request()
    }

    fn flush(&mut self) {
        self.readback.execute_copies(&self.temperature);
    }

    fn poll_device(&mut self) -> usize {
        self.readback.poll(self.dims.resolution())
    }

    fn shutdown(&mut self) {
        self.readback.close();
    }

    fn readback_stats(&self) -> ReadbackStats {
        self.readback.stats()
    }

    fn is_gpu_accelerated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(n: u32) -> CpuGridSolver {
        let config = GridConfig {
            resolution: [n, n, n],
            ..GridConfig::default()
        };
        CpuGridSolver::new(&config).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_resolution() {
        let config = GridConfig {
            resolution: [8, 8, 10],
            ..GridConfig::default()
        };
        assert!(matches!(
            CpuGridSolver::new(&config),
            Err(ConfigError::InvalidResolution { axis: 'z', value: 10 })
        ));
    }

    #[test]
    fn test_inject_source_hits_containing_voxel() {
        let mut s = solver(8);
        assert!(s.inject_source(&Vec3::new(1.7, 2.2, 3.9), 0.8));
        assert_eq!(s.sample_temperature([1, 2, 3]), 0.8);
        assert!(!s.inject_source(&Vec3::new(8.0, 0.0, 0.0), 1.0));
        assert!(!s.inject_source(&Vec3::new(-0.1, 0.0, 0.0), 1.0));
    }

    #[test]
    fn test_scatter_last_write_wins() {
        let mut s = solver(8);
        s.write_temperature(10, 1.0);
        s.scatter_temperature(&[(10, 0.25), (10, 0.5), (11, 2.0)]);
        let t = s.read_temperature();
        assert_eq!(t[10], 1.5);
        assert_eq!(t[11], 2.0);
    }

    #[test]
    fn test_zero_coefficient_step_leaves_fields_unchanged() {
        let mut s = solver(8);
        for (i, pos) in [(0.5, 0.5, 0.5), (3.2, 4.1, 5.0), (7.9, 7.9, 7.9)].iter().enumerate() {
            s.inject_source(&Vec3::new(pos.0, pos.1, pos.2), 0.3 * (i + 1) as f32);
        }
        let before: Vec<Vec<f32>> = [
            FieldKind::Temperature,
            FieldKind::Velocity,
            FieldKind::Divergence,
            FieldKind::Pressure,
        ]
        .iter()
        .map(|k| s.read_field(*k).into_owned())
        .collect();

        s.step(0.1, 0.0, 0.0, 10);

        for (k, old) in [
            FieldKind::Temperature,
            FieldKind::Velocity,
            FieldKind::Divergence,
            FieldKind::Pressure,
        ]
        .iter()
        .zip(&before)
        {
            assert_eq!(s.read_field(*k).as_ref(), old.as_slice(), "{k:?} changed");
        }
    }

    #[test]
    fn test_diffusion_spreads_heat_and_conserves_roughly() {
        let mut s = solver(8);
        s.inject_source(&Vec3::new(4.0, 4.0, 4.0), 1.0);
        s.step(0.1, 1.0, 0.0, 20);
        let t = s.read_temperature();
        let centre = t[s.dims().index(4, 4, 4)];
        let neighbour = t[s.dims().index(5, 4, 4)];
        assert!(centre < 1.0);
        assert!(neighbour > 0.0);
        let total: f32 = t.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_buoyancy_lifts_hot_voxels() {
        let mut s = solver(8);
        s.inject_source(&Vec3::new(4.0, 4.0, 4.0), 2.0);
        s.simulate_wind(&Vec3::zeros(), 0.0, 0.1);
        let v = s.field(FieldKind::Velocity).get(4, 4, 4);
        assert!(v.y > 0.0);
        assert_eq!(v.x, 0.0);
        assert_eq!(s.field(FieldKind::Velocity).get(0, 0, 0).y, 0.0);
    }

    #[test]
    fn test_projection_reduces_source_divergence() {
        let mut s = solver(16);
        // Outflow from voxel (8, 8, 8) along x
        s.velocity.set(9, 8, 8, GridTexel::new(1.0, 0.0, 0.0, 0.0));
        s.velocity.set(7, 8, 8, GridTexel::new(-1.0, 0.0, 0.0, 0.0));
        let dims = s.dims();
        let centre = dims.index(8, 8, 8);

        let mut div = GridField::new(dims);
        kernels::divergence(s.velocity.as_slice(), div.as_mut_slice(), dims);
        let before = div.as_slice()[centre].x;
        assert_relative_eq!(before, 1.0, epsilon = 1e-6);

        s.project(20);
        kernels::divergence(s.velocity.as_slice(), div.as_mut_slice(), dims);
        let after = div.as_slice()[centre].x;
        assert!(after.abs() < before, "divergence {after} not below {before}");
    }

    #[test]
    fn test_projection_keeps_uniform_flow() {
        let mut s = solver(8);
        s.velocity.fill(GridTexel::new(0.5, 0.0, -0.25, 0.0));
        s.project(10);
        for v in s.velocity.as_slice() {
            assert_eq!(*v, GridTexel::new(0.5, 0.0, -0.25, 0.0));
        }
    }

    #[test]
    fn test_clear_and_shutdown() {
        let mut s = solver(8);
        s.inject_source(&Vec3::new(1.0, 1.0, 1.0), 5.0);
        s.clear();
        assert!(s.read_temperature().iter().all(|&t| t == 0.0));

        let ticket = s.submit_readback().unwrap();
        s.shutdown();
        assert!(ticket.receiver.try_recv().is_err());
        assert!(s.submit_readback().is_none());
        assert!(!s.is_gpu_accelerated());
    }
}
