//! Full-grid passes of the stable-fluids step
//!
//! Every pass reads from input slices and writes a separate output slice, so
//! each z slab can be computed independently. Out-of-range neighbours clamp
//! to the boundary.

use super::fields::{GridDims, GridTexel};
use crate::core_types::vec3::Vec3;
use rayon::prelude::*;

#[inline]
fn fetch(src: &[GridTexel], d: GridDims, x: isize, y: isize, z: isize) -> GridTexel {
    src[d.clamped_index(x, y, z)]
}

#[inline]
fn neighbour_sum(src: &[GridTexel], d: GridDims, x: isize, y: isize, z: isize) -> GridTexel {
    fetch(src, d, x - 1, y, z)
        + fetch(src, d, x + 1, y, z)
        + fetch(src, d, x, y - 1, z)
        + fetch(src, d, x, y + 1, z)
        + fetch(src, d, x, y, z - 1)
        + fetch(src, d, x, y, z + 1)
}

/// One Jacobi relaxation pass of the implicit diffusion system
///
/// `out = (x0 + a * Σ neighbours(cur)) / (1 + 6a)`. With `a == 0` every voxel
/// reproduces `x0` exactly.
pub(crate) fn jacobi_diffuse(
    x0: &[GridTexel],
    cur: &[GridTexel],
    out: &mut [GridTexel],
    a: f32,
    d: GridDims,
) {
    let inv = 1.0 / (1.0 + 6.0 * a);
    out.par_chunks_mut(d.slab())
        .enumerate()
        .for_each(|(z, layer)| {
            for y in 0..d.ny {
                for x in 0..d.nx {
                    let sum = neighbour_sum(cur, d, x as isize, y as isize, z as isize);
                    layer[y * d.nx + x] = (x0[d.index(x, y, z)] + sum * a) * inv;
                }
            }
        });
}

/// Central-difference divergence of `vel`, written to channel `x` of `out`
pub(crate) fn divergence(vel: &[GridTexel], out: &mut [GridTexel], d: GridDims) {
    out.par_chunks_mut(d.slab())
        .enumerate()
        .for_each(|(z, layer)| {
            let zi = z as isize;
            for y in 0..d.ny {
                let yi = y as isize;
                for x in 0..d.nx {
                    let xi = x as isize;
                    let du = fetch(vel, d, xi + 1, yi, zi).x - fetch(vel, d, xi - 1, yi, zi).x;
                    let dv = fetch(vel, d, xi, yi + 1, zi).y - fetch(vel, d, xi, yi - 1, zi).y;
                    let dw = fetch(vel, d, xi, yi, zi + 1).z - fetch(vel, d, xi, yi, zi - 1).z;
                    layer[y * d.nx + x] = GridTexel::scalar(0.5 * (du + dv + dw));
                }
            }
        });
}

/// One Jacobi pass of the pressure Poisson equation `∇²p = div`
pub(crate) fn jacobi_pressure(
    div: &[GridTexel],
    cur: &[GridTexel],
    out: &mut [GridTexel],
    d: GridDims,
) {
    out.par_chunks_mut(d.slab())
        .enumerate()
        .for_each(|(z, layer)| {
            for y in 0..d.ny {
                for x in 0..d.nx {
                    let sum = neighbour_sum(cur, d, x as isize, y as isize, z as isize).x;
                    let b = div[d.index(x, y, z)].x;
                    layer[y * d.nx + x] = GridTexel::scalar((sum - b) / 6.0);
                }
            }
        });
}

/// Subtract the pressure gradient from the velocity field in place
pub(crate) fn subtract_gradient(vel: &mut [GridTexel], pressure: &[GridTexel], d: GridDims) {
    vel.par_chunks_mut(d.slab())
        .enumerate()
        .for_each(|(z, layer)| {
            let zi = z as isize;
            for y in 0..d.ny {
                let yi = y as isize;
                for x in 0..d.nx {
                    let xi = x as isize;
                    let gx = fetch(pressure, d, xi + 1, yi, zi).x - fetch(pressure, d, xi - 1, yi, zi).x;
                    let gy = fetch(pressure, d, xi, yi + 1, zi).x - fetch(pressure, d, xi, yi - 1, zi).x;
                    let gz = fetch(pressure, d, xi, yi, zi + 1).x - fetch(pressure, d, xi, yi, zi - 1).x;
                    let v = &mut layer[y * d.nx + x];
                    v.x -= 0.5 * gx;
                    v.y -= 0.5 * gy;
                    v.z -= 0.5 * gz;
                }
            }
        });
}

/// Clamp a back-traced coordinate into `[0, n - 1]`, falling back to the
/// voxel itself when the trace is not finite.
#[inline]
fn clamp_coord(p: f32, fallback: usize, n: usize) -> f32 {
    if p.is_finite() {
        p.clamp(0.0, (n - 1) as f32)
    } else {
        fallback as f32
    }
}

/// Trilinear sample at a continuous voxel coordinate
#[inline]
pub(crate) fn sample_trilinear(src: &[GridTexel], d: GridDims, px: f32, py: f32, pz: f32) -> GridTexel {
    let x0 = px.floor() as usize;
    let y0 = py.floor() as usize;
    let z0 = pz.floor() as usize;
    let x1 = (x0 + 1).min(d.nx - 1);
    let y1 = (y0 + 1).min(d.ny - 1);
    let z1 = (z0 + 1).min(d.nz - 1);
    let tx = px - x0 as f32;
    let ty = py - y0 as f32;
    let tz = pz - z0 as f32;

    let c00 = src[d.index(x0, y0, z0)].lerp(src[d.index(x1, y0, z0)], tx);
    let c10 = src[d.index(x0, y1, z0)].lerp(src[d.index(x1, y1, z0)], tx);
    let c01 = src[d.index(x0, y0, z1)].lerp(src[d.index(x1, y0, z1)], tx);
    let c11 = src[d.index(x0, y1, z1)].lerp(src[d.index(x1, y1, z1)], tx);
    let c0 = c00.lerp(c10, ty);
    let c1 = c01.lerp(c11, ty);
    c0.lerp(c1, tz)
}

/// Semi-Lagrangian advection of `src` along `vel` (voxels per second)
pub(crate) fn advect(
    src: &[GridTexel],
    vel: &[GridTexel],
    out: &mut [GridTexel],
    dt: f32,
    d: GridDims,
) {
    out.par_chunks_mut(d.slab())
        .enumerate()
        .for_each(|(z, layer)| {
            for y in 0..d.ny {
                for x in 0..d.nx {
                    let v = vel[d.index(x, y, z)];
                    let px = clamp_coord(x as f32 - dt * v.x, x, d.nx);
                    let py = clamp_coord(y as f32 - dt * v.y, y, d.ny);
                    let pz = clamp_coord(z as f32 - dt * v.z, z, d.nz);
                    layer[y * d.nx + x] = sample_trilinear(src, d, px, py, pz);
                }
            }
        });
}

/// Wind bias, buoyancy and damping on the velocity field
///
/// `v' = v * damping_scale + bias + up * buoyancy_dt * T`, where `up` is +y.
pub(crate) fn apply_wind(
    vel: &mut [GridTexel],
    temperature: &[GridTexel],
    bias: &Vec3,
    buoyancy_dt: f32,
    damping_scale: f32,
    d: GridDims,
) {
    vel.par_chunks_mut(d.slab())
        .zip(temperature.par_chunks(d.slab()))
        .for_each(|(layer, temp_layer)| {
            for (v, t) in layer.iter_mut().zip(temp_layer) {
                v.x = v.x * damping_scale + bias.x;
                v.y = v.y * damping_scale + bias.y + buoyancy_dt * t.x;
                v.z = v.z * damping_scale + bias.z;
            }
        });
}
