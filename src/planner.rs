/*

Copyright 2020 The Johns Hopkins University Applied Physics Laboratory

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.

*/


/// Block planning.
///
/// Converts one large cutout request into a list of smaller requests whose
/// interior boundaries line up with the backend's block grid. Each axis is
/// partitioned on its own and the blocks are the cartesian product of the
/// three partitions.
use crate::bounds::{Block, BoundingBox, Extents, Vector3};
use crate::error::{CutoutError, Result};

/// Partition `[start, stop)` at every grid line `origin + k * block_size`
/// that falls strictly inside it.
///
/// # Arguments
///
/// * `extents` - The `[start, stop)` range on this axis
/// * `origin` - Any point on the block grid
/// * `block_size` - Grid spacing along this axis
///
pub fn grid_intervals(extents: Extents, origin: u64, block_size: u64) -> Vec<Extents> {
    let (start, stop) = extents;
    if block_size == 0 {
        return vec![extents];
    }

    // First grid line strictly greater than `start`. The origin may sit on
    // either side of the range, so work in signed space.
    let step = block_size as i128;
    let relative = start as i128 - origin as i128;
    let mut boundary = origin as i128 + (relative.div_euclid(step) + 1) * step;

    let mut intervals = Vec::new();
    let mut lower = start;
    while boundary < stop as i128 {
        let upper = boundary as u64;
        intervals.push((lower, upper));
        lower = upper;
        boundary += step;
    }
    intervals.push((lower, stop));
    intervals
}

/// Like `grid_intervals`, except an axis no longer than one block is never
/// fragmented, even if a grid line happens to cross it.
pub fn axis_intervals(extents: Extents, origin: u64, block_size: u64) -> Vec<Extents> {
    if extents.1 - extents.0 <= block_size {
        return vec![extents];
    }
    grid_intervals(extents, origin, block_size)
}

fn check_block_size(block_size: Vector3) -> Result<()> {
    if block_size.x == 0 || block_size.y == 0 || block_size.z == 0 {
        return Err(CutoutError::InvalidArgument(format!(
            "block size must be positive on every axis, got {}",
            block_size
        )));
    }
    Ok(())
}

fn cartesian_blocks(
    bounds: &BoundingBox,
    xs: &[Extents],
    ys: &[Extents],
    zs: &[Extents],
) -> Vec<Block> {
    let start = bounds.start();
    let mut blocks = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for &x in xs {
        for &y in ys {
            for &z in zs {
                let block_bounds = BoundingBox { x, y, z };
                blocks.push(Block {
                    bounds: block_bounds,
                    offset: block_bounds.offset_from(start),
                });
            }
        }
    }
    blocks
}

/// Split a bounding box into grid-aligned blocks.
///
/// Blocks come back X-major, then Y, then Z. The order is deterministic, and
/// each block carries its offset from the start of `bounds` so it can be
/// placed into (or cut out of) the full request array.
///
/// # Arguments
///
/// * `bounds` - The whole request
/// * `origin` - A corner of the backend's block grid (usually zero)
/// * `block_size` - The XYZ block size (e.g. 512*512*16)
///
pub fn compute_blocks(
    bounds: &BoundingBox,
    origin: Vector3,
    block_size: Vector3,
) -> Result<Vec<Block>> {
    check_block_size(block_size)?;
    let xs = axis_intervals(bounds.x, origin.x, block_size.x);
    let ys = axis_intervals(bounds.y, origin.y, block_size.y);
    let zs = axis_intervals(bounds.z, origin.z, block_size.z);
    Ok(cartesian_blocks(bounds, &xs, &ys, &zs))
}

/// Split a bounding box strictly along the grid: every piece lies inside a
/// single grid cell. Used by stores that persist one object per cell.
pub fn grid_blocks(
    bounds: &BoundingBox,
    origin: Vector3,
    block_size: Vector3,
) -> Result<Vec<Block>> {
    check_block_size(block_size)?;
    let xs = grid_intervals(bounds.x, origin.x, block_size.x);
    let ys = grid_intervals(bounds.y, origin.y, block_size.y);
    let zs = grid_intervals(bounds.z, origin.z, block_size.z);
    Ok(cartesian_blocks(bounds, &xs, &ys, &zs))
}
