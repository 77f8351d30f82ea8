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


/// Geometry module.
///
/// Half-open integer boxes in global voxel coordinates, and the blocks a
/// large box is split into.
use crate::error::{CutoutError, Result};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Slice};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A `[start, stop)` interval along a single axis.
pub type Extents = (u64, u64);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector3 {
    /// A vector of X, Y, and Z members.
    ///
    /// Used for origins, block sizes and shapes. Remember that arrays are
    /// C-ordered, so an array's shape reads back as (z, y, x).
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

impl Vector3 {
    pub fn new(x: u64, y: u64, z: u64) -> Vector3 {
        Vector3 { x, y, z }
    }

    /// Product of the three members.
    pub fn volume(&self) -> u64 {
        self.x * self.y * self.z
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}_y{}_z{}", self.x, self.y, self.z)
    }
}

/// A spatial cutout region: one half-open interval per axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: Extents,
    pub y: Extents,
    pub z: Extents,
}

fn check_extents(axis: &str, extents: Extents) -> Result<()> {
    if extents.0 >= extents.1 {
        return Err(CutoutError::InvalidArgument(format!(
            "{} range {}:{} is empty or reversed",
            axis, extents.0, extents.1
        )));
    }
    Ok(())
}

impl BoundingBox {
    /// Build a box, rejecting empty or reversed ranges.
    pub fn new(x: Extents, y: Extents, z: Extents) -> Result<BoundingBox> {
        check_extents("x", x)?;
        check_extents("y", y)?;
        check_extents("z", z)?;
        Ok(BoundingBox { x, y, z })
    }

    /// Build a box from a start corner and a shape.
    pub fn from_origin_and_shape(origin: Vector3, shape: Vector3) -> Result<BoundingBox> {
        BoundingBox::new(
            (origin.x, origin.x + shape.x),
            (origin.y, origin.y + shape.y),
            (origin.z, origin.z + shape.z),
        )
    }

    pub fn start(&self) -> Vector3 {
        Vector3::new(self.x.0, self.y.0, self.z.0)
    }

    pub fn stop(&self) -> Vector3 {
        Vector3::new(self.x.1, self.y.1, self.z.1)
    }

    /// Voxel counts along X, Y and Z.
    pub fn shape(&self) -> Vector3 {
        Vector3::new(self.x.1 - self.x.0, self.y.1 - self.y.0, self.z.1 - self.z.0)
    }

    /// Spatial voxel count.
    pub fn voxel_count(&self) -> u64 {
        self.shape().volume()
    }

    /// C-ordered array shape for this box, with a leading time axis when a
    /// time range is given.
    pub fn array_shape(&self, time_range: Option<Extents>) -> Vec<usize> {
        let shape = self.shape();
        let mut dims = Vec::with_capacity(4);
        if let Some((t_start, t_stop)) = time_range {
            dims.push((t_stop - t_start) as usize);
        }
        dims.push(shape.z as usize);
        dims.push(shape.y as usize);
        dims.push(shape.x as usize);
        dims
    }

    /// Intersection of two boxes, or `None` if they do not overlap.
    pub fn intersect(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let clip = |a: Extents, b: Extents| (a.0.max(b.0), a.1.min(b.1));
        let x = clip(self.x, other.x);
        let y = clip(self.y, other.y);
        let z = clip(self.z, other.z);
        if x.0 >= x.1 || y.0 >= y.1 || z.0 >= z.1 {
            return None;
        }
        Some(BoundingBox { x, y, z })
    }

    /// True if `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x.0 <= other.x.0
            && other.x.1 <= self.x.1
            && self.y.0 <= other.y.0
            && other.y.1 <= self.y.1
            && self.z.0 <= other.z.0
            && other.z.1 <= self.z.1
    }

    /// Position of this box's start corner relative to `origin`.
    pub fn offset_from(&self, origin: Vector3) -> Vector3 {
        Vector3::new(self.x.0 - origin.x, self.y.0 - origin.y, self.z.0 - origin.z)
    }
}

impl fmt::Display for BoundingBox {
    /// Formats as `x0:x1/y0:y1/z0:z1`, the way extents appear in cutout URLs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}:{}/{}:{}",
            self.x.0, self.x.1, self.y.0, self.y.1, self.z.0, self.z.1
        )
    }
}

/// One piece of a larger cutout.
///
/// `offset` is where `bounds` starts inside the destination (or source)
/// array, measured from the start of the whole request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub bounds: BoundingBox,
    pub offset: Vector3,
}

impl Block {
    /// The single block that covers a whole request.
    pub fn whole(bounds: BoundingBox) -> Block {
        Block {
            bounds,
            offset: Vector3::default(),
        }
    }

    /// Per-axis index ranges of this block inside the full request array,
    /// in the same axis order as `BoundingBox::array_shape`.
    pub fn array_ranges(&self, time_len: Option<usize>) -> Vec<Range<usize>> {
        let shape = self.bounds.shape();
        let span = |offset: u64, len: u64| offset as usize..(offset + len) as usize;
        let mut ranges = Vec::with_capacity(4);
        if let Some(t_len) = time_len {
            ranges.push(0..t_len);
        }
        ranges.push(span(self.offset.z, shape.z));
        ranges.push(span(self.offset.y, shape.y));
        ranges.push(span(self.offset.x, shape.x));
        ranges
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bounds)
    }
}

/// View of `data` restricted to one index range per axis.
pub fn slice_ranges<'a, V>(data: &'a ArrayViewD<V>, ranges: &[Range<usize>]) -> ArrayViewD<'a, V> {
    let mut view = data.view();
    for (axis, range) in ranges.iter().enumerate() {
        view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
    }
    view
}

/// Mutable view of `data` restricted to one index range per axis.
pub fn slice_ranges_mut<'a, V>(
    data: &'a mut ArrayD<V>,
    ranges: &[Range<usize>],
) -> ArrayViewMutD<'a, V> {
    let mut view = data.view_mut();
    for (axis, range) in ranges.iter().enumerate() {
        view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
    }
    view
}
