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


//! Wire encoding for voxel data.
//!
//! BossDB speaks blosc: a flat, C-ordered, little-endian buffer of voxels,
//! blosc-compressed with the element size as the typesize. The frame says
//! nothing about the array's shape or datatype, so the decoder has to be
//! told both.

use crate::error::{CutoutError, Result};
use crate::resource::Datatype;
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::fmt::Debug;
use std::mem;

/// Length of the header at the start of every blosc frame.
pub const BLOSC_HEADER_LEN: usize = 16;

/// A voxel element type with a fixed little-endian byte representation.
pub trait Voxel: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The channel datatype this element type stores.
    const DATATYPE: Datatype;

    /// Fill `dst` from exactly `dst.len() * size_of::<Self>()` bytes.
    fn read_le_into(src: &[u8], dst: &mut [Self]);

    /// Write `src` into exactly `src.len() * size_of::<Self>()` bytes.
    fn write_le_into(src: &[Self], dst: &mut [u8]);
}

impl Voxel for u8 {
    const DATATYPE: Datatype = Datatype::Uint8;

    fn read_le_into(src: &[u8], dst: &mut [u8]) {
        dst.copy_from_slice(src);
    }

    fn write_le_into(src: &[u8], dst: &mut [u8]) {
        dst.copy_from_slice(src);
    }
}

macro_rules! impl_voxel {
    ($t:ty, $datatype:expr, $bo_read_fn:ident, $bo_write_fn:ident) => {
        impl Voxel for $t {
            const DATATYPE: Datatype = $datatype;

            fn read_le_into(src: &[u8], dst: &mut [$t]) {
                LittleEndian::$bo_read_fn(src, dst);
            }

            fn write_le_into(src: &[$t], dst: &mut [u8]) {
                LittleEndian::$bo_write_fn(src, dst);
            }
        }
    };
}

impl_voxel!(u16, Datatype::Uint16, read_u16_into, write_u16_into);
impl_voxel!(u32, Datatype::Uint32, read_u32_into, write_u32_into);
impl_voxel!(u64, Datatype::Uint64, read_u64_into, write_u64_into);
impl_voxel!(f32, Datatype::Float32, read_f32_into, write_f32_into);
impl_voxel!(f64, Datatype::Float64, read_f64_into, write_f64_into);

/// Fail unless the element type `V` stores `datatype`.
pub fn check_element_type<V: Voxel>(datatype: Datatype) -> Result<()> {
    if V::DATATYPE != datatype {
        return Err(CutoutError::InvalidArgument(format!(
            "array elements are {} but the channel stores {}",
            V::DATATYPE,
            datatype
        )));
    }
    Ok(())
}

/// Serialize an array in logical C order as little-endian bytes.
pub fn to_le_bytes<V: Voxel>(data: &ArrayViewD<V>) -> Vec<u8> {
    let values: Vec<V> = data.iter().cloned().collect();
    let mut bytes = vec![0u8; values.len() * mem::size_of::<V>()];
    V::write_le_into(&values, &mut bytes);
    bytes
}

/// Rebuild a C-ordered array of `shape` from little-endian bytes.
pub fn from_le_bytes<V: Voxel>(bytes: &[u8], shape: &[usize]) -> Result<ArrayD<V>> {
    let expected = expected_len::<V>(shape);
    if bytes.len() != expected {
        return Err(CutoutError::CorruptPayload(format!(
            "expected {} bytes for shape {:?} of {}, got {}",
            expected,
            shape,
            V::DATATYPE,
            bytes.len()
        )));
    }
    let mut values = vec![V::default(); shape.iter().product()];
    V::read_le_into(bytes, &mut values);
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| CutoutError::CorruptPayload(e.to_string()))
}

/// Byte length of a `shape` array of `V`.
fn expected_len<V: Voxel>(shape: &[usize]) -> usize {
    shape.iter().product::<usize>() * mem::size_of::<V>()
}

/// Blosc-compress a byte buffer, tagging it with `typesize`.
pub fn compress(bytes: &[u8], typesize: usize) -> Vec<u8> {
    let ctx = blosc::Context::new().typesize(Some(typesize));
    let compressed: blosc::Buffer<u8> = ctx.compress(bytes);
    compressed.into()
}

/// The fixed-size header at the start of every blosc frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BloscHeader {
    pub version: u8,
    pub flags: u8,
    /// Element size the frame was compressed with.
    pub typesize: usize,
    /// Decompressed length.
    pub nbytes: usize,
    /// Length of the whole frame, header included.
    pub cbytes: usize,
}

/// Parse and sanity-check a blosc frame header.
pub fn parse_header(payload: &[u8]) -> Result<BloscHeader> {
    if payload.len() < BLOSC_HEADER_LEN {
        return Err(CutoutError::CorruptPayload(format!(
            "{} bytes is too short for a blosc frame",
            payload.len()
        )));
    }
    let header = BloscHeader {
        version: payload[0],
        flags: payload[2],
        typesize: payload[3] as usize,
        nbytes: LittleEndian::read_u32(&payload[4..8]) as usize,
        cbytes: LittleEndian::read_u32(&payload[12..16]) as usize,
    };
    if header.cbytes != payload.len() {
        return Err(CutoutError::CorruptPayload(format!(
            "blosc header claims {} compressed bytes, frame has {}",
            header.cbytes,
            payload.len()
        )));
    }
    if header.typesize == 0 {
        return Err(CutoutError::CorruptPayload(
            "blosc header has a typesize of 0".to_string(),
        ));
    }
    Ok(header)
}

/// Inflate a blosc frame back into raw bytes.
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>> {
    let header = parse_header(payload)?;
    if header.nbytes == 0 {
        return Ok(vec![]);
    }
    // blosc trusts the header's lengths, which were checked against the
    // frame above.
    let raw = unsafe { blosc::decompress_bytes::<u8>(payload) }
        .map_err(|_| CutoutError::CorruptPayload("invalid blosc frame".to_string()))?;
    if raw.len() != header.nbytes {
        return Err(CutoutError::CorruptPayload(format!(
            "blosc frame inflated to {} bytes, header says {}",
            raw.len(),
            header.nbytes
        )));
    }
    Ok(raw)
}

fn check_wire_datatype(datatype: Datatype) -> Result<()> {
    match datatype {
        Datatype::Uint8 | Datatype::Uint16 | Datatype::Uint64 => Ok(()),
        other => Err(CutoutError::UnsupportedDatatype(other)),
    }
}

/// Encode a 3D or 4D array for upload.
///
/// # Arguments
///
/// * `data` - Voxels in (z, y, x) or (t, z, y, x) order
/// * `datatype` - The channel's datatype; must match `V`
///
pub fn encode<V: Voxel>(data: &ArrayViewD<V>, datatype: Datatype) -> Result<Vec<u8>> {
    check_wire_datatype(datatype)?;
    check_element_type::<V>(datatype)?;
    if data.ndim() != 3 && data.ndim() != 4 {
        return Err(CutoutError::InvalidArgument(format!(
            "can only encode 3D or 4D arrays, got {} dimensions",
            data.ndim()
        )));
    }
    Ok(compress(&to_le_bytes(data), datatype.itemsize()))
}

/// Decode a downloaded payload into an array of exactly `shape`.
///
/// # Arguments
///
/// * `payload` - The blosc frame as received
/// * `datatype` - The channel's datatype; must match `V`
/// * `shape` - (z, y, x) or (t, z, y, x) voxel counts
///
pub fn decode<V: Voxel>(payload: &[u8], datatype: Datatype, shape: &[usize]) -> Result<ArrayD<V>> {
    check_wire_datatype(datatype)?;
    check_element_type::<V>(datatype)?;
    let header = parse_header(payload)?;
    let expected = expected_len::<V>(shape);
    if header.nbytes != expected {
        return Err(CutoutError::CorruptPayload(format!(
            "blosc frame holds {} bytes, shape {:?} of {} needs {}",
            header.nbytes, shape, datatype, expected
        )));
    }
    let raw = decompress(payload)?;
    from_le_bytes(&raw, shape)
}
