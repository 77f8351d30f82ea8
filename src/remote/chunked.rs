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


//! Chunked object-store remote.
//!
//! A channel is a set of objects under its `collection/experiment/channel`
//! route: an `info` manifest describing each resolution, plus one blosc
//! frame per chunk. Chunk keys name the chunk's own extents
//! (`<scale key>/<x0>-<x1>_<y0>-<y1>_<z0>-<z1>`), clipped to the volume, so
//! edge chunks may be smaller than `chunk_size`. A chunk that was never
//! written reads back as zeros.
//!
//! The frames are self-describing: the typesize in the blosc header must
//! match the channel datatype and the decompressed length must match the
//! chunk's extents.

use super::{validate_block_data, CutoutQuery, HttpRequest, Session, VolumeTransport};
use crate::bounds::{slice_ranges, slice_ranges_mut, Block, BoundingBox, Vector3};
use crate::codec::{self, Voxel};
use crate::config;
use crate::error::{CutoutError, Result};
use crate::planner;
use crate::resource::{ChannelResource, Datatype};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INFO_KEY: &str = "info";

/// Byte storage keyed by `/`-separated paths.
pub trait ObjectStore: Send + Sync {
    /// `None` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Objects stored as files under a root folder.
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// A store rooted at `root`, creating the folder if needed.
    pub fn new(root: &Path) -> Result<FileSystemStore> {
        Ok(FileSystemStore {
            root: config::get_cuboid_root_abs_path(root)?,
        })
    }

    /// A store under the default cuboid root.
    pub fn default_root() -> Result<FileSystemStore> {
        FileSystemStore::new(Path::new(config::CUBOID_ROOT_PATH))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

impl ObjectStore for FileSystemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, value)?;
        Ok(())
    }
}

/// Objects in a bucket reachable over HTTP(S).
pub struct HttpStore<S: Session> {
    base_url: String,
    session: S,
}

impl<S: Session> HttpStore<S> {
    pub fn new(base_url: &str, session: S) -> HttpStore<S> {
        HttpStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

impl<S: Session> ObjectStore for HttpStore<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .session
            .send(HttpRequest::new(Method::GET, self.key_url(key)))?;
        if response.status == 404 {
            return Ok(None);
        }
        Ok(Some(response.error_for_status(key)?.body))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let request = HttpRequest::new(Method::PUT, self.key_url(key))
            .header("Content-Type", "application/octet-stream")
            .body(value.to_vec());
        self.session.send(request)?.error_for_status(key)?;
        Ok(())
    }
}

/// One resolution level of a chunked volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleInfo {
    /// Folder of this scale's chunks.
    pub key: String,
    /// Voxel counts along X, Y, Z.
    pub size: [u64; 3],
    /// Global coordinate of the first voxel.
    pub voxel_offset: [u64; 3],
    pub chunk_size: [u64; 3],
}

impl ScaleInfo {
    pub fn chunk_size(&self) -> Vector3 {
        Vector3::new(self.chunk_size[0], self.chunk_size[1], self.chunk_size[2])
    }

    pub fn voxel_offset(&self) -> Vector3 {
        Vector3::new(
            self.voxel_offset[0],
            self.voxel_offset[1],
            self.voxel_offset[2],
        )
    }

    /// Everything this scale holds.
    pub fn bounds(&self) -> Result<BoundingBox> {
        let size = Vector3::new(self.size[0], self.size[1], self.size[2]);
        BoundingBox::from_origin_and_shape(self.voxel_offset(), size)
    }

    /// The chunk that contains `point`, clipped to the volume.
    fn chunk_containing(&self, point: Vector3) -> Result<BoundingBox> {
        let volume = self.bounds()?;
        let offset = self.voxel_offset();
        let size = self.chunk_size();
        let axis = |p: u64, o: u64, s: u64, stop: u64| {
            let start = o + ((p - o) / s) * s;
            (start, (start + s).min(stop))
        };
        BoundingBox::new(
            axis(point.x, offset.x, size.x, volume.x.1),
            axis(point.y, offset.y, size.y, volume.y.1),
            axis(point.z, offset.z, size.z, volume.z.1),
        )
    }
}

/// The `info` manifest of a chunked volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub data_type: Datatype,
    pub scales: Vec<ScaleInfo>,
}

impl VolumeInfo {
    /// A manifest with a single full-resolution scale.
    pub fn new(data_type: Datatype, size: Vector3, chunk_size: Vector3) -> VolumeInfo {
        VolumeInfo {
            data_type,
            scales: vec![ScaleInfo {
                key: "0".to_string(),
                size: [size.x, size.y, size.z],
                voxel_offset: [0, 0, 0],
                chunk_size: [chunk_size.x, chunk_size.y, chunk_size.z],
            }],
        }
    }

    pub fn scale(&self, resolution: u8) -> Result<&ScaleInfo> {
        self.scales.get(resolution as usize).ok_or_else(|| {
            CutoutError::InvalidArgument(format!(
                "resolution {} not available ({} scales)",
                resolution,
                self.scales.len()
            ))
        })
    }
}

pub struct ChunkedRemote<S: ObjectStore> {
    /// Reads and writes channels stored as one object per chunk.
    ///
    /// Manifests are read once per channel route and kept. Partial-chunk
    /// writes are read-modify-write, serialized by `write_lock` so blocks
    /// written from different workers cannot clobber a shared chunk.
    store: S,
    manifests: Mutex<HashMap<String, VolumeInfo>>,
    write_lock: Mutex<()>,
}

fn chunk_key(route: &str, scale: &ScaleInfo, chunk: &BoundingBox) -> String {
    format!(
        "{}/{}/{}-{}_{}-{}_{}-{}",
        route, scale.key, chunk.x.0, chunk.x.1, chunk.y.0, chunk.y.1, chunk.z.0, chunk.z.1
    )
}

impl<S: ObjectStore> ChunkedRemote<S> {
    pub fn new(store: S) -> ChunkedRemote<S> {
        ChunkedRemote {
            store,
            manifests: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write a channel's manifest, creating the volume.
    pub fn create_volume(&self, channel: &ChannelResource, info: VolumeInfo) -> Result<()> {
        if info.data_type != channel.datatype {
            return Err(CutoutError::InvalidArgument(format!(
                "manifest datatype {} does not match channel datatype {}",
                info.data_type, channel.datatype
            )));
        }
        let route = channel.cutout_route();
        let manifest = serde_json::to_vec_pretty(&info)?;
        self.store.put(&format!("{}/{}", route, INFO_KEY), &manifest)?;
        self.manifests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(route, info);
        Ok(())
    }

    /// The manifest for `channel`, fetched on first use.
    pub fn volume_info(&self, channel: &ChannelResource) -> Result<VolumeInfo> {
        let route = channel.cutout_route();
        if let Some(info) = self
            .manifests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&route)
        {
            return Ok(info.clone());
        }

        let key = format!("{}/{}", route, INFO_KEY);
        let bytes = self.store.get(&key)?.ok_or_else(|| {
            CutoutError::IncompatibleResource(format!("{} (no {} manifest)", channel.name, key))
        })?;
        let info: VolumeInfo = serde_json::from_slice(&bytes)?;
        if info.data_type != channel.datatype {
            return Err(CutoutError::InvalidArgument(format!(
                "{} stores {} but the channel declares {}",
                route, info.data_type, channel.datatype
            )));
        }
        self.manifests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(route, info.clone());
        Ok(info)
    }

    fn scale_for(&self, query: &CutoutQuery, bounds: &BoundingBox) -> Result<ScaleInfo> {
        if query.options.time_range.is_some() {
            return Err(CutoutError::InvalidArgument(
                "chunked volumes have no time axis".to_string(),
            ));
        }
        if query.options.filter().is_some() {
            return Err(CutoutError::InvalidArgument(
                "chunked volumes do not support filter ids".to_string(),
            ));
        }
        let info = self.volume_info(query.channel)?;
        let scale = info.scale(query.resolution)?.clone();
        let volume = scale.bounds()?;
        if !volume.contains(bounds) {
            return Err(CutoutError::InvalidArgument(format!(
                "{} lies outside the volume {}",
                bounds, volume
            )));
        }
        Ok(scale)
    }

    /// Load one chunk, or zeros if it was never written.
    fn read_chunk<V: Voxel>(&self, key: &str, chunk: &BoundingBox) -> Result<ArrayD<V>> {
        let shape = chunk.array_shape(None);
        match self.store.get(key)? {
            None => Ok(ArrayD::from_elem(IxDyn(&shape), V::default())),
            Some(payload) => {
                let header = codec::parse_header(&payload)?;
                if header.typesize != V::DATATYPE.itemsize() {
                    return Err(CutoutError::CorruptPayload(format!(
                        "chunk {} has typesize {}, expected {}",
                        key,
                        header.typesize,
                        V::DATATYPE.itemsize()
                    )));
                }
                let expected = shape.iter().product::<usize>() * header.typesize;
                if header.nbytes != expected {
                    return Err(CutoutError::CorruptPayload(format!(
                        "chunk {} holds {} bytes, expected {}",
                        key, header.nbytes, expected
                    )));
                }
                let raw = codec::decompress(&payload)?;
                codec::from_le_bytes(&raw, &shape)
            }
        }
    }

    fn write_chunk<V: Voxel>(&self, key: &str, data: &ArrayViewD<V>) -> Result<()> {
        let payload = codec::compress(&codec::to_le_bytes(data), V::DATATYPE.itemsize());
        self.store.put(key, &payload)
    }
}

impl<S: ObjectStore> VolumeTransport for ChunkedRemote<S> {
    fn fetch_block<V: Voxel>(&self, query: &CutoutQuery, block: &Block) -> Result<ArrayD<V>> {
        codec::check_element_type::<V>(query.channel.datatype)?;
        let scale = self.scale_for(query, &block.bounds)?;
        let route = query.channel.cutout_route();

        let mut volume = ArrayD::from_elem(IxDyn(&query.block_shape(block)), V::default());
        let pieces = planner::grid_blocks(&block.bounds, scale.voxel_offset(), scale.chunk_size())?;
        for piece in &pieces {
            let chunk = scale.chunk_containing(piece.bounds.start())?;
            let key = chunk_key(&route, &scale, &chunk);
            log::debug!("Reading chunk {}", key);
            let array = self.read_chunk::<V>(&key, &chunk)?;

            let within_chunk = Block {
                bounds: piece.bounds,
                offset: piece.bounds.offset_from(chunk.start()),
            };
            let array = array.view();
            let source = slice_ranges(&array, &within_chunk.array_ranges(None));
            slice_ranges_mut(&mut volume, &piece.array_ranges(None)).assign(&source);
        }
        Ok(volume)
    }

    fn store_block<V: Voxel>(
        &self,
        query: &CutoutQuery,
        block: &Block,
        data: ArrayViewD<V>,
    ) -> Result<()> {
        validate_block_data(query, block, &data)?;
        codec::check_element_type::<V>(query.channel.datatype)?;
        let scale = self.scale_for(query, &block.bounds)?;
        let route = query.channel.cutout_route();

        let pieces = planner::grid_blocks(&block.bounds, scale.voxel_offset(), scale.chunk_size())?;
        for piece in &pieces {
            let chunk = scale.chunk_containing(piece.bounds.start())?;
            let key = chunk_key(&route, &scale, &chunk);
            let source = slice_ranges(&data, &piece.array_ranges(None));

            if piece.bounds == chunk {
                log::debug!("Writing chunk {}", key);
                self.write_chunk(&key, &source)?;
                continue;
            }

            log::debug!("Updating chunk {}", key);
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut array = self.read_chunk::<V>(&key, &chunk)?;
            let within_chunk = Block {
                bounds: piece.bounds,
                offset: piece.bounds.offset_from(chunk.start()),
            };
            slice_ranges_mut(&mut array, &within_chunk.array_ranges(None)).assign(&source);
            self.write_chunk(&key, &array.view())?;
        }
        Ok(())
    }

    fn grid_origin(&self, query: &CutoutQuery) -> Result<Vector3> {
        let info = self.volume_info(query.channel)?;
        Ok(info.scale(query.resolution)?.voxel_offset())
    }
}
