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


/// Cutout orchestration.
///
/// `CutoutManager` is the entry point for reading and writing cutouts. Small
/// requests go to the transport as a single block. Anything larger than the
/// configured threshold is planned into blocks, the blocks are dispatched
/// (serially or on a worker pool), and the pieces are stitched into (or cut
/// out of) one array. Results are always paired with the block they came
/// from, so completion order never matters.
use crate::bounds::{slice_ranges, slice_ranges_mut, Block, BoundingBox};
use crate::codec::{self, Voxel};
use crate::config::CutoutConfig;
use crate::error::{CutoutError, Result};
use crate::planner;
use crate::remote::{validate_dimensions, CutoutOptions, CutoutQuery, VolumeTransport};
use crate::resource::{ChannelResource, Resource};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use rayon::prelude::*;

pub struct CutoutManager<T: VolumeTransport> {
    transport: T,
    config: CutoutConfig,
}

impl<T: VolumeTransport> CutoutManager<T> {
    pub fn new(transport: T, config: CutoutConfig) -> Result<CutoutManager<T>> {
        config.validate()?;
        Ok(CutoutManager { transport, config })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &CutoutConfig {
        &self.config
    }

    /// Download a cutout.
    ///
    /// # Arguments
    ///
    /// * `resource` - Must be a channel whose datatype matches `V`
    /// * `resolution` - 0 is native resolution
    /// * `bounds` - The spatial region to fetch
    /// * `options` - Time range, access mode, filter ids
    ///
    /// # Returns
    ///
    /// * A (z, y, x) array, or (t, z, y, x) if a time range was given
    ///
    pub fn get_cutout<V: Voxel>(
        &self,
        resource: &Resource,
        resolution: u8,
        bounds: &BoundingBox,
        options: &CutoutOptions,
    ) -> Result<ArrayD<V>> {
        let channel = validate_resource(resource)?;
        codec::check_element_type::<V>(channel.datatype)?;
        check_time_range(options)?;
        let query = CutoutQuery {
            channel,
            resolution,
            options,
        };

        let voxels = bounds.voxel_count() * options.time_len().unwrap_or(1) as u64;
        if (voxels as f64) <= self.config.chunk_threshold() {
            log::debug!("Fetching {} from {} in one request", bounds, channel.name);
            return self.transport.fetch_block(&query, &Block::whole(*bounds));
        }

        let origin = self.transport.grid_origin(&query)?;
        let blocks = planner::compute_blocks(bounds, origin, self.config.block_size)?;
        log::info!(
            "Fetching {} from {} as {} blocks",
            bounds,
            channel.name,
            blocks.len()
        );

        let results =
            self.dispatch(&blocks, |block| self.transport.fetch_block::<V>(&query, block))?;

        let shape = bounds.array_shape(options.time_range);
        let mut volume = ArrayD::from_elem(IxDyn(&shape), V::default());
        for (block, data) in results {
            let expected = query.block_shape(&block);
            if data.shape() != expected.as_slice() {
                return Err(CutoutError::Block {
                    block,
                    source: Box::new(CutoutError::CorruptPayload(format!(
                        "got shape {:?}, expected {:?}",
                        data.shape(),
                        expected
                    ))),
                });
            }
            slice_ranges_mut(&mut volume, &block.array_ranges(options.time_len())).assign(&data);
        }
        Ok(volume)
    }

    /// Upload a cutout.
    ///
    /// `data` must be (z, y, x), or (t, z, y, x) when a time range is given,
    /// and exactly cover `bounds`. Large uploads are split along the spatial
    /// axes only; every block carries the full time range.
    pub fn create_cutout<V: Voxel>(
        &self,
        resource: &Resource,
        resolution: u8,
        bounds: &BoundingBox,
        data: ArrayViewD<V>,
        options: &CutoutOptions,
    ) -> Result<()> {
        let channel = validate_resource(resource)?;
        codec::check_element_type::<V>(channel.datatype)?;
        check_time_range(options)?;
        validate_dimensions(data.ndim(), options.time_range)?;
        let expected = bounds.array_shape(options.time_range);
        if data.shape() != expected.as_slice() {
            return Err(CutoutError::InvalidArgument(format!(
                "data shape {:?} does not match {} (expected {:?})",
                data.shape(),
                bounds,
                expected
            )));
        }
        let query = CutoutQuery {
            channel,
            resolution,
            options,
        };

        if (bounds.voxel_count() as f64) <= self.config.chunk_threshold() {
            log::debug!("Uploading {} to {} in one request", bounds, channel.name);
            return self
                .transport
                .store_block(&query, &Block::whole(*bounds), data);
        }

        let origin = self.transport.grid_origin(&query)?;
        let blocks = planner::compute_blocks(bounds, origin, self.config.block_size)?;
        log::info!(
            "Uploading {} to {} as {} blocks",
            bounds,
            channel.name,
            blocks.len()
        );

        let time_len = options.time_len();
        self.dispatch(&blocks, |block| {
            let piece = slice_ranges(&data, &block.array_ranges(time_len));
            self.transport.store_block(&query, block, piece)
        })?;
        Ok(())
    }

    /// Run `task` once per block and pair each result with its block.
    ///
    /// The first failure aborts the whole operation and is returned wrapped
    /// with the block that produced it.
    fn dispatch<R, F>(&self, blocks: &[Block], task: F) -> Result<Vec<(Block, R)>>
    where
        R: Send,
        F: Fn(&Block) -> Result<R> + Sync,
    {
        let run = |block: &Block| {
            task(block)
                .map(|result| (*block, result))
                .map_err(|e| CutoutError::Block {
                    block: *block,
                    source: Box::new(e),
                })
        };

        if !self.config.parallel || blocks.len() < 2 {
            return blocks.iter().map(run).collect();
        }

        let workers = self.config.worker_count();
        log::debug!("Dispatching {} blocks to {} workers", blocks.len(), workers);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        pool.install(|| blocks.par_iter().map(run).collect())
    }
}

fn validate_resource(resource: &Resource) -> Result<&ChannelResource> {
    if !resource.valid_volume() {
        return Err(CutoutError::IncompatibleResource(resource.name().to_string()));
    }
    resource.as_channel()
}

fn check_time_range(options: &CutoutOptions) -> Result<()> {
    if let Some((start, stop)) = options.time_range {
        if start >= stop {
            return Err(CutoutError::InvalidArgument(format!(
                "time range {}:{} is empty or reversed",
                start, stop
            )));
        }
    }
    Ok(())
}
