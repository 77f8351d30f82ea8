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


//! DVID remote.
//!
//! DVID serves uncompressed voxels from a versioned repository node:
//! `/api/node/<uuid>/<instance>/raw/0_1_2/<nx>_<ny>_<nz>/<x0>_<y0>_<z0>`.
//! The payload is a little-endian, C-ordered (z, y, x) buffer. The
//! channel's `collection` is taken as the node UUID and its `name` as the
//! data instance.

use super::{
    validate_block_data, CutoutQuery, HttpRequest, ReqwestSession, Session, VolumeTransport,
};
use crate::bounds::{Block, BoundingBox};
use crate::codec::{self, Voxel};
use crate::config::RemoteConfig;
use crate::error::{CutoutError, Result};
use ndarray::{ArrayD, ArrayViewD};
use reqwest::Method;

const OCTET_STREAM: &str = "application/octet-stream";

pub struct DvidRemote<S: Session = ReqwestSession> {
    protocol: String,
    host: String,
    session: S,
}

impl DvidRemote<ReqwestSession> {
    pub fn new(config: &RemoteConfig) -> Result<DvidRemote<ReqwestSession>> {
        Ok(DvidRemote::with_session(config, ReqwestSession::new(config)?))
    }
}

impl<S: Session> DvidRemote<S> {
    pub fn with_session(config: &RemoteConfig, session: S) -> DvidRemote<S> {
        DvidRemote {
            protocol: config.protocol.clone(),
            host: config.host.clone(),
            session,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// The raw-voxel URL for `bounds`. Downsampled scales go in `scale`.
    pub fn raw_url(&self, query: &CutoutQuery, bounds: &BoundingBox) -> String {
        let shape = bounds.shape();
        let start = bounds.start();
        let mut url = format!(
            "{}://{}/api/node/{}/{}/raw/0_1_2/{}_{}_{}/{}_{}_{}",
            self.protocol,
            self.host,
            query.channel.collection,
            query.channel.name,
            shape.x,
            shape.y,
            shape.z,
            start.x,
            start.y,
            start.z
        );
        if query.resolution > 0 {
            url.push_str(&format!("?scale={}", query.resolution));
        }
        url
    }

    fn check_query(query: &CutoutQuery) -> Result<()> {
        if query.options.time_range.is_some() {
            return Err(CutoutError::InvalidArgument(
                "DVID volumes have no time axis".to_string(),
            ));
        }
        if query.options.filter().is_some() {
            return Err(CutoutError::InvalidArgument(
                "DVID raw cutouts do not support filter ids".to_string(),
            ));
        }
        Ok(())
    }
}

impl<S: Session> VolumeTransport for DvidRemote<S> {
    fn fetch_block<V: Voxel>(&self, query: &CutoutQuery, block: &Block) -> Result<ArrayD<V>> {
        Self::check_query(query)?;
        codec::check_element_type::<V>(query.channel.datatype)?;

        let request = HttpRequest::new(Method::GET, self.raw_url(query, &block.bounds));
        let response = self
            .session
            .send(request)?
            .error_for_status(&query.channel.name)?;
        codec::from_le_bytes(&response.body, &query.block_shape(block))
    }

    fn store_block<V: Voxel>(
        &self,
        query: &CutoutQuery,
        block: &Block,
        data: ArrayViewD<V>,
    ) -> Result<()> {
        validate_block_data(query, block, &data)?;
        Self::check_query(query)?;
        codec::check_element_type::<V>(query.channel.datatype)?;

        let request = HttpRequest::new(Method::POST, self.raw_url(query, &block.bounds))
            .header("Content-Type", OCTET_STREAM)
            .body(codec::to_le_bytes(&data));
        self.session
            .send(request)?
            .error_for_status(&query.channel.name)?;
        Ok(())
    }
}
