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


//! BossDB remote.
//!
//! Cutouts are addressed as
//! `/v1/cutout/<collection>/<experiment>/<channel>/<res>/<x>/<y>/<z>/[<t>/]`
//! and travel as blosc frames in both directions.

use super::{
    validate_block_data, CutoutQuery, HttpRequest, ReqwestSession, Session, VolumeTransport,
};
use crate::bounds::{Block, BoundingBox, Extents};
use crate::codec::{self, Voxel};
use crate::config::RemoteConfig;
use crate::error::{CutoutError, Result};
use crate::resource::{ChannelResource, ChannelType, Datatype};
use ndarray::{ArrayD, ArrayViewD};
use reqwest::Method;
use serde::Deserialize;

/// Media type of blosc-compressed cutouts.
pub const BLOSC_MEDIA_TYPE: &str = "application/blosc";

const API_VERSION: &str = "v1";

#[derive(Deserialize, Debug)]
struct ChannelMetadata {
    /// Metadata corresponding to a channel, as returned by the Boss at the
    /// channel-metadata endpoint.
    name: String,
    #[serde(default)]
    description: String,
    experiment: String,
    collection: String,
    #[serde(rename = "type", default = "default_channel_type")]
    channel_type: String,
    #[serde(default)]
    base_resolution: u8,
    datatype: String,
    #[serde(default)]
    sources: Vec<String>,
}

fn default_channel_type() -> String {
    "image".to_string()
}

pub struct BossRemote<S: Session = ReqwestSession> {
    config: RemoteConfig,
    session: S,
}

impl BossRemote<ReqwestSession> {
    /// A remote that talks to the host in `config` over reqwest.
    pub fn new(config: RemoteConfig) -> Result<BossRemote<ReqwestSession>> {
        let session = ReqwestSession::new(&config)?;
        Ok(BossRemote { config, session })
    }
}

impl<S: Session> BossRemote<S> {
    pub fn with_session(config: RemoteConfig, session: S) -> BossRemote<S> {
        BossRemote { config, session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn build_url(&self, suffix: &str) -> String {
        format!(
            "{}://{}/{}/{}",
            self.config.protocol, self.config.host, API_VERSION, suffix
        )
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.header("Authorization", &format!("Token {}", self.config.token))
    }

    /// The cutout URL for `bounds`.
    ///
    /// Reads carry the access mode; writes never do. Filter ids only make
    /// sense for reads as well.
    pub fn cutout_url(
        &self,
        query: &CutoutQuery,
        bounds: &BoundingBox,
        for_read: bool,
    ) -> String {
        let mut suffix = format!(
            "cutout/{}/{}/{}/",
            query.channel.cutout_route(),
            query.resolution,
            bounds
        );
        if let Some((t_start, t_stop)) = query.options.time_range {
            suffix.push_str(&format!("{}:{}/", t_start, t_stop));
        }

        let mut params: Vec<String> = vec![];
        if for_read {
            if let Some(ids) = query.options.filter() {
                let ids = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<String>>()
                    .join(",");
                params.push(format!("filter={}", ids));
            }
        }
        if query.options.iso {
            params.push("iso=true".to_string());
        }
        if for_read {
            params.push(format!("access-mode={}", query.options.access_mode.as_str()));
        }
        if !params.is_empty() {
            suffix.push('?');
            suffix.push_str(&params.join("&"));
        }
        self.build_url(&suffix)
    }

    /// Fetch a channel's metadata and turn it into a `ChannelResource`.
    pub fn get_channel(
        &self,
        collection: &str,
        experiment: &str,
        channel: &str,
    ) -> Result<ChannelResource> {
        let url = self.build_url(&format!(
            "collection/{}/experiment/{}/channel/{}/",
            collection, experiment, channel
        ));
        let request = self
            .authorized(HttpRequest::new(Method::GET, url))
            .header("Accept", "application/json");
        let response = self.session.send(request)?.error_for_status(channel)?;
        let metadata: ChannelMetadata = serde_json::from_slice(&response.body)?;

        let channel_type = match metadata.channel_type.as_str() {
            "annotation" => ChannelType::Annotation,
            _ => ChannelType::Image,
        };
        Ok(ChannelResource {
            name: metadata.name,
            collection: metadata.collection,
            experiment: metadata.experiment,
            datatype: metadata.datatype.parse::<Datatype>()?,
            channel_type,
            base_resolution: metadata.base_resolution,
            description: metadata.description,
            sources: metadata.sources,
        })
    }

    fn check_filter(query: &CutoutQuery) -> Result<()> {
        if query.options.filter().is_some() && query.channel.channel_type != ChannelType::Annotation {
            return Err(CutoutError::InvalidArgument(format!(
                "filter ids only apply to annotation channels; {} is an image channel",
                query.channel.name
            )));
        }
        Ok(())
    }
}

impl<S: Session> VolumeTransport for BossRemote<S> {
    fn fetch_block<V: Voxel>(&self, query: &CutoutQuery, block: &Block) -> Result<ArrayD<V>> {
        codec::check_element_type::<V>(query.channel.datatype)?;
        Self::check_filter(query)?;

        let url = self.cutout_url(query, &block.bounds, true);
        let request = self
            .authorized(HttpRequest::new(Method::GET, url))
            .header("Accept", BLOSC_MEDIA_TYPE);
        let response = self
            .session
            .send(request)?
            .error_for_status(&query.channel.name)?;

        codec::decode(&response.body, query.channel.datatype, &query.block_shape(block))
    }

    fn store_block<V: Voxel>(
        &self,
        query: &CutoutQuery,
        block: &Block,
        data: ArrayViewD<V>,
    ) -> Result<()> {
        validate_block_data(query, block, &data)?;
        let payload = codec::encode(&data, query.channel.datatype)?;

        let url = self.cutout_url(query, &block.bounds, false);
        let request = self
            .authorized(HttpRequest::new(Method::POST, url))
            .header("Content-Type", BLOSC_MEDIA_TYPE)
            .body(payload);
        self.session
            .send(request)?
            .error_for_status(&query.channel.name)?;
        Ok(())
    }
}

/// Parse `start:stop` into extents.
pub fn colon_delim_str_to_extents(string_value: &str) -> Result<Extents> {
    let parts: Vec<&str> = string_value.split(':').collect();
    let parse = |s: &str| {
        s.trim().parse::<u64>().map_err(|_| {
            CutoutError::InvalidArgument(format!("bad extents {}", string_value))
        })
    };
    match parts.as_slice() {
        [start, stop] => Ok((parse(*start)?, parse(*stop)?)),
        _ => Err(CutoutError::InvalidArgument(format!(
            "expected start:stop, got {}",
            string_value
        ))),
    }
}
