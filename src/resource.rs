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


/// Resource descriptors.
///
/// These are the small immutable records the cutout code needs to address
/// data: which channel, what datatype, where it lives. Only channels hold
/// voxels; collections and experiments are containers.
use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voxel datatypes a channel can declare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl Datatype {
    pub fn bit_width(&self) -> usize {
        match self {
            Datatype::Uint8 => 8,
            Datatype::Uint16 => 16,
            Datatype::Uint32 | Datatype::Float32 => 32,
            Datatype::Uint64 | Datatype::Float64 => 64,
        }
    }

    /// Bytes per voxel.
    pub fn itemsize(&self) -> usize {
        self.bit_width() / 8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Uint8 => "uint8",
            Datatype::Uint16 => "uint16",
            Datatype::Uint32 => "uint32",
            Datatype::Uint64 => "uint64",
            Datatype::Float32 => "float32",
            Datatype::Float64 => "float64",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Datatype> {
        match s.to_lowercase().as_str() {
            "uint8" => Ok(Datatype::Uint8),
            "uint16" => Ok(Datatype::Uint16),
            "uint32" => Ok(Datatype::Uint32),
            "uint64" => Ok(Datatype::Uint64),
            "float32" => Ok(Datatype::Float32),
            "float64" => Ok(Datatype::Float64),
            _ => Err(CutoutError::InvalidArgument(format!(
                "unknown datatype {}",
                s
            ))),
        }
    }
}

/// Server-side cache policy for reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Serve from the cache when possible.
    Cache,
    /// Skip the cache but still check for dirty cuboids.
    NoCache,
    /// Go straight to the backing store.
    Raw,
}

impl AccessMode {
    /// Literal value sent in the `access-mode` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Cache => "cache",
            AccessMode::NoCache => "no-cache",
            AccessMode::Raw => "raw",
        }
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::NoCache
    }
}

impl FromStr for AccessMode {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<AccessMode> {
        match s {
            "cache" => Ok(AccessMode::Cache),
            "no-cache" => Ok(AccessMode::NoCache),
            "raw" => Ok(AccessMode::Raw),
            _ => Err(CutoutError::InvalidArgument(format!(
                "unknown access mode {}",
                s
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Image,
    Annotation,
}

impl Default for ChannelType {
    fn default() -> Self {
        ChannelType::Image
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectionResource {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentResource {
    pub name: String,
    pub collection: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelResource {
    /// A channel: the only resource that holds voxel data.
    ///
    /// For the DVID backend `collection` carries the repository node UUID
    /// and `name` the data instance; `experiment` is unused there.
    pub name: String,
    pub collection: String,
    pub experiment: String,
    pub datatype: Datatype,
    pub channel_type: ChannelType,
    pub base_resolution: u8,
    pub description: String,
    pub sources: Vec<String>,
}

impl ChannelResource {
    pub fn new(name: &str, collection: &str, experiment: &str, datatype: Datatype) -> ChannelResource {
        ChannelResource {
            name: name.to_string(),
            collection: collection.to_string(),
            experiment: experiment.to_string(),
            datatype,
            channel_type: ChannelType::default(),
            base_resolution: 0,
            description: String::new(),
            sources: vec![],
        }
    }

    /// Mark this channel as an annotation channel.
    pub fn annotation(mut self) -> ChannelResource {
        self.channel_type = ChannelType::Annotation;
        self
    }

    /// The `collection/experiment/channel` path fragment of cutout URLs.
    pub fn cutout_route(&self) -> String {
        format!("{}/{}/{}", self.collection, self.experiment, self.name)
    }
}

/// Any resource a caller might hand to the cutout layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Collection(CollectionResource),
    Experiment(ExperimentResource),
    Channel(ChannelResource),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Collection(c) => &c.name,
            Resource::Experiment(e) => &e.name,
            Resource::Channel(c) => &c.name,
        }
    }

    /// Only channels can be used for cutouts.
    pub fn valid_volume(&self) -> bool {
        matches!(self, Resource::Channel(_))
    }

    /// Borrow the channel, or fail with `IncompatibleResource`.
    pub fn as_channel(&self) -> Result<&ChannelResource> {
        match self {
            Resource::Channel(channel) => Ok(channel),
            other => Err(CutoutError::IncompatibleResource(other.name().to_string())),
        }
    }
}

impl From<ChannelResource> for Resource {
    fn from(channel: ChannelResource) -> Resource {
        Resource::Channel(channel)
    }
}

/// Split a `bossdb://collection/experiment/channel` URI into its parts.
pub fn parse_bossdb_uri(boss_uri: &str) -> Result<(String, String, String)> {
    let path = match boss_uri.split("://").collect::<Vec<&str>>().as_slice() {
        [_scheme, path] => path.to_string(),
        [path] => path.to_string(),
        _ => {
            return Err(CutoutError::InvalidArgument(format!(
                "malformed resource URI {}",
                boss_uri
            )))
        }
    };
    let col_exp_chan = path.trim_matches('/').split('/').collect::<Vec<&str>>();
    match col_exp_chan.as_slice() {
        [col, exp, chan] if !col.is_empty() && !exp.is_empty() && !chan.is_empty() => {
            Ok((col.to_string(), exp.to_string(), chan.to_string()))
        }
        _ => Err(CutoutError::InvalidArgument(format!(
            "expected collection/experiment/channel in {}",
            boss_uri
        ))),
    }
}
