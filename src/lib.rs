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


//! Cutout access to volumetric neuroscience data stores.
//!
//! The `CutoutManager` reads and writes arbitrarily large cutouts through a
//! `VolumeTransport`: BossDB (`BossRemote`), DVID (`DvidRemote`), or a
//! chunked object store on disk or behind HTTP (`ChunkedRemote`). Large
//! requests are split into blocks aligned to the backend's grid and the
//! pieces are reassembled in memory.
//!
//! ```rust,ignore
//! use intern::{BossRemote, BoundingBox, CutoutManager, CutoutOptions, Config};
//!
//! let config = Config::load(None)?;
//! let remote = BossRemote::new(config.remote.clone())?;
//! let channel = remote.get_channel("kasthuri2015", "em", "images")?;
//! let manager = CutoutManager::new(remote, config.cutout)?;
//! let bounds = BoundingBox::new((10000, 10512), (10000, 10512), (500, 516))?;
//! let volume = manager.get_cutout::<u8>(&channel.into(), 0, &bounds, &CutoutOptions::default())?;
//! ```

pub mod bounds;
pub mod codec;
pub mod config;
pub mod cutout;
pub mod error;
pub mod planner;
pub mod remote;
pub mod resource;


pub use bounds::{Block, BoundingBox, Extents, Vector3};
pub use codec::Voxel;
pub use config::{Config, CutoutConfig, RemoteConfig};
pub use cutout::CutoutManager;
pub use error::{CutoutError, Result};
pub use remote::boss::BossRemote;
pub use remote::chunked::{ChunkedRemote, FileSystemStore, HttpStore, ObjectStore, VolumeInfo};
pub use remote::dvid::DvidRemote;
pub use remote::{CutoutOptions, CutoutQuery, ReqwestSession, Session, VolumeTransport};
pub use resource::{AccessMode, ChannelResource, ChannelType, Datatype, Resource};
