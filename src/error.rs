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


//! Error types for cutout operations.

use crate::bounds::Block;
use crate::resource::Datatype;
use thiserror::Error;

/// Everything that can go wrong while fetching or storing a cutout.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// The resource is not something voxel data can be read from.
    #[error("resource {0} cannot be used for cutout operations")]
    IncompatibleResource(String),

    /// A caller bug: malformed ranges, wrong dimensionality, mismatched
    /// element type. Always raised before any network I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("request for {resource} failed with status {status}: {body}")]
    Http {
        resource: String,
        status: u16,
        body: String,
    },

    /// A single block of a chunked cutout failed.
    #[error("block {block} failed: {source}")]
    Block {
        block: Block,
        source: Box<CutoutError>,
    },

    #[error("datatype {0} is not supported by the blosc wire codec")]
    UnsupportedDatatype(Datatype),

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl CutoutError {
    /// Strip any block annotations and return the underlying error.
    pub fn root_cause(&self) -> &CutoutError {
        match self {
            CutoutError::Block { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Specialized Result type for cutout operations.
pub type Result<T> = std::result::Result<T, CutoutError>;
