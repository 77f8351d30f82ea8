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


//! Per-block transport.
//!
//! A `VolumeTransport` reads or writes exactly one block against one
//! backend. Everything HTTP goes through the `Session` trait so that the
//! network can be swapped out in tests.

pub mod boss;
pub mod chunked;
pub mod dvid;

use crate::bounds::{Block, Extents, Vector3};
use crate::codec::Voxel;
use crate::config::RemoteConfig;
use crate::error::{CutoutError, Result};
use crate::resource::{AccessMode, ChannelResource};
use ndarray::{ArrayD, ArrayViewD};
use reqwest::Method;
use std::time::Duration;

/// Optional parts of a cutout request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CutoutOptions {
    /// `[start, stop)` time samples. Arrays gain a leading time axis.
    pub time_range: Option<Extents>,
    /// Read-side cache policy.
    pub access_mode: AccessMode,
    /// Only return voxels with these ids (annotation channels).
    pub filter_ids: Option<Vec<u64>>,
    /// Ask for the isotropic downsample at this resolution.
    pub iso: bool,
}

impl CutoutOptions {
    pub fn with_time_range(mut self, time_range: Extents) -> CutoutOptions {
        self.time_range = Some(time_range);
        self
    }

    pub fn with_access_mode(mut self, access_mode: AccessMode) -> CutoutOptions {
        self.access_mode = access_mode;
        self
    }

    pub fn with_filter_ids(mut self, ids: Vec<u64>) -> CutoutOptions {
        self.filter_ids = Some(ids);
        self
    }

    pub fn with_iso(mut self, iso: bool) -> CutoutOptions {
        self.iso = iso;
        self
    }

    /// The filter ids, if any. An empty list filters nothing.
    pub fn filter(&self) -> Option<&[u64]> {
        match &self.filter_ids {
            Some(ids) if !ids.is_empty() => Some(ids.as_slice()),
            _ => None,
        }
    }

    /// Number of time samples, if a time range was given.
    pub fn time_len(&self) -> Option<usize> {
        self.time_range.map(|(start, stop)| (stop - start) as usize)
    }
}

/// Everything a transport needs to address one cutout, minus the box.
#[derive(Copy, Clone, Debug)]
pub struct CutoutQuery<'a> {
    pub channel: &'a ChannelResource,
    pub resolution: u8,
    pub options: &'a CutoutOptions,
}

impl<'a> CutoutQuery<'a> {
    /// Array shape for `block` under this query's time range.
    pub fn block_shape(&self, block: &Block) -> Vec<usize> {
        block.bounds.array_shape(self.options.time_range)
    }
}

pub trait VolumeTransport: Sync {
    /// Fetch exactly the voxels inside `block.bounds`.
    fn fetch_block<V: Voxel>(&self, query: &CutoutQuery, block: &Block) -> Result<ArrayD<V>>;

    /// Write `data` to exactly `block.bounds`.
    fn store_block<V: Voxel>(
        &self,
        query: &CutoutQuery,
        block: &Block,
        data: ArrayViewD<V>,
    ) -> Result<()>;

    /// A corner of the backend's block grid. Block planning aligns interior
    /// block boundaries to this point.
    fn grid_origin(&self, _query: &CutoutQuery) -> Result<Vector3> {
        Ok(Vector3::default())
    }
}

/// Check that an array's rank agrees with the presence of a time range.
pub fn validate_dimensions(ndim: usize, time_range: Option<Extents>) -> Result<()> {
    match (time_range, ndim) {
        (Some(_), 4) | (None, 3) => Ok(()),
        (Some(_), n) => Err(CutoutError::InvalidArgument(format!(
            "a time range was given, so data must be 4D (t, z, y, x); got {}D",
            n
        ))),
        (None, n) => Err(CutoutError::InvalidArgument(format!(
            "no time range was given, so data must be 3D (z, y, x); got {}D",
            n
        ))),
    }
}

/// Check that an array is exactly the shape `block` calls for.
pub fn validate_block_data<V: Voxel>(
    query: &CutoutQuery,
    block: &Block,
    data: &ArrayViewD<V>,
) -> Result<()> {
    validate_dimensions(data.ndim(), query.options.time_range)?;
    let expected = query.block_shape(block);
    if data.shape() != expected.as_slice() {
        return Err(CutoutError::InvalidArgument(format!(
            "data shape {:?} does not match {} (expected {:?})",
            data.shape(),
            block,
            expected
        )));
    }
    Ok(())
}

/// A single outgoing HTTP request.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: vec![],
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> HttpRequest {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> HttpRequest {
        self.body = Some(body);
        self
    }

    /// Look up a header value by (case-insensitive) name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-2xx response into an `Http` error naming `resource`.
    pub fn error_for_status(self, resource: &str) -> Result<HttpResponse> {
        if self.is_success() {
            return Ok(self);
        }
        Err(CutoutError::Http {
            resource: resource.to_string(),
            status: self.status,
            body: self.text(),
        })
    }
}

/// Sends prepared requests. Implementations must be shareable across the
/// worker pool.
pub trait Session: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// A blocking reqwest client.
pub struct ReqwestSession {
    client: reqwest::blocking::Client,
}

impl ReqwestSession {
    pub fn new(config: &RemoteConfig) -> Result<ReqwestSession> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(ReqwestSession {
            client: builder.build()?,
        })
    }
}

impl Session for ReqwestSession {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        log::debug!("{} {}", request.method, request.url);
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
