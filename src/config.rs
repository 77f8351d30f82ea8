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


/// Configuration module.
///
/// Gets config values from environment variables and an optional JSON
/// config file. Values set as environment variables override like values in
/// the config file, which in turn override the defaults below. Nothing here
/// is global: callers build a `Config` and hand its pieces to the remotes
/// and the cutout manager.
use crate::bounds::Vector3;
use crate::error::{CutoutError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default root folder of the filesystem chunk store.
pub const CUBOID_ROOT_PATH: &str = "uploads";

const BOSSPROTOCOL_ENV_NAME: &str = "BOSSPROTOCOL";
const BOSSPROTOCOL_DEFAULT: &str = "https";

const BOSSHOST_ENV_NAME: &str = "BOSSHOST";
const BOSSHOST_DEFAULT: &str = "api.bossdb.io";

const BOSSTOKEN_ENV_NAME: &str = "BOSSTOKEN";
const BOSSTOKEN_DEFAULT: &str = "public";

const CONFIG_DIR: &str = ".intern";
const CONFIG_FILE: &str = "intern.json";

/// Default block size (X, Y, Z) for chunked cutouts.
pub const DEFAULT_BLOCK_SIZE: Vector3 = Vector3 {
    x: 512,
    y: 512,
    z: 16,
};

/// A cutout is split once it is this many times larger than one block.
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 1.2;

/// Where and how to reach a remote.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub protocol: String,
    pub host: String,
    pub token: String,
    /// Whole-request timeout handed to the HTTP session.
    pub timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            protocol: BOSSPROTOCOL_DEFAULT.to_string(),
            host: BOSSHOST_DEFAULT.to_string(),
            token: BOSSTOKEN_DEFAULT.to_string(),
            timeout_secs: None,
        }
    }
}

impl RemoteConfig {
    pub fn new(protocol: &str, host: &str, token: &str) -> RemoteConfig {
        RemoteConfig {
            protocol: protocol.to_string(),
            host: host.to_string(),
            token: token.to_string(),
            timeout_secs: None,
        }
    }

    /// Apply `BOSSPROTOCOL`, `BOSSHOST` and `BOSSTOKEN` if they are set.
    fn apply_env(&mut self) {
        if let Ok(val) = env::var(BOSSPROTOCOL_ENV_NAME) {
            self.protocol = val;
        }
        if let Ok(val) = env::var(BOSSHOST_ENV_NAME) {
            self.host = val;
        }
        if let Ok(val) = env::var(BOSSTOKEN_ENV_NAME) {
            self.token = val;
        }
    }
}

/// How large cutouts are split and dispatched.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
    pub block_size: Vector3,
    pub threshold_factor: f64,
    /// Fetch or store blocks on a worker pool instead of one at a time.
    pub parallel: bool,
    /// Worker pool size. `None` means one worker per available CPU.
    pub workers: Option<usize>,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        CutoutConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            threshold_factor: DEFAULT_THRESHOLD_FACTOR,
            parallel: true,
            workers: None,
        }
    }
}

impl CutoutConfig {
    /// Voxel count above which a request is split into blocks.
    pub fn chunk_threshold(&self) -> f64 {
        self.block_size.volume() as f64 * self.threshold_factor
    }

    /// The worker count to use, falling back to the CPU count.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            Some(_) => {
                log::warn!("Ignoring worker count of 0; using the CPU count");
                num_cpus()
            }
            None => num_cpus(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size.volume() == 0 {
            return Err(CutoutError::Configuration(format!(
                "block size {} must be positive on every axis",
                self.block_size
            )));
        }
        if !self.threshold_factor.is_finite() || self.threshold_factor <= 0.0 {
            return Err(CutoutError::Configuration(format!(
                "threshold factor must be positive, got {}",
                self.threshold_factor
            )));
        }
        Ok(())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Everything the client can be configured with.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cutout: CutoutConfig,
}

impl Config {
    /// Read a JSON config file. Missing keys keep their defaults; unknown
    /// keys are logged and ignored.
    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        for key in unknown_keys(&value) {
            log::warn!("Ignoring unknown config key {} in {}", key, path.display());
        }
        let config: Config = serde_json::from_value(value)?;
        config.cutout.validate()?;
        Ok(config)
    }

    /// Load `path` (or the default config file, if one exists), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(p) => Config::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => {
                    log::debug!("Reading config from {}", p.display());
                    Config::from_file(&p)?
                }
                _ => Config::default(),
            },
        };
        config.remote.apply_env();
        Ok(config)
    }
}

const CONFIG_SECTIONS: &[(&str, &[&str])] = &[
    ("remote", &["protocol", "host", "token", "timeout_secs"]),
    ("cutout", &["block_size", "threshold_factor", "parallel", "workers"]),
];

/// Dotted paths of every key in a config document that `Config` does not
/// read.
pub fn unknown_keys(value: &Value) -> Vec<String> {
    let mut unknown = vec![];
    let sections = match value.as_object() {
        Some(map) => map,
        None => return unknown,
    };
    for (name, section) in sections {
        let known = match CONFIG_SECTIONS.iter().find(|(section, _)| *section == name.as_str()) {
            Some((_, keys)) => keys,
            None => {
                unknown.push(name.clone());
                continue;
            }
        };
        if let Some(fields) = section.as_object() {
            for key in fields.keys() {
                if !known.contains(&key.as_str()) {
                    unknown.push(format!("{}.{}", name, key));
                }
            }
        }
    }
    unknown
}

/// `$HOME/.intern/intern.json`.
pub fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Get the absolute path of a chunk store root, creating it if needed.
pub fn get_cuboid_root_abs_path(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root)?;
    }
    Ok(fs::canonicalize(root)?)
}
