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


//! `intern-cutout`: download or upload a BossDB cutout from the command line.
//!
//! Voxels are read and written as raw little-endian files in C order
//! (z, y, x), or (t, z, y, x) when a time range is given.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use intern::codec;
use intern::remote::boss::colon_delim_str_to_extents;
use intern::resource::parse_bossdb_uri;
use intern::{
    AccessMode, BossRemote, BoundingBox, Config, CutoutManager, CutoutOptions, Datatype,
    Resource, Voxel,
};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_INTERN_LOGLEVEL: &str = "INTERN_LOGLEVEL";

#[derive(Parser)]
#[command(name = "intern-cutout", version, about = "Download and upload BossDB cutouts")]
struct Cli {
    /// JSON config file (defaults to ~/.intern/intern.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fetch or store blocks one at a time
    #[arg(long, global = true)]
    serial: bool,

    /// Worker pool size for chunked cutouts
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CutoutArgs {
    /// bossdb://collection/experiment/channel
    uri: String,

    #[arg(short, long, default_value_t = 0)]
    res: u8,

    /// start:stop
    #[arg(short = 'x', long = "xs")]
    xs: String,

    #[arg(short = 'y', long = "ys")]
    ys: String,

    #[arg(short = 'z', long = "zs")]
    zs: String,

    /// Optional time range, start:stop
    #[arg(short = 't', long = "ts")]
    ts: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Download a cutout to a raw file
    Get {
        #[command(flatten)]
        cutout: CutoutArgs,

        /// cache, no-cache or raw
        #[arg(long, default_value = "no-cache")]
        access_mode: String,

        /// Comma-separated ids to keep (annotation channels only)
        #[arg(long, value_delimiter = ',')]
        filter: Option<Vec<u64>>,

        /// Fetch the isotropic downsample
        #[arg(long)]
        iso: bool,

        #[arg(short, long)]
        out: PathBuf,
    },
    /// Upload a raw file as a cutout
    Put {
        #[command(flatten)]
        cutout: CutoutArgs,

        #[arg(short, long)]
        input: PathBuf,
    },
}

struct Target {
    resource: Resource,
    datatype: Datatype,
    res: u8,
    bounds: BoundingBox,
    options: CutoutOptions,
}

fn resolve_target(remote: &BossRemote, args: &CutoutArgs) -> Result<Target> {
    let (collection, experiment, channel) = parse_bossdb_uri(&args.uri)?;
    let channel = remote
        .get_channel(&collection, &experiment, &channel)
        .with_context(|| format!("looking up {}", args.uri))?;
    let bounds = BoundingBox::new(
        colon_delim_str_to_extents(&args.xs)?,
        colon_delim_str_to_extents(&args.ys)?,
        colon_delim_str_to_extents(&args.zs)?,
    )?;
    let mut options = CutoutOptions::default();
    if let Some(ts) = &args.ts {
        options = options.with_time_range(colon_delim_str_to_extents(ts)?);
    }
    Ok(Target {
        datatype: channel.datatype,
        resource: channel.into(),
        res: args.res,
        bounds,
        options,
    })
}

fn download<V: Voxel>(manager: &CutoutManager<BossRemote>, target: &Target, out: &Path) -> Result<()> {
    let volume = manager.get_cutout::<V>(
        &target.resource,
        target.res,
        &target.bounds,
        &target.options,
    )?;
    fs::write(out, codec::to_le_bytes(&volume.view()))
        .with_context(|| format!("writing {}", out.display()))?;
    log::info!("Wrote {:?} {} voxels to {}", volume.shape(), V::DATATYPE, out.display());
    Ok(())
}

fn upload<V: Voxel>(manager: &CutoutManager<BossRemote>, target: &Target, input: &Path) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let shape = target.bounds.array_shape(target.options.time_range);
    let data = codec::from_le_bytes::<V>(&bytes, &shape)?;
    manager.create_cutout(
        &target.resource,
        target.res,
        &target.bounds,
        data.view(),
        &target.options,
    )?;
    log::info!("Uploaded {} to {}", target.bounds, target.resource.name());
    Ok(())
}

macro_rules! with_voxel_type {
    ($datatype:expr, $func:ident, $($arg:expr),*) => {
        match $datatype {
            Datatype::Uint8 => $func::<u8>($($arg),*),
            Datatype::Uint16 => $func::<u16>($($arg),*),
            Datatype::Uint32 => $func::<u32>($($arg),*),
            Datatype::Uint64 => $func::<u64>($($arg),*),
            Datatype::Float32 => $func::<f32>($($arg),*),
            Datatype::Float64 => $func::<f64>($($arg),*),
        }
    };
}

fn main() -> Result<()> {
    env_logger::init_from_env(Env::new().filter_or(ENV_INTERN_LOGLEVEL, "info"));
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.serial {
        config.cutout.parallel = false;
    }
    if cli.workers.is_some() {
        config.cutout.workers = cli.workers;
    }
    log::debug!("Boss host: {}", config.remote.host);

    let remote = BossRemote::new(config.remote.clone())?;
    match cli.command {
        Command::Get {
            cutout,
            access_mode,
            filter,
            iso,
            out,
        } => {
            let mut target = resolve_target(&remote, &cutout)?;
            target.options = target
                .options
                .with_access_mode(access_mode.parse::<AccessMode>()?)
                .with_iso(iso);
            if let Some(ids) = filter {
                target.options = target.options.with_filter_ids(ids);
            }
            let manager = CutoutManager::new(remote, config.cutout)?;
            with_voxel_type!(target.datatype, download, &manager, &target, &out)
        }
        Command::Put { cutout, input } => {
            let target = resolve_target(&remote, &cutout)?;
            let manager = CutoutManager::new(remote, config.cutout)?;
            with_voxel_type!(target.datatype, upload, &manager, &target, &input)
        }
    }
}
