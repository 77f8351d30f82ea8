use super::MockSession;
use crate::bounds::{Block, BoundingBox, Vector3};
use crate::codec;
use crate::config::{CutoutConfig, CUBOID_ROOT_PATH};
use crate::cutout::CutoutManager;
use crate::error::CutoutError;
use crate::remote::chunked::{ChunkedRemote, FileSystemStore, HttpStore, ObjectStore, VolumeInfo};
use crate::remote::{CutoutOptions, CutoutQuery, HttpResponse, VolumeTransport};
use crate::resource::{ChannelResource, Datatype, Resource};
use ndarray::{ArrayD, IxDyn};
use reqwest::Method;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn channel() -> ChannelResource {
    ChannelResource::new("img", "col", "exp", Datatype::Uint16)
}

/// A 70x64x10 volume in 32x32x4 chunks.
fn volume(dir: &TempDir) -> ChunkedRemote<FileSystemStore> {
    let remote = ChunkedRemote::new(FileSystemStore::new(dir.path()).unwrap());
    let info = VolumeInfo::new(
        Datatype::Uint16,
        Vector3::new(70, 64, 10),
        Vector3::new(32, 32, 4),
    );
    remote.create_volume(&channel(), info).unwrap();
    remote
}

fn gradient(bounds: &BoundingBox) -> ArrayD<u16> {
    let mut values = vec![];
    for z in bounds.z.0..bounds.z.1 {
        for y in bounds.y.0..bounds.y.1 {
            for x in bounds.x.0..bounds.x.1 {
                values.push((z * 4480 + y * 70 + x) as u16);
            }
        }
    }
    ArrayD::from_shape_vec(IxDyn(&bounds.array_shape(None)), values).unwrap()
}

#[test]
fn test_write_then_read_across_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };

    let bounds = BoundingBox::new((10, 60), (20, 40), (2, 9)).unwrap();
    let data = gradient(&bounds);
    remote
        .store_block(&query, &Block::whole(bounds), data.view())
        .unwrap();
    assert_eq!(data, remote.fetch_block::<u16>(&query, &Block::whole(bounds)).unwrap());

    let inner = BoundingBox::new((30, 35), (25, 30), (7, 9)).unwrap();
    assert_eq!(
        gradient(&inner),
        remote.fetch_block::<u16>(&query, &Block::whole(inner)).unwrap()
    );
}

#[test]
fn test_unwritten_chunks_read_as_zeros() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    let bounds = BoundingBox::new((0, 40), (0, 40), (0, 10)).unwrap();
    let data = remote.fetch_block::<u16>(&query, &Block::whole(bounds)).unwrap();
    assert_eq!(vec![10, 40, 40], data.shape().to_vec());
    assert!(data.iter().all(|&v| v == 0));
}

#[test]
fn test_partial_write_keeps_neighbours() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };

    let chunk = BoundingBox::new((0, 32), (0, 32), (0, 4)).unwrap();
    remote
        .store_block(&query, &Block::whole(chunk), gradient(&chunk).view())
        .unwrap();
    let corner = BoundingBox::new((0, 4), (0, 4), (0, 2)).unwrap();
    let ones = ArrayD::from_elem(IxDyn(&[2, 4, 4]), 1u16);
    remote
        .store_block(&query, &Block::whole(corner), ones.view())
        .unwrap();

    let data = remote.fetch_block::<u16>(&query, &Block::whole(chunk)).unwrap();
    assert_eq!(1, data[[0, 0, 0]]);
    assert_eq!(1, data[[1, 3, 3]]);
    assert_eq!(gradient(&chunk)[[1, 3, 4]], data[[1, 3, 4]]);
    assert_eq!(gradient(&chunk)[[3, 31, 31]], data[[3, 31, 31]]);
}

#[test]
fn test_edge_chunks_are_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    let edge = BoundingBox::new((64, 70), (32, 64), (8, 10)).unwrap();
    remote
        .store_block(&query, &Block::whole(edge), gradient(&edge).view())
        .unwrap();
    assert!(remote
        .store()
        .get("col/exp/img/0/64-70_32-64_8-10")
        .unwrap()
        .is_some());
    assert!(dir.path().join("col/exp/img/info").exists());
}

#[test]
fn test_out_of_volume_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    let outside = BoundingBox::new((60, 80), (0, 10), (0, 1)).unwrap();
    match remote.fetch_block::<u16>(&query, &Block::whole(outside)) {
        Err(CutoutError::InvalidArgument(_)) => (),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_typesize_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let remote = volume(&dir);
    let bytes = vec![0u8; 32 * 32 * 4];
    remote
        .store()
        .put("col/exp/img/0/0-32_0-32_0-4", &codec::compress(&bytes, 1))
        .unwrap();

    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();
    match remote.fetch_block::<u16>(&query, &Block::whole(bounds)) {
        Err(CutoutError::CorruptPayload(_)) => (),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_manifest_is_incompatible() {
    let dir = tempfile::tempdir().unwrap();
    let remote = ChunkedRemote::new(FileSystemStore::new(dir.path()).unwrap());
    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();
    match remote.fetch_block::<u16>(&query, &Block::whole(bounds)) {
        Err(CutoutError::IncompatibleResource(_)) => (),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_manifest_is_read_back_from_store() {
    let dir = tempfile::tempdir().unwrap();
    volume(&dir);
    let reopened = ChunkedRemote::new(FileSystemStore::new(dir.path()).unwrap());
    let info = reopened.volume_info(&channel()).unwrap();
    assert_eq!(Datatype::Uint16, info.data_type);
    assert_eq!(Vector3::new(32, 32, 4), info.scale(0).unwrap().chunk_size());
    assert!(info.scale(1).is_err());
}

#[test]
fn test_grid_origin_is_voxel_offset() {
    let dir = tempfile::tempdir().unwrap();
    let remote = ChunkedRemote::new(FileSystemStore::new(dir.path()).unwrap());
    let mut info = VolumeInfo::new(Datatype::Uint16, Vector3::new(64, 64, 16), Vector3::new(16, 16, 4));
    info.scales[0].voxel_offset = [5, 6, 7];
    remote.create_volume(&channel(), info).unwrap();

    let channel = channel();
    let options = CutoutOptions::default();
    let query = CutoutQuery {
        channel: &channel,
        resolution: 0,
        options: &options,
    };
    assert_eq!(Vector3::new(5, 6, 7), remote.grid_origin(&query).unwrap());
}

#[test]
fn test_http_store_maps_404_to_none() {
    let store = HttpStore::new(
        "https://bucket.example.org/data/",
        MockSession::new(|request| {
            if request.url.ends_with("missing") {
                HttpResponse {
                    status: 404,
                    body: vec![],
                }
            } else {
                HttpResponse {
                    status: 200,
                    body: b"abc".to_vec(),
                }
            }
        }),
    );
    assert_eq!(None, store.get("missing").unwrap());
    assert_eq!(Some(b"abc".to_vec()), store.get("/present").unwrap());
    store.put("x/y", b"123").unwrap();
}

#[test]
fn test_cutout_manager_over_chunked_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = CutoutConfig {
        block_size: Vector3::new(16, 16, 4),
        threshold_factor: 1.0,
        parallel: true,
        workers: Some(4),
    };
    let manager = CutoutManager::new(volume(&dir), config).unwrap();
    let resource: Resource = channel().into();
    let options = CutoutOptions::default();

    let bounds = BoundingBox::new((5, 67), (3, 50), (1, 10)).unwrap();
    let data = gradient(&bounds);
    manager
        .create_cutout(&resource, 0, &bounds, data.view(), &options)
        .unwrap();
    let read = manager
        .get_cutout::<u16>(&resource, 0, &bounds, &options)
        .unwrap();
    assert_eq!(data, read);
}

#[test]
fn test_http_store_requests() {
    let store = HttpStore::new(
        "https://bucket.example.org/data/",
        MockSession::replying(200, vec![]),
    );
    store.put("col/exp/img/info", b"{}").unwrap();
    let calls = store.session().calls();
    assert_eq!(Method::PUT, calls[0].method);
    assert_eq!("https://bucket.example.org/data/col/exp/img/info", calls[0].url);
    assert_eq!(Some(b"{}".to_vec()), calls[0].body);

    let failing = HttpStore::new(
        "https://bucket.example.org",
        MockSession::replying(500, b"oops".to_vec()),
    );
    match failing.get("info") {
        Err(CutoutError::Http { status: 500, .. }) => (),
        other => panic!("unexpected {:?}", other),
    }
    assert!(failing.put("info", b"{}").is_err());
}

#[test]
fn test_filesystem_store_roots() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSystemStore::new(&dir.path().join("cuboids")).unwrap();
    assert!(store.root().is_absolute());
    assert!(store.root().ends_with("cuboids"));
    store.put("/a/b", b"xyz").unwrap();
    assert_eq!(Some(b"xyz".to_vec()), store.get("a/b").unwrap());
    assert!(store.root().join("a").join("b").is_file());

    let existed = Path::new(CUBOID_ROOT_PATH).exists();
    let default = FileSystemStore::default_root().unwrap();
    assert!(default.root().ends_with(CUBOID_ROOT_PATH));
    if !existed {
        fs::remove_dir(default.root()).unwrap();
    }
}
