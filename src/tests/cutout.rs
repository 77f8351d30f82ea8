use super::{expected_volume, voxel_value, MockTransport};
use crate::bounds::{BoundingBox, Vector3};
use crate::config::CutoutConfig;
use crate::cutout::CutoutManager;
use crate::error::CutoutError;
use crate::planner::compute_blocks;
use crate::remote::CutoutOptions;
use crate::resource::{ChannelResource, CollectionResource, Datatype, Resource};
use ndarray::{ArrayD, IxDyn};

fn segmentation() -> Resource {
    ChannelResource::new("seg", "col", "exp", Datatype::Uint64).into()
}

/// 8x8x4 blocks, split as soon as a request is larger than one block.
fn small_blocks(parallel: bool) -> CutoutConfig {
    CutoutConfig {
        block_size: Vector3::new(8, 8, 4),
        threshold_factor: 1.0,
        parallel,
        workers: Some(3),
    }
}

#[test]
fn test_small_cutout_is_one_request() {
    let manager = CutoutManager::new(MockTransport::new(), CutoutConfig::default()).unwrap();
    let bounds = BoundingBox::new((0, 20), (0, 20), (0, 20)).unwrap();
    let data = manager
        .get_cutout::<u64>(&segmentation(), 0, &bounds, &CutoutOptions::default())
        .unwrap();
    assert_eq!(1, manager.transport().call_count());
    assert_eq!(vec![20, 20, 20], data.shape().to_vec());
    assert_eq!(expected_volume(&bounds, None), data);
}

#[test]
fn test_blocks_are_reassembled() {
    let bounds = BoundingBox::new((3, 30), (5, 22), (1, 11)).unwrap();
    let expected_blocks = compute_blocks(&bounds, Vector3::default(), Vector3::new(8, 8, 4))
        .unwrap()
        .len();
    for &parallel in &[false, true] {
        let manager = CutoutManager::new(MockTransport::new(), small_blocks(parallel)).unwrap();
        let data = manager
            .get_cutout::<u64>(&segmentation(), 0, &bounds, &CutoutOptions::default())
            .unwrap();
        assert_eq!(expected_volume(&bounds, None), data);
        assert_eq!(expected_blocks, manager.transport().call_count());
    }
}

#[test]
fn test_blocks_follow_transport_grid() {
    let mut transport = MockTransport::new();
    transport.origin = Vector3::new(3, 0, 0);
    let manager = CutoutManager::new(transport, small_blocks(false)).unwrap();
    let bounds = BoundingBox::new((0, 24), (0, 8), (0, 4)).unwrap();
    let data = manager
        .get_cutout::<u64>(&segmentation(), 0, &bounds, &CutoutOptions::default())
        .unwrap();
    assert_eq!(expected_volume(&bounds, None), data);

    let x_starts: Vec<u64> = manager
        .transport()
        .fetched
        .lock()
        .unwrap()
        .iter()
        .map(|block| block.bounds.x.0)
        .collect();
    assert_eq!(vec![0, 3, 11, 19], x_starts);
}

#[test]
fn test_time_series_cutout() {
    let manager = CutoutManager::new(MockTransport::new(), small_blocks(true)).unwrap();
    let bounds = BoundingBox::new((0, 10), (0, 10), (0, 10)).unwrap();
    let options = CutoutOptions::default().with_time_range((2, 4));
    let data = manager
        .get_cutout::<u64>(&segmentation(), 0, &bounds, &options)
        .unwrap();
    assert_eq!(vec![2, 10, 10, 10], data.shape().to_vec());
    assert_eq!(expected_volume(&bounds, Some((2, 4))), data);
    assert!(manager.transport().call_count() > 1);
}

#[test]
fn test_read_threshold_counts_time() {
    let manager = CutoutManager::new(MockTransport::new(), small_blocks(false)).unwrap();
    // 8x8x4 spatially, 10 time samples: over the threshold, but no axis
    // is longer than a block, so the plan is still one block.
    let bounds = BoundingBox::new((0, 8), (0, 8), (0, 4)).unwrap();
    let options = CutoutOptions::default().with_time_range((0, 10));
    let data = manager
        .get_cutout::<u64>(&segmentation(), 0, &bounds, &options)
        .unwrap();
    assert_eq!(expected_volume(&bounds, Some((0, 10))), data);
    assert_eq!(1, manager.transport().call_count());
}

#[test]
fn test_upload_is_split_spatially() {
    for &parallel in &[false, true] {
        let manager = CutoutManager::new(MockTransport::new(), small_blocks(parallel)).unwrap();
        let bounds = BoundingBox::new((1, 20), (2, 13), (0, 9)).unwrap();
        let data = expected_volume(&bounds, None);
        manager
            .create_cutout(&segmentation(), 0, &bounds, data.view(), &CutoutOptions::default())
            .unwrap();

        let stored = manager.transport().stored.lock().unwrap().clone();
        let expected = compute_blocks(&bounds, Vector3::default(), Vector3::new(8, 8, 4)).unwrap();
        assert_eq!(expected.len(), stored.len());
        let covered: u64 = stored.iter().map(|(b, _)| b.bounds.voxel_count()).sum();
        assert_eq!(bounds.voxel_count(), covered);
    }
}

#[test]
fn test_time_series_upload_keeps_full_time_range() {
    let manager = CutoutManager::new(MockTransport::new(), small_blocks(true)).unwrap();
    let bounds = BoundingBox::new((0, 16), (0, 8), (0, 4)).unwrap();
    let options = CutoutOptions::default().with_time_range((5, 8));
    let data = expected_volume(&bounds, Some((5, 8)));
    manager
        .create_cutout(&segmentation(), 0, &bounds, data.view(), &options)
        .unwrap();

    let stored = manager.transport().stored.lock().unwrap().clone();
    assert_eq!(2, stored.len());
    for (_, shape) in &stored {
        assert_eq!(&vec![3, 4, 8, 8], shape);
    }
}

#[test]
fn test_upload_threshold_ignores_time() {
    let manager = CutoutManager::new(MockTransport::new(), small_blocks(false)).unwrap();
    let bounds = BoundingBox::new((0, 8), (0, 8), (0, 4)).unwrap();
    let options = CutoutOptions::default().with_time_range((0, 50));
    let data = expected_volume(&bounds, Some((0, 50)));
    manager
        .create_cutout(&segmentation(), 0, &bounds, data.view(), &options)
        .unwrap();
    assert_eq!(1, manager.transport().call_count());
}

#[test]
fn test_incompatible_resource() {
    let manager = CutoutManager::new(MockTransport::new(), CutoutConfig::default()).unwrap();
    let collection = Resource::Collection(CollectionResource {
        name: "col".to_string(),
        description: String::new(),
    });
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();
    match manager.get_cutout::<u64>(&collection, 0, &bounds, &CutoutOptions::default()) {
        Err(CutoutError::IncompatibleResource(name)) => assert_eq!("col", name),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(0, manager.transport().call_count());
}

#[test]
fn test_element_type_mismatch() {
    let manager = CutoutManager::new(MockTransport::new(), CutoutConfig::default()).unwrap();
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();
    match manager.get_cutout::<u16>(&segmentation(), 0, &bounds, &CutoutOptions::default()) {
        Err(CutoutError::InvalidArgument(_)) => (),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(0, manager.transport().call_count());
}

#[test]
fn test_reversed_time_range() {
    let manager = CutoutManager::new(MockTransport::new(), CutoutConfig::default()).unwrap();
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();
    let options = CutoutOptions::default().with_time_range((3, 3));
    assert!(manager
        .get_cutout::<u64>(&segmentation(), 0, &bounds, &options)
        .is_err());
    assert_eq!(0, manager.transport().call_count());
}

#[test]
fn test_failed_block_is_reported() {
    for &parallel in &[false, true] {
        let transport = MockTransport::failing_at(Vector3::new(20, 10, 5));
        let manager = CutoutManager::new(transport, small_blocks(parallel)).unwrap();
        let bounds = BoundingBox::new((0, 32), (0, 16), (0, 8)).unwrap();
        match manager.get_cutout::<u64>(&segmentation(), 0, &bounds, &CutoutOptions::default()) {
            Err(err @ CutoutError::Block { .. }) => {
                if let CutoutError::Block { block, .. } = &err {
                    assert_eq!((16, 24), block.bounds.x);
                    assert_eq!((8, 16), block.bounds.y);
                    assert_eq!((4, 8), block.bounds.z);
                }
                match err.root_cause() {
                    CutoutError::Http { status, .. } => assert_eq!(500, *status),
                    other => panic!("unexpected root cause {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_upload_dimension_mismatch() {
    let manager = CutoutManager::new(MockTransport::new(), CutoutConfig::default()).unwrap();
    let bounds = BoundingBox::new((0, 4), (0, 4), (0, 4)).unwrap();

    let four_d = ArrayD::from_elem(IxDyn(&[1, 4, 4, 4]), 0u64);
    match manager.create_cutout(&segmentation(), 0, &bounds, four_d.view(), &CutoutOptions::default()) {
        Err(CutoutError::InvalidArgument(_)) => (),
        other => panic!("unexpected {:?}", other),
    }

    let three_d = ArrayD::from_elem(IxDyn(&[4, 4, 4]), 0u64);
    let options = CutoutOptions::default().with_time_range((0, 1));
    assert!(manager
        .create_cutout(&segmentation(), 0, &bounds, three_d.view(), &options)
        .is_err());
    assert_eq!(0, manager.transport().call_count());
}

#[test]
fn test_upload_shape_mismatch() {
    let manager = CutoutManager::new(MockTransport::new(), small_blocks(true)).unwrap();
    let bounds = BoundingBox::new((0, 40), (0, 40), (0, 8)).unwrap();
    let data = ArrayD::from_elem(IxDyn(&[8, 40, 39]), 0u64);
    match manager.create_cutout(&segmentation(), 0, &bounds, data.view(), &CutoutOptions::default()) {
        Err(CutoutError::InvalidArgument(_)) => (),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(0, manager.transport().call_count());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = CutoutConfig {
        block_size: Vector3::new(0, 8, 8),
        ..CutoutConfig::default()
    };
    assert!(CutoutManager::new(MockTransport::new(), config).is_err());
}

#[test]
fn test_large_cutout_assembles_to_full_shape() {
    let config = CutoutConfig {
        parallel: false,
        ..CutoutConfig::default()
    };
    let manager = CutoutManager::new(MockTransport::new(), config).unwrap();
    let images: Resource = ChannelResource::new("em", "col", "exp", Datatype::Uint8).into();
    let bounds = BoundingBox::new((0, 2048), (0, 2048), (0, 32)).unwrap();
    let data = manager
        .get_cutout::<u8>(&images, 0, &bounds, &CutoutOptions::default())
        .unwrap();

    assert_eq!(vec![32, 2048, 2048], data.shape().to_vec());
    assert_eq!(32, manager.transport().call_count());
    for &(x, y, z) in &[(0, 0, 0), (511, 512, 15), (1024, 7, 16), (2047, 2047, 31)] {
        assert_eq!(
            voxel_value(x, y, z, 0) as u8,
            data[[z as usize, y as usize, x as usize]]
        );
    }
}
