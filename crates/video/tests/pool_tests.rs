use video::{
    BufferPool, BufferState, CaptureDevice, ErrorClass, VideoError,
    videoin::fake::{FakeDevice, FakeFailure, FakeOp},
};

#[test]
fn test_create_maps_every_buffer() {
    let mut device = FakeDevice::new(4096);
    let log = device.log();

    let pool = BufferPool::create(&mut device, 4).unwrap();

    assert_eq!(pool.len(), 4);
    for index in 0..4 {
        assert_eq!(pool.state(index), Some(BufferState::Idle));
        assert_eq!(pool.buffer_len(index), Some(4096));
    }
    assert_eq!(pool.state(4), None);
    assert_eq!(log.live_mappings(), 4);

    pool.destroy();
    assert_eq!(log.live_mappings(), 0);
    assert_eq!(log.count(|op| matches!(op, FakeOp::Unmap(_))), 4);
}

#[test]
fn test_insufficient_buffers_maps_nothing() {
    let mut device = FakeDevice::new(4096).with_granted_buffers(2);
    let log = device.log();

    let err = BufferPool::create(&mut device, 4).unwrap_err();

    match err {
        VideoError::InsufficientBuffers { requested, granted } => {
            assert_eq!((requested, granted), (4, 2));
        }
        other => panic!("Expected VideoError::InsufficientBuffers, got {:?}", other),
    }
    assert_eq!(log.count(|op| matches!(op, FakeOp::Map(_))), 0);
}

#[test]
fn test_extra_granted_buffers_are_not_mapped() {
    let mut device = FakeDevice::new(64).with_granted_buffers(6);
    let log = device.log();

    let pool = BufferPool::create(&mut device, 4).unwrap();

    assert_eq!(pool.len(), 4);
    assert_eq!(log.live_mappings(), 4);
}

#[test]
fn test_map_failure_unwinds_earlier_mappings() {
    let mut device = FakeDevice::new(4096).with_failure(FakeFailure::Map(2));
    let log = device.log();

    let err = BufferPool::create(&mut device, 4).unwrap_err();

    assert_eq!(err.class(), ErrorClass::Buffer);
    assert_eq!(log.live_mappings(), 0);
    let ops = log.ops();
    let failed_at = ops.iter().position(|op| *op == FakeOp::Map(2)).unwrap();
    assert_eq!(
        &ops[failed_at + 1..],
        &[FakeOp::Unmap(0), FakeOp::Unmap(1)]
    );
}

#[test]
fn test_query_failure_unwinds_earlier_mappings() {
    let mut device = FakeDevice::new(4096).with_failure(FakeFailure::QueryBuffer(3));
    let log = device.log();

    let err = BufferPool::create(&mut device, 4).unwrap_err();

    match err {
        VideoError::Ioctl { op, .. } => assert_eq!(op, "VIDIOC_QUERYBUF"),
        other => panic!("Expected VideoError::Ioctl, got {:?}", other),
    }
    assert_eq!(log.live_mappings(), 0);
    assert_eq!(log.count(|op| matches!(op, FakeOp::Unmap(_))), 3);
}

#[test]
fn test_submit_all_queues_in_index_order() {
    let mut device = FakeDevice::new(64);
    let mut pool = BufferPool::create(&mut device, 4).unwrap();

    pool.submit_all(&mut device).unwrap();

    assert_eq!(device.queued(), vec![0, 1, 2, 3]);
    for index in 0..4 {
        assert_eq!(pool.state(index), Some(BufferState::Queued));
    }
}

#[test]
fn test_submit_all_stops_at_first_failure() {
    let mut device = FakeDevice::new(64).with_failure(FakeFailure::Queue(2));
    let mut pool = BufferPool::create(&mut device, 4).unwrap();

    assert!(pool.submit_all(&mut device).is_err());

    assert_eq!(pool.state(0), Some(BufferState::Queued));
    assert_eq!(pool.state(1), Some(BufferState::Queued));
    assert_eq!(pool.state(2), Some(BufferState::Idle));
    assert_eq!(pool.state(3), Some(BufferState::Idle));
}

#[test]
fn test_queued_and_idle_buffers_cannot_be_read_or_requeued() {
    let mut device = FakeDevice::new(64);
    let log = device.log();
    let mut pool = BufferPool::create(&mut device, 2).unwrap();

    assert!(matches!(pool.read(0), Err(VideoError::InvalidBuffer { .. })));
    assert!(matches!(
        pool.requeue(&mut device, 0),
        Err(VideoError::InvalidBuffer { .. })
    ));
    assert_eq!(log.count(|op| matches!(op, FakeOp::Queue(_))), 0);

    pool.submit_all(&mut device).unwrap();
    assert!(matches!(pool.read(1), Err(VideoError::InvalidBuffer { .. })));
    assert!(matches!(pool.read(7), Err(VideoError::InvalidBuffer { .. })));
}

#[test]
fn test_dequeue_rejects_oversized_frame() {
    let mut device = FakeDevice::new(64).with_frame(vec![7; 65]);
    let mut pool = BufferPool::create(&mut device, 2).unwrap();
    pool.submit_all(&mut device).unwrap();
    device.start_streaming().unwrap();

    let err = pool.dequeue(&mut device).unwrap_err();

    assert!(matches!(err, VideoError::InvalidBuffer { index: 0, .. }));
    assert_eq!(pool.state(0), Some(BufferState::Queued));
    assert!(pool.read(0).is_err());
}

#[test]
fn test_dequeue_without_frames_leaves_pool_untouched() {
    let mut device = FakeDevice::new(64);
    let mut pool = BufferPool::create(&mut device, 2).unwrap();
    pool.submit_all(&mut device).unwrap();
    device.start_streaming().unwrap();

    assert!(matches!(pool.dequeue(&mut device), Err(VideoError::Ioctl { .. })));
    assert_eq!(pool.state(0), Some(BufferState::Queued));
    assert_eq!(pool.state(1), Some(BufferState::Queued));
}

#[test]
fn test_dequeue_read_requeue_cycle() {
    let mut device = FakeDevice::new(16)
        .with_frame(vec![10; 16])
        .with_frame(vec![11; 16])
        .with_frame(vec![12; 16]);
    let mut pool = BufferPool::create(&mut device, 2).unwrap();
    pool.submit_all(&mut device).unwrap();
    device.start_streaming().unwrap();

    let first = pool.dequeue(&mut device).unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(pool.state(0), Some(BufferState::Filled));
    assert_eq!(pool.read(0).unwrap(), &[10u8; 16][..]);
    pool.requeue(&mut device, 0).unwrap();
    assert_eq!(pool.state(0), Some(BufferState::Queued));
    assert_eq!(device.queued(), vec![1, 0]);

    let second = pool.dequeue(&mut device).unwrap();
    assert_eq!(second.index, 1);
    assert_eq!(pool.read(1).unwrap(), &[11u8; 16][..]);

    // a filled buffer cannot be requeued twice
    pool.requeue(&mut device, 1).unwrap();
    assert!(pool.requeue(&mut device, 1).is_err());
}

#[test]
fn test_filled_view_is_stable_while_device_runs() {
    let mut device = FakeDevice::new(16)
        .with_frame(vec![10; 16])
        .with_frame(vec![11; 16])
        .with_frame(vec![12; 16]);
    let log = device.log();
    let mut pool = BufferPool::create(&mut device, 2).unwrap();
    pool.submit_all(&mut device).unwrap();
    device.start_streaming().unwrap();
    pool.dequeue(&mut device).unwrap();
    pool.dequeue(&mut device).unwrap();

    // both buffers are filled: the device owns none, so it has nowhere to put
    // the next frame while the views are held
    let view = pool.read(0).unwrap();
    assert!(device.queued().is_empty());
    assert_eq!(
        device.wait_ready(std::time::Duration::from_millis(1)).unwrap(),
        video::WaitOutcome::Timeout
    );
    assert_eq!(view, &[10u8; 16][..]);
    let queues_before = log.count(|op| matches!(op, FakeOp::Queue(_)));

    pool.requeue(&mut device, 0).unwrap();
    let third = pool.dequeue(&mut device).unwrap();

    assert_eq!(third.index, 0);
    assert_eq!(pool.read(0).unwrap(), &[12u8; 16][..]);
    assert_eq!(pool.read(1).unwrap(), &[11u8; 16][..]);
    assert_eq!(log.count(|op| matches!(op, FakeOp::Queue(_))), queues_before + 1);
}

#[test]
fn test_query_buffer_reports_mmap_buffer_fields() {
    let mut device = FakeDevice::new(4096);
    device.request_buffers(2).unwrap();

    let info = device.query_buffer(1).unwrap();

    assert_eq!(info.index, 1);
    assert_eq!(info.length, 4096);
    assert_eq!(info.offset, 4096);
    assert_eq!(info.bytes_used, 0);
    assert_eq!(info.memory, 1);
    assert_eq!(info.timecode, video::Timecode::default());
}
