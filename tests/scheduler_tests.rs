//! End-to-end scheduler scenarios against the dummy backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use frameflow::batch::BatchOutcome;
use frameflow::scheduler::SubmitMode;
use frameflow::{
    CommandBatch, DummyDevice, GraphicsError, QueueType, RenderPassState, RenderScheduler,
    SchedulerDesc,
};

fn scheduler_with(device: Arc<DummyDevice>) -> RenderScheduler {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderScheduler::new(device, SchedulerDesc::default()).unwrap()
}

fn record_and_submit(scheduler: &RenderScheduler, batch: &Arc<CommandBatch>, mode: SubmitMode) {
    let slot = batch.acquire_slot().unwrap();
    let recorder = scheduler.record(batch).unwrap();
    let cmd = recorder.finish().unwrap();
    batch.set_commands(slot, cmd);
    scheduler.submit(batch, mode).unwrap();
}

#[test]
fn concurrent_submission_preserves_queue_order() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = Arc::new(scheduler_with(device.clone()));
    scheduler.begin_frame().unwrap();

    const WORKERS: u32 = 8;
    let batches: Vec<_> = (0..WORKERS)
        .map(|i| {
            scheduler
                .begin_cmd_batch(QueueType::Graphics, i, &format!("pass{}", i))
                .unwrap()
        })
        .collect();

    // Every worker records its own batch and requests an immediate flush;
    // the driver must still see ascending submit indices.
    let handles: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || {
                record_and_submit(&scheduler, &batch, SubmitMode::Immediately);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    scheduler.end_frame().unwrap();

    let names: Vec<_> = device
        .submissions()
        .iter()
        .map(|s| s.debug_name.clone())
        .collect();
    let expected: Vec<_> = (0..WORKERS).map(|i| format!("pass{}", i)).collect();
    assert_eq!(names, expected);

    device.complete_all();
}

#[test]
fn pipelined_frames_recycle_batches() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = scheduler_with(device.clone());
    let completed = Arc::new(AtomicUsize::new(0));

    const FRAMES: usize = 16;
    const BATCHES_PER_FRAME: u32 = 4;

    for _ in 0..FRAMES {
        assert!(scheduler.wait_next_frame(Duration::from_secs(1)));
        scheduler.begin_frame().unwrap();

        for i in 0..BATCHES_PER_FRAME {
            let batch = scheduler
                .begin_cmd_batch(QueueType::Graphics, i, "frame work")
                .unwrap();
            let counter = Arc::clone(&completed);
            batch.on_complete(move |outcome| {
                assert_eq!(outcome, BatchOutcome::Completed);
                counter.fetch_add(1, Ordering::SeqCst);
            });
            record_and_submit(&scheduler, &batch, SubmitMode::Deferred);
        }

        scheduler.end_frame().unwrap();
        // Let the previous frame's work drain so the ring keeps moving.
        device.complete_submissions(BATCHES_PER_FRAME as usize);
    }

    device.complete_all();
    assert!(scheduler.wait_all(Duration::from_secs(1)));
    assert_eq!(
        completed.load(Ordering::SeqCst),
        FRAMES * BATCHES_PER_FRAME as usize
    );
}

#[rstest]
#[case::fence(false)]
#[case::timeline(true)]
fn dependency_wires_semaphores(#[case] timeline: bool) {
    let device = Arc::new(if timeline {
        DummyDevice::with_timeline()
    } else {
        DummyDevice::new()
    });
    let scheduler = scheduler_with(device.clone());
    scheduler.begin_frame().unwrap();

    let producer = scheduler
        .begin_cmd_batch(QueueType::AsyncCompute, 0, "producer")
        .unwrap();
    let consumer = scheduler
        .begin_cmd_batch(QueueType::Graphics, 0, "consumer")
        .unwrap();
    consumer.add_input_dependency(&producer).unwrap();

    record_and_submit(&scheduler, &producer, SubmitMode::Deferred);
    record_and_submit(&scheduler, &consumer, SubmitMode::Deferred);
    drop((producer, consumer));
    scheduler.end_frame().unwrap();

    let log = device.submissions();
    assert_eq!(log.len(), 2);
    let producer_record = log.iter().find(|s| s.debug_name == "producer").unwrap();
    let consumer_record = log.iter().find(|s| s.debug_name == "consumer").unwrap();
    assert_eq!(consumer_record.wait_count, 1);
    // The timeline producer signals its own semaphore; the fence-path
    // producer signals the spliced binary semaphore instead.
    assert_eq!(producer_record.signal_count, 1);

    device.complete_all();
}

#[test]
fn dependency_on_submitted_batch_fails_on_fence_path() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = scheduler_with(device.clone());
    scheduler.begin_frame().unwrap();

    let producer = scheduler
        .begin_cmd_batch(QueueType::Graphics, 0, "early")
        .unwrap();
    record_and_submit(&scheduler, &producer, SubmitMode::Force);

    let consumer = scheduler
        .begin_cmd_batch(QueueType::Graphics, 1, "late")
        .unwrap();
    // Too late to splice a signal into the producer's submission.
    let err = consumer.add_input_dependency(&producer).unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidState(_)));

    record_and_submit(&scheduler, &consumer, SubmitMode::Deferred);
    drop((producer, consumer));
    scheduler.end_frame().unwrap();
    device.complete_all();
}

#[test]
fn draw_batch_gathers_in_index_order() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = Arc::new(scheduler_with(device.clone()));
    scheduler.begin_frame().unwrap();

    let state = RenderPassState {
        pass_id: 7,
        subpass: 0,
    };
    let draw = scheduler.begin_draw_batch(state, "opaque pass").unwrap();

    const DRAWS: usize = 6;
    let handles: Vec<_> = (0..DRAWS)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let draw = Arc::clone(&draw);
            std::thread::spawn(move || {
                let index = draw.alloc_draw_index().unwrap();
                let recorder = scheduler.record_draws(&draw).unwrap();
                let cmd = recorder.finish().unwrap();
                draw.set_commands(index, cmd);
                index
            })
        })
        .collect();
    let mut indices: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..DRAWS).collect::<Vec<_>>());

    // A cancelled draw leaves a gap that gathering skips over; its index
    // still counts, since indices are never reassigned.
    let cancelled = draw.alloc_draw_index().unwrap();
    draw.cancel(cancelled);
    assert_eq!(draw.draw_count(), DRAWS + 1);

    let batch = scheduler
        .begin_cmd_batch(QueueType::Graphics, 0, "scene")
        .unwrap();
    let slot = batch.acquire_slot().unwrap();
    let mut recorder = scheduler.record(&batch).unwrap();
    recorder.execute_secondaries(&draw.cmd_buffers()).unwrap();
    let cmd = recorder.finish().unwrap();
    batch.set_commands(slot, cmd);
    scheduler.submit(&batch, SubmitMode::Force).unwrap();
    drop((draw, batch));

    assert_eq!(device.submission_count(), 1);
    scheduler.end_frame().unwrap();
    device.complete_all();
}

#[test]
fn failed_submission_cancels_hooks() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = scheduler_with(device.clone());
    scheduler.begin_frame().unwrap();

    let batch = scheduler
        .begin_cmd_batch(QueueType::Graphics, 0, "doomed")
        .unwrap();
    let outcomes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    batch.on_submit(move |outcome| sink.lock().push(outcome));
    let sink = Arc::clone(&outcomes);
    batch.on_complete(move |outcome| sink.lock().push(outcome));

    device.fail_next_submit();
    let slot = batch.acquire_slot().unwrap();
    let recorder = scheduler.record(&batch).unwrap();
    let cmd = recorder.finish().unwrap();
    batch.set_commands(slot, cmd);
    let err = scheduler.submit(&batch, SubmitMode::Force).unwrap_err();
    assert!(matches!(err, GraphicsError::SubmissionFailed(_)));

    assert_eq!(
        *outcomes.lock(),
        vec![BatchOutcome::Cancelled, BatchOutcome::Cancelled]
    );
    drop(batch);

    // The frame still closes; the failed index was consumed.
    let _ = scheduler.end_frame();
}

#[test]
fn skip_and_submit_mix_across_queues() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = scheduler_with(device.clone());
    scheduler.begin_frame().unwrap();

    // Graphics skips indices 0 and 2, submits 1 and 3.
    scheduler
        .skip_submit_indices(QueueType::Graphics, 0b0101)
        .unwrap();
    for i in [1u32, 3] {
        let batch = scheduler
            .begin_cmd_batch(QueueType::Graphics, i, &format!("gfx{}", i))
            .unwrap();
        record_and_submit(&scheduler, &batch, SubmitMode::Deferred);
    }
    // Transfer runs a single upload.
    let upload = scheduler
        .begin_cmd_batch(QueueType::AsyncTransfer, 0, "upload")
        .unwrap();
    record_and_submit(&scheduler, &upload, SubmitMode::Deferred);
    drop(upload);

    scheduler.end_frame().unwrap();

    let names: Vec<_> = device
        .submissions()
        .iter()
        .filter(|s| s.queue == QueueType::Graphics)
        .map(|s| s.debug_name.clone())
        .collect();
    assert_eq!(names, vec!["gfx1", "gfx3"]);
    assert_eq!(device.submission_count(), 3);
    device.complete_all();
}

#[test]
fn wait_on_batch_blocks_until_device_completion() {
    let device = Arc::new(DummyDevice::new());
    let scheduler = scheduler_with(device.clone());
    scheduler.begin_frame().unwrap();

    let batch = scheduler
        .begin_cmd_batch(QueueType::Graphics, 0, "timed")
        .unwrap();
    record_and_submit(&scheduler, &batch, SubmitMode::Force);

    assert!(!batch.wait(Duration::from_millis(10)).unwrap());

    let waiter = {
        let batch = Arc::clone(&batch);
        std::thread::spawn(move || batch.wait(Duration::from_secs(2)).unwrap())
    };
    std::thread::sleep(Duration::from_millis(20));
    device.complete_all();
    assert!(waiter.join().unwrap());

    drop(batch);
    scheduler.end_frame().unwrap();
}
