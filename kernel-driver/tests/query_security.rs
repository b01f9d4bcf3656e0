// tests/query_security.rs

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use shared::{
    constants::{IRP_MJ_QUERY_SECURITY, IRP_MJ_READ, IRP_MJ_SET_SECURITY, SECURITY_DESCRIPTOR_MIN_LEN},
    security::DescriptorBuilder,
    EventContext, NtStatus, ResponseMessage, SecurityInformation,
};
use umfs_driver::{
    consts::GLOBAL_DEVICE_NAME, Ccb, DeviceExtension, DeviceObject, Driver, DriverConfig,
    EventReceiver, FileObject, Irp, IrpWatcher, Parameters, UserBuffer,
};

const WAIT: Duration = Duration::from_secs(5);

fn driver(config: DriverConfig) -> (Driver, EventReceiver) {
    Driver::new(config)
}

fn query(name: &str, info: SecurityInformation, length: u32, buffer: Option<UserBuffer>) -> (Irp, IrpWatcher) {
    let (irp, watcher) = Irp::new(IRP_MJ_QUERY_SECURITY);
    let mut irp = irp
        .with_process_id(4242)
        .with_file_object(FileObject::opened(Ccb::new(name, 0xC0FFEE)))
        .with_parameters(Parameters::QuerySecurity { security_information: info, length });
    if let Some(buffer) = buffer {
        irp = irp.with_user_buffer(buffer);
    }
    (irp, watcher)
}

fn next_event(rx: &EventReceiver) -> EventContext {
    let frame = rx.try_recv().expect("an event frame was queued");
    EventContext::decode(&frame).expect("frame decodes")
}

#[test]
fn missing_file_context_is_rejected_before_anything_is_queued() {
    let (driver, rx) = driver(DriverConfig::default());

    let (irp, watcher) = Irp::new(IRP_MJ_QUERY_SECURITY);
    let irp = irp.with_parameters(Parameters::QuerySecurity {
        security_information: SecurityInformation::OWNER,
        length: 64,
    });
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InvalidParameter);

    let (irp, watcher2) = Irp::new(IRP_MJ_QUERY_SECURITY);
    let irp = irp.with_file_object(FileObject { file_name: "x".into(), fs_context2: None });
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InvalidParameter);

    for w in [&watcher, &watcher2] {
        assert_eq!(w.status().unwrap().status, NtStatus::InvalidParameter);
        assert_eq!(w.completions(), 1);
        assert_eq!(w.serial_number(), None);
    }
    assert_eq!(driver.pending_count(), 0);
    assert!(rx.try_recv().is_none());
}

#[test]
fn only_the_volume_device_accepts_queries() {
    let (driver, rx) = driver(DriverConfig::default());
    let global = DeviceObject::new(GLOBAL_DEVICE_NAME, DeviceExtension::Global);

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 0, None);
    assert_eq!(driver.dispatch(&global, irp), NtStatus::InvalidParameter);
    assert_eq!(watcher.completions(), 1);

    let (irp, _w) = query(r"\a.txt", SecurityInformation::OWNER, 0, None);
    assert_eq!(driver.dispatch(driver.disk_device(), irp), NtStatus::InvalidParameter);

    assert_eq!(driver.pending_count(), 0);
    assert!(rx.try_recv().is_none());
}

#[test]
fn mapping_failure_completes_with_insufficient_resources() {
    let (driver, rx) = driver(DriverConfig { max_locked_bytes: 0, ..DriverConfig::default() });

    let buffer = UserBuffer::filled(0xEE, 128);
    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 128, Some(buffer.clone()));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InsufficientResources);

    assert_eq!(watcher.status().unwrap().information, 0);
    assert_eq!(driver.locked_buffers(), (0, 0));
    assert_eq!(driver.pending_count(), 0);
    assert!(rx.try_recv().is_none());
    assert!(buffer.snapshot().iter().all(|b| *b == 0xEE));
}

#[test]
fn oversized_event_completes_with_insufficient_resources() {
    let (driver, rx) = driver(DriverConfig { max_event_size: 48, ..DriverConfig::default() });

    let (irp, watcher) = query(r"\a\rather\long\name.txt", SecurityInformation::OWNER, 64, Some(UserBuffer::new(64)));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InsufficientResources);
    assert_eq!(watcher.completions(), 1);
    assert_eq!(driver.locked_buffers(), (0, 0));
    assert!(rx.try_recv().is_none());
}

#[test]
fn full_queue_rolls_the_request_back() {
    let (driver, rx) = driver(DriverConfig { event_queue_capacity: 1, ..DriverConfig::default() });

    let (first, w1) = query(r"\one", SecurityInformation::OWNER, 32, Some(UserBuffer::new(32)));
    let (second, w2) = query(r"\two", SecurityInformation::OWNER, 32, Some(UserBuffer::new(32)));
    assert_eq!(driver.dispatch(driver.volume_device(), first), NtStatus::Pending);
    assert_eq!(driver.dispatch(driver.volume_device(), second), NtStatus::InsufficientResources);

    assert_eq!(w1.status(), None);
    assert_eq!(w2.status().unwrap().status, NtStatus::InsufficientResources);
    assert_eq!(driver.pending_count(), 1);
    assert_eq!(driver.locked_buffers(), (32, 1));

    let ev = next_event(&rx);
    assert_eq!(ev.file_name_lossy(), r"\one");
    assert!(rx.try_recv().is_none());
}

#[test]
fn closed_queue_rolls_the_request_back() {
    let (driver, rx) = driver(DriverConfig::default());
    drop(rx);

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::DACL, 64, Some(UserBuffer::new(64)));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InsufficientResources);
    assert_eq!(watcher.completions(), 1);
    assert_eq!(driver.pending_count(), 0);
    assert_eq!(driver.locked_buffers(), (0, 0));
}

#[test]
fn immediate_mode_answers_with_a_minimal_descriptor() {
    let (driver, rx) = driver(DriverConfig { immediate_security: true, ..DriverConfig::default() });

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 0, None);
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::BufferOverflow);
    let block = watcher.status().unwrap();
    assert_eq!(block.information, SECURITY_DESCRIPTOR_MIN_LEN as u64);

    let buffer = UserBuffer::filled(0xEE, 64);
    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 64, Some(buffer.clone()));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Success);
    assert_eq!(watcher.status().unwrap().information, SECURITY_DESCRIPTOR_MIN_LEN as u64);

    let out = buffer.snapshot();
    assert_eq!(&out[..SECURITY_DESCRIPTOR_MIN_LEN], &DescriptorBuilder::minimal()[..]);
    assert!(out[SECURITY_DESCRIPTOR_MIN_LEN..].iter().all(|b| *b == 0xEE));

    assert!(rx.try_recv().is_none());
    assert_eq!(driver.pending_count(), 0);
}

#[test]
fn forwarded_query_is_filled_from_the_response() {
    let (driver, rx) = driver(DriverConfig::default());

    let info = SecurityInformation::OWNER | SecurityInformation::DACL;
    let buffer = UserBuffer::filled(0xEE, 128);
    let (irp, watcher) = query(r"\dir\abc", info, 128, Some(buffer.clone()));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Pending);
    assert_eq!(watcher.status(), None);
    assert_eq!(driver.locked_buffers(), (128, 1));

    let ev = next_event(&rx);
    assert_eq!(ev.major_function, IRP_MJ_QUERY_SECURITY);
    assert_eq!(ev.process_id, 4242);
    assert_eq!(ev.context, 0xC0FFEE);
    assert_eq!(ev.security_information, info);
    assert_eq!(ev.buffer_length, 128);
    assert_eq!(ev.file_name_lossy(), r"\dir\abc");
    assert_eq!(watcher.serial_number(), Some(ev.serial_number));

    let descriptor: Vec<u8> = (0..40).collect();
    let response = ResponseMessage::success(ev.serial_number, descriptor.clone()).unwrap();
    assert_eq!(driver.complete_event(&response.encode()), Ok(true));

    let block = watcher.wait(WAIT).unwrap();
    assert_eq!(block.status, NtStatus::Success);
    assert_eq!(block.information, 40);
    let out = buffer.snapshot();
    assert_eq!(&out[..40], &descriptor[..]);
    assert!(out[40..].iter().all(|b| *b == 0xEE));

    assert_eq!(driver.pending_count(), 0);
    assert_eq!(driver.locked_buffers(), (0, 0));
}

#[test]
fn overflow_reports_the_required_size_and_leaves_the_buffer_alone() {
    let (driver, rx) = driver(DriverConfig::default());

    let buffer = UserBuffer::filled(0xEE, 16);
    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 16, Some(buffer.clone()));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Pending);
    let ev = next_event(&rx);

    let response = ResponseMessage::overflow(ev.serial_number, 300);
    assert_eq!(driver.complete_event(&response.encode()), Ok(true));

    let block = watcher.wait(WAIT).unwrap();
    assert_eq!(block.status, NtStatus::BufferOverflow);
    assert_eq!(block.information, 300);
    assert!(buffer.snapshot().iter().all(|b| *b == 0xEE));
    assert_eq!(driver.locked_buffers(), (0, 0));
}

#[test]
fn zero_length_query_is_forwarded_without_a_mapping() {
    let (driver, rx) = driver(DriverConfig::default());

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::GROUP, 0, None);
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Pending);
    assert_eq!(driver.locked_buffers(), (0, 0));

    let ev = next_event(&rx);
    assert_eq!(ev.buffer_length, 0);
    driver.complete(ResponseMessage::overflow(ev.serial_number, 20));

    let block = watcher.wait(WAIT).unwrap();
    assert_eq!(block.status, NtStatus::BufferOverflow);
    assert_eq!(block.information, 20);
}

#[test]
fn service_error_status_becomes_invalid_parameter() {
    let (driver, rx) = driver(DriverConfig::default());

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 64, Some(UserBuffer::new(64)));
    driver.dispatch(driver.volume_device(), irp);
    let ev = next_event(&rx);

    assert!(driver.complete(ResponseMessage::error(ev.serial_number, NtStatus::AccessDenied)));
    let block = watcher.wait(WAIT).unwrap();
    assert_eq!(block.status, NtStatus::InvalidParameter);
    assert_eq!(block.information, 0);
}

#[test]
fn late_response_after_cancel_is_ignored() {
    let (driver, rx) = driver(DriverConfig::default());

    let buffer = UserBuffer::filled(0xEE, 64);
    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 64, Some(buffer.clone()));
    driver.dispatch(driver.volume_device(), irp);
    let ev = next_event(&rx);

    assert!(driver.cancel(ev.serial_number));
    assert!(!driver.cancel(ev.serial_number));
    assert_eq!(watcher.status().unwrap().status, NtStatus::Cancelled);

    let late = ResponseMessage::success(ev.serial_number, vec![1; 20]).unwrap();
    assert_eq!(driver.complete_event(&late.encode()), Ok(false));

    assert_eq!(watcher.completions(), 1);
    assert_eq!(watcher.status().unwrap().status, NtStatus::Cancelled);
    assert!(buffer.snapshot().iter().all(|b| *b == 0xEE));
    assert_eq!(driver.locked_buffers(), (0, 0));
}

#[test]
fn response_for_an_unknown_serial_is_a_no_op() {
    let (driver, _rx) = driver(DriverConfig::default());
    assert!(!driver.complete(ResponseMessage::overflow(999, 20)));
}

#[test]
fn malformed_response_leaves_the_request_pending() {
    let (driver, rx) = driver(DriverConfig::default());

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 64, Some(UserBuffer::new(64)));
    driver.dispatch(driver.volume_device(), irp);
    let ev = next_event(&rx);

    let mut frame = ResponseMessage::success(ev.serial_number, vec![0; 20]).unwrap().encode();
    frame.truncate(frame.len() - 4);
    assert!(driver.complete_event(&frame).is_err());
    assert_eq!(driver.pending_count(), 1);
    assert_eq!(watcher.status(), None);

    driver.shutdown();
    assert_eq!(watcher.status().unwrap().status, NtStatus::Cancelled);
}

#[test]
fn expired_requests_are_released() {
    let (driver, rx) = driver(DriverConfig {
        pending_timeout: Duration::from_secs(1),
        ..DriverConfig::default()
    });

    let (irp, watcher) = query(r"\a.txt", SecurityInformation::OWNER, 64, Some(UserBuffer::new(64)));
    driver.dispatch(driver.volume_device(), irp);
    let ev = next_event(&rx);

    assert_eq!(driver.release_timeout_pending(Instant::now()), 0);
    assert_eq!(driver.release_timeout_pending(Instant::now() + Duration::from_secs(2)), 1);

    let block = watcher.status().unwrap();
    assert_eq!(block.status, NtStatus::InsufficientResources);
    assert_eq!(driver.locked_buffers(), (0, 0));

    assert_eq!(driver.complete_event(&ResponseMessage::overflow(ev.serial_number, 20).encode()), Ok(false));
    assert_eq!(watcher.completions(), 1);
}

#[test]
fn shutdown_cancels_everything_and_closes_the_queue() {
    let (driver, rx) = driver(DriverConfig::default());

    let watchers: Vec<IrpWatcher> = (0..3)
        .map(|i| {
            let (irp, w) = query(&format!(r"\f{i}"), SecurityInformation::OWNER, 32, Some(UserBuffer::new(32)));
            assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Pending);
            w
        })
        .collect();

    assert_eq!(driver.shutdown(), 3);
    for w in &watchers {
        assert_eq!(w.status().unwrap().status, NtStatus::Cancelled);
        assert_eq!(w.completions(), 1);
    }
    assert_eq!(driver.locked_buffers(), (0, 0));

    for _ in 0..3 {
        assert!(rx.recv().is_some());
    }
    assert!(rx.recv().is_none());

    let (irp, w) = query(r"\late", SecurityInformation::OWNER, 32, Some(UserBuffer::new(32)));
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InsufficientResources);
    assert_eq!(w.completions(), 1);
}

#[test]
fn serial_numbers_start_at_one_and_increase() {
    let (driver, rx) = driver(DriverConfig::default());

    let mut serials = Vec::new();
    for _ in 0..3 {
        let (irp, _w) = query(r"\a.txt", SecurityInformation::OWNER, 0, None);
        driver.dispatch(driver.volume_device(), irp);
        serials.push(next_event(&rx).serial_number);
    }
    assert_eq!(serials, vec![1, 2, 3]);
    driver.shutdown();
}

#[test]
fn set_security_is_accepted_synchronously() {
    let (driver, rx) = driver(DriverConfig::default());

    let (irp, watcher) = Irp::new(IRP_MJ_SET_SECURITY);
    let irp = irp
        .with_file_object(FileObject::opened(Ccb::new(r"\a.txt", 1)))
        .with_parameters(Parameters::SetSecurity {
            security_information: SecurityInformation::DACL,
            descriptor: DescriptorBuilder::minimal(),
        });
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Success);
    assert_eq!(watcher.completions(), 1);

    let (irp, watcher) = Irp::new(IRP_MJ_SET_SECURITY);
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::InvalidParameter);
    assert_eq!(watcher.completions(), 1);

    assert!(rx.try_recv().is_none());
}

#[test]
fn unhandled_major_function_is_not_implemented() {
    let (driver, _rx) = driver(DriverConfig::default());
    let (irp, watcher) = Irp::new(IRP_MJ_READ);
    assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::NotImplemented);
    assert_eq!(watcher.status().unwrap().status, NtStatus::NotImplemented);
}

#[test]
fn concurrent_requests_each_complete_exactly_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let (driver, rx) = driver(DriverConfig::default());
    let driver = Arc::new(driver);

    thread::scope(|s| {
        // Service: answer every event with a descriptor sized to its buffer.
        let service = {
            let driver = Arc::clone(&driver);
            s.spawn(move || {
                let mut answered = 0usize;
                while let Some(frame) = rx.recv() {
                    let ev = EventContext::decode(&frame).unwrap();
                    let len = ev.buffer_length.min(24) as usize;
                    let response = ResponseMessage::success(ev.serial_number, vec![0xAB; len]).unwrap();
                    driver.complete_event(&response.encode()).unwrap();
                    answered += 1;
                }
                answered
            })
        };

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let driver = Arc::clone(&driver);
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        let buffer = UserBuffer::new(32);
                        let (irp, watcher) = query(&format!(r"\t{t}\f{i}"), SecurityInformation::OWNER, 32, Some(buffer.clone()));
                        assert_eq!(driver.dispatch(driver.volume_device(), irp), NtStatus::Pending);

                        let block = watcher.wait(WAIT).expect("request completed");
                        assert_eq!(block.status, NtStatus::Success);
                        assert_eq!(block.information, 24);
                        assert_eq!(watcher.completions(), 1);
                        assert_eq!(&buffer.snapshot()[..24], &[0xAB; 24][..]);
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(driver.shutdown(), 0);
        assert_eq!(service.join().unwrap(), THREADS * PER_THREAD);
    });

    assert_eq!(driver.pending_count(), 0);
    assert_eq!(driver.locked_buffers(), (0, 0));
}
