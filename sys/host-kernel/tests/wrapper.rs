// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The OS wrapper driven through the hosted kernel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use host_kernel::{HostKernel, HostKernelConfig};
use os_wrapper::{OsWrapper, OsWrapperError, Timeout, WAIT_FOREVER};

const JOIN: Duration = Duration::from_secs(5);

fn make_uut() -> OsWrapper<HostKernel> {
    OsWrapper::new(HostKernel::default())
}

#[test]
fn thread_reports_and_changes_its_own_priority() {
    static SEEN: AtomicU32 = AtomicU32::new(0);
    extern "C-unwind" fn entry(arg: usize) {
        // Safety: the wrapper outlives the thread; the test waits for it.
        let os = unsafe { &*(arg as *const OsWrapper<HostKernel>) };
        let me = os.thread_get_handle();
        let before = os.thread_get_priority(&me).unwrap_or(0);
        os.thread_set_priority(&me, before + 1).unwrap();
        SEEN.store(os.thread_get_priority(&me).unwrap_or(0), Ordering::SeqCst);
        os.thread_exit();
    }

    let os = make_uut();
    let t = os
        .thread_new("prio", 512, entry, &os as *const _ as usize, 5)
        .unwrap();
    assert!(os.kernel().wait_for_threads(JOIN));
    assert_eq!(SEEN.load(Ordering::SeqCst), 6);
    // The thread is gone; its handle is still a value, just a stale one.
    let _ = t.native();
}

#[test]
fn thread_creation_fails_when_pool_is_full() {
    extern "C-unwind" fn entry(_: usize) {}
    let os = OsWrapper::new(HostKernel::new(HostKernelConfig {
        max_threads: Some(0),
        ..Default::default()
    }));
    assert!(os.thread_new("none", 512, entry, 0, 1).is_none());
}

#[test]
fn semaphore_acquire_waits_for_release() {
    let os = make_uut();
    let s = os.semaphore_create(1, 0, "handoff").unwrap();

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            os.semaphore_acquire(&s, Timeout::from(WAIT_FOREVER))
        });
        thread::sleep(Duration::from_millis(10));
        os.semaphore_release(&s).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(()));
    });
    os.semaphore_delete(s).unwrap();
}

#[test]
fn semaphore_timeout_is_honored() {
    let os = OsWrapper::new(HostKernel::new(HostKernelConfig {
        tick_period_ms: 5,
        ..Default::default()
    }));
    let s = os.semaphore_create(3, 0, "empty").unwrap();

    let start = Instant::now();
    assert_eq!(
        os.semaphore_acquire(&s, Timeout::Millis(40)),
        Err(OsWrapperError::Error)
    );
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn mutex_cannot_be_released_by_another_thread() {
    let os = make_uut();
    let m = os.mutex_create();
    assert_eq!(os.mutex_acquire(m.as_ref(), Timeout::Forever), Ok(()));

    thread::scope(|scope| {
        let other = scope.spawn(|| os.mutex_release(m.as_ref()));
        assert_eq!(other.join().unwrap(), Err(OsWrapperError::Error));
    });

    assert_eq!(os.mutex_release(m.as_ref()), Ok(()));
    if let Some(m) = m {
        os.mutex_delete(m).unwrap();
    }
}

#[test]
fn mutex_contention_times_out() {
    let os = make_uut();
    let m = os.mutex_create().unwrap();
    os.mutex_acquire(Some(&m), Timeout::Forever).unwrap();

    thread::scope(|scope| {
        let other =
            scope.spawn(|| os.mutex_acquire(Some(&m), Timeout::Millis(20)));
        assert_eq!(other.join().unwrap(), Err(OsWrapperError::Error));
    });
}

#[test]
fn disabled_dynamic_allocation_gives_a_null_mutex() {
    let os = OsWrapper::new(HostKernel::new(HostKernelConfig {
        dynamic_allocation: false,
        ..Default::default()
    }));
    let m = os.mutex_create();
    assert!(m.is_none());
    assert_eq!(
        os.mutex_acquire(m.as_ref(), Timeout::Forever),
        Err(OsWrapperError::Error)
    );
    assert_eq!(os.mutex_release(m.as_ref()), Err(OsWrapperError::Error));
}

#[test]
fn tick_advances() {
    let os = make_uut();
    let before = os.get_tick();
    thread::sleep(Duration::from_millis(15));
    assert!(os.get_tick().wrapping_sub(before) >= 10);
}
