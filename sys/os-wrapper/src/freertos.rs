// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FreeRTOS backend.
//!
//! Binds the kernel's C entry points directly. Several of the names people
//! reach for (`xSemaphoreTake`, `xSemaphoreCreateMutex`, ...) are C macros
//! over the queue API, so it is the queue functions that appear here.
//!
//! Assumes a 32-bit port: `BaseType_t` is `long`, `TickType_t` is 32 bits
//! (`configUSE_16_BIT_TICKS == 0`) and `configSTACK_DEPTH_TYPE` is the
//! default `uint16_t`.

use core::ffi::{c_char, c_void};
use core::ptr::NonNull;

use crate::kernel::{
    KernelStatus, MutexKernel, SemaphoreKernel, ThreadEntry, ThreadKernel,
    TickKernel, Wait,
};

type BaseType = i32;
type UBaseType = u32;
type TickType = u32;
type StackDepth = u16;

const PORT_MAX_DELAY: TickType = 0xFFFF_FFFF;
const QUEUE_SEND_TO_BACK: BaseType = 0;
#[cfg(not(feature = "freertos-static-allocation"))]
const QUEUE_TYPE_MUTEX: u8 = 1;
/// `configMAX_TASK_NAME_LEN` in the stock `FreeRTOSConfig.h`.
const MAX_TASK_NAME_LEN: usize = 16;

/// A `TaskHandle_t` or `QueueHandle_t`. Never null; a null return from the
/// kernel becomes `None` at the FFI boundary.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawHandle(NonNull<c_void>);

// Safety: FreeRTOS handles are plain references to kernel objects, usable from
// any task. The kernel serializes access to the objects themselves.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

static_assertions::assert_eq_size!(RawHandle, Option<RawHandle>);
static_assertions::assert_eq_size!(RawHandle, *mut c_void);

extern "C" {
    fn xTaskCreate(
        code: ThreadEntry,
        name: *const c_char,
        stack_depth: StackDepth,
        parameters: *mut c_void,
        priority: UBaseType,
        created: *mut Option<RawHandle>,
    ) -> BaseType;
    fn xTaskGetCurrentTaskHandle() -> RawHandle;
    fn uxTaskPriorityGet(task: Option<RawHandle>) -> UBaseType;
    fn vTaskPrioritySet(task: Option<RawHandle>, priority: UBaseType);
    fn vTaskDelete(task: Option<RawHandle>);
    fn xTaskGetTickCount() -> TickType;

    fn xQueueCreateCountingSemaphore(
        max_count: UBaseType,
        initial_count: UBaseType,
    ) -> Option<RawHandle>;
    fn xQueueSemaphoreTake(queue: RawHandle, ticks: TickType) -> BaseType;
    fn xQueueGenericSend(
        queue: RawHandle,
        item: *const c_void,
        ticks: TickType,
        position: BaseType,
    ) -> BaseType;
    fn vQueueDelete(queue: RawHandle);
    #[cfg(not(feature = "freertos-static-allocation"))]
    fn xQueueCreateMutex(queue_type: u8) -> Option<RawHandle>;
}

fn ticks(wait: Wait) -> TickType {
    match wait {
        Wait::Forever => PORT_MAX_DELAY,
        Wait::Ticks(t) => t.min(PORT_MAX_DELAY - 1),
    }
}

/// Copies `name` into a NUL-terminated buffer, truncating to what the kernel
/// would keep anyway.
fn task_name(name: &str) -> [u8; MAX_TASK_NAME_LEN] {
    let mut buf = [0u8; MAX_TASK_NAME_LEN];
    let len = name.len().min(MAX_TASK_NAME_LEN - 1);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

/// The FreeRTOS kernel, as seen from a task.
#[derive(Copy, Clone, Debug)]
pub struct FreeRtos {
    tick_period_ms: u32,
}

impl FreeRtos {
    /// `tick_rate_hz` must match `configTICK_RATE_HZ`.
    pub const fn new(tick_rate_hz: u32) -> Self {
        let period = if tick_rate_hz == 0 || tick_rate_hz > 1000 {
            1
        } else {
            1000 / tick_rate_hz
        };
        Self {
            tick_period_ms: period,
        }
    }
}

impl ThreadKernel for FreeRtos {
    type Thread = RawHandle;

    fn task_create(
        &self,
        entry: ThreadEntry,
        name: &str,
        stack_size: u32,
        arg: usize,
        priority: u32,
    ) -> Option<RawHandle> {
        let depth = StackDepth::try_from(stack_size).ok()?;
        let name = task_name(name);
        let mut created = None;
        // Safety: the name buffer outlives the call, and the kernel copies it
        // into the TCB. `created` is a valid out-pointer of the right layout.
        let rc = unsafe {
            xTaskCreate(
                entry,
                name.as_ptr().cast(),
                depth,
                arg as *mut c_void,
                priority,
                &mut created,
            )
        };
        if KernelStatus::from_raw(rc).is_pass() {
            created
        } else {
            None
        }
    }

    fn current_task(&self) -> RawHandle {
        // Safety: no preconditions once the scheduler is running.
        unsafe { xTaskGetCurrentTaskHandle() }
    }

    fn task_priority(&self, task: RawHandle) -> u32 {
        // Safety: `task` came from this kernel.
        unsafe { uxTaskPriorityGet(Some(task)) }
    }

    fn set_task_priority(&self, task: RawHandle, priority: u32) {
        // Safety: `task` came from this kernel.
        unsafe { vTaskPrioritySet(Some(task), priority) }
    }

    fn exit_current(&self) -> ! {
        // Safety: a null handle names the calling task.
        unsafe { vTaskDelete(None) };
        // vTaskDelete(NULL) does not return to the deleted task.
        loop {
            core::hint::spin_loop();
        }
    }
}

impl SemaphoreKernel for FreeRtos {
    type Semaphore = RawHandle;

    fn semaphore_create(
        &self,
        max_count: u32,
        initial_count: u32,
    ) -> Option<RawHandle> {
        // Safety: counts were range-checked by the caller.
        unsafe { xQueueCreateCountingSemaphore(max_count, initial_count) }
    }

    fn semaphore_take(&self, sem: &RawHandle, wait: Wait) -> KernelStatus {
        // Safety: `sem` came from this kernel and has not been deleted.
        KernelStatus::from_raw(unsafe { xQueueSemaphoreTake(*sem, ticks(wait)) })
    }

    fn semaphore_give(&self, sem: &RawHandle) -> KernelStatus {
        // Safety: semaphores carry no payload, so a null item is what
        // xSemaphoreGive passes too.
        KernelStatus::from_raw(unsafe {
            xQueueGenericSend(*sem, core::ptr::null(), 0, QUEUE_SEND_TO_BACK)
        })
    }

    fn semaphore_delete(&self, sem: RawHandle) {
        // Safety: the handle is consumed; nobody can use it again through us.
        unsafe { vQueueDelete(sem) }
    }
}

impl MutexKernel for FreeRtos {
    type Mutex = RawHandle;

    #[cfg(not(feature = "freertos-static-allocation"))]
    fn mutex_create(&self) -> Option<RawHandle> {
        // Safety: no preconditions.
        unsafe { xQueueCreateMutex(QUEUE_TYPE_MUTEX) }
    }

    #[cfg(feature = "freertos-static-allocation")]
    fn mutex_create(&self) -> Option<RawHandle> {
        None
    }

    fn mutex_take(&self, mutex: &RawHandle, wait: Wait) -> KernelStatus {
        // Safety: `mutex` came from this kernel and has not been deleted.
        KernelStatus::from_raw(unsafe {
            xQueueSemaphoreTake(*mutex, ticks(wait))
        })
    }

    fn mutex_give(&self, mutex: &RawHandle) -> KernelStatus {
        // Safety: as for semaphore_give. The kernel itself rejects a give from
        // a task that does not hold the mutex.
        KernelStatus::from_raw(unsafe {
            xQueueGenericSend(*mutex, core::ptr::null(), 0, QUEUE_SEND_TO_BACK)
        })
    }

    fn mutex_delete(&self, mutex: RawHandle) {
        // Safety: the handle is consumed.
        unsafe { vQueueDelete(mutex) }
    }
}

impl TickKernel for FreeRtos {
    fn tick_period_ms(&self) -> u32 {
        self.tick_period_ms
    }

    fn tick_count(&self) -> u32 {
        // Safety: no preconditions.
        unsafe { xTaskGetTickCount() }
    }
}
