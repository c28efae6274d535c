// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Per-device benchmark worker
//!
//! Each discovered device gets one [`DeviceWorker`] that owns the device's
//! scratch buffers and a dedicated thread. The thread is started lazily on
//! the first request, parks on a condition variable while idle, and runs
//! one benchmark pass per dequeued request.
//!
//! Requests are sequence tickets. `request_run` bumps the requested
//! sequence and returns at once, so any number of requests posted before
//! the thread dequeues collapse into a single run carrying the tag of the
//! most recent one. `wait_for_run` takes a ticket the same way and blocks
//! until a run that started at or after that ticket has completed.
//!
//! ```text
//! Idle -> Preparing -> Ready <-> Running
//!                   \-> Failed
//! (any) -> Terminating
//! ```

use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::backend::AcceleratorBackend;
use crate::bench::{BenchmarkConfig, BenchmarkRunner};
use crate::device::{BenchmarkResults, DeviceDescriptor};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No thread, no buffers
    Idle,
    /// Thread started, buffers being allocated
    Preparing,
    /// Buffers allocated, waiting for requests
    Ready,
    /// Benchmark sequence executing
    Running,
    /// Buffer allocation failed; runs publish "not measured" results
    Failed,
    /// Shutdown requested
    Terminating,
}

/// "Benchmark completed for device `index`"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkEvent {
    pub index: usize,
}

#[derive(Debug)]
struct Control {
    state: WorkerState,
    /// Highest ticket handed out
    requested: u64,
    /// Ticket covered by the run currently executing (or last executed)
    started: u64,
    /// Ticket covered by the last finished run
    completed: u64,
    /// Notification tag of the pending request
    tag: Option<usize>,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    /// Worker side: new request or shutdown
    wake: Condvar,
    /// Waiter side: run completed or worker gone
    progress: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Launch {
    events: Option<Sender<BenchmarkEvent>>,
    handle: Option<JoinHandle<()>>,
}

/// Handle to one device's benchmark thread.
pub struct DeviceWorker {
    device: Arc<DeviceDescriptor>,
    backend: Arc<dyn AcceleratorBackend>,
    config: BenchmarkConfig,
    shared: Arc<Shared>,
    launch: Mutex<Launch>,
}

impl DeviceWorker {
    pub fn new(
        device: Arc<DeviceDescriptor>,
        backend: Arc<dyn AcceleratorBackend>,
        config: BenchmarkConfig,
        events: Sender<BenchmarkEvent>,
    ) -> Self {
        Self {
            device,
            backend,
            config,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: WorkerState::Idle,
                    requested: 0,
                    started: 0,
                    completed: 0,
                    tag: None,
                    shutdown: false,
                }),
                wake: Condvar::new(),
                progress: Condvar::new(),
            }),
            launch: Mutex::new(Launch {
                events: Some(events),
                handle: None,
            }),
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    /// Post a run request and return immediately.
    ///
    /// Coalesces with any request the thread has not dequeued yet; the
    /// completion event carries `index`.
    pub fn request_run(&self, index: usize) {
        if self.post(index).is_some() {
            self.ensure_started();
        }
    }

    /// Post a run request and block until a run covering it has finished.
    ///
    /// Returns at once after shutdown.
    pub fn wait_for_run(&self, index: usize) {
        let Some(ticket) = self.post(index) else {
            return;
        };
        self.ensure_started();

        let mut control = self.shared.lock();
        while control.completed < ticket && !control.shutdown {
            control = self
                .shared
                .progress
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn post(&self, index: usize) -> Option<u64> {
        let mut control = self.shared.lock();
        if control.shutdown {
            return None;
        }
        control.requested += 1;
        control.tag = Some(index);
        let ticket = control.requested;
        drop(control);
        self.shared.wake.notify_one();
        Some(ticket)
    }

    fn ensure_started(&self) {
        let mut launch = self.launch.lock().unwrap_or_else(PoisonError::into_inner);
        if launch.handle.is_some() {
            return;
        }
        let Some(events) = launch.events.take() else {
            return;
        };

        self.shared.lock().state = WorkerState::Preparing;
        let context = RunContext {
            shared: Arc::clone(&self.shared),
            device: Arc::clone(&self.device),
            runner: BenchmarkRunner::new(Arc::clone(&self.backend), self.config.clone()),
            backend: Arc::clone(&self.backend),
            events,
        };
        let spawned = thread::Builder::new()
            .name(format!("gprobe-device-{}", self.device.index()))
            .spawn(move || context.run_loop());

        match spawned {
            Ok(handle) => launch.handle = Some(handle),
            Err(e) => {
                log::error!(
                    "Cannot start benchmark thread for {}: {}",
                    self.device.name(),
                    e
                );
                let mut control = self.shared.lock();
                // No thread will ever service this worker
                control.state = WorkerState::Failed;
                control.completed = control.requested;
                control.shutdown = true;
                drop(control);
                self.shared.progress.notify_all();
            }
        }
    }

    /// Stop the thread after any in-flight run and release the buffers.
    ///
    /// Requests not yet started are dropped. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut control = self.shared.lock();
            control.shutdown = true;
            control.state = WorkerState::Terminating;
        }
        self.shared.wake.notify_all();
        self.shared.progress.notify_all();

        let handle = self
            .launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Benchmark thread for {} panicked", self.device.name());
            }
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything the worker thread owns.
struct RunContext {
    shared: Arc<Shared>,
    device: Arc<DeviceDescriptor>,
    runner: BenchmarkRunner,
    backend: Arc<dyn AcceleratorBackend>,
    events: Sender<BenchmarkEvent>,
}

impl RunContext {
    fn run_loop(self) {
        let raw = self.device.backend_index();
        log::debug!("Benchmark thread for device {} started", self.device.index());

        let prepared = match self
            .backend
            .prepare_device(raw, &self.runner.config().buffer_plan())
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot prepare {}: {}", self.device.name(), e);
                false
            }
        };
        let idle_state = if prepared {
            WorkerState::Ready
        } else {
            WorkerState::Failed
        };
        {
            let mut control = self.shared.lock();
            if !control.shutdown {
                control.state = idle_state;
            }
        }

        loop {
            let mut control = self.shared.lock();
            while !control.shutdown && control.requested == control.started {
                control = self
                    .shared
                    .wake
                    .wait(control)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if control.shutdown {
                break;
            }
            let ticket = control.requested;
            let tag = control.tag.take();
            control.started = ticket;
            if prepared {
                control.state = WorkerState::Running;
            }
            drop(control);

            let heavy = self.device.heavy_mode();
            let mut results = if prepared {
                self.runner.run(&self.device, heavy)
            } else {
                BenchmarkResults {
                    heavy,
                    ..Default::default()
                }
            };
            results.run = self.device.results().run + 1;
            self.device.publish(results);
            log::info!(
                "{}: benchmark run {} complete{}",
                self.device.name(),
                results.run,
                if heavy { " (heavy)" } else { "" }
            );

            // Event goes out before completion so waiters find it queued
            if let Some(index) = tag {
                // Receiver gone means the shell is closing
                let _ = self.events.send(BenchmarkEvent { index });
            }

            {
                let mut control = self.shared.lock();
                control.completed = ticket;
                if !control.shutdown {
                    control.state = idle_state;
                }
            }
            self.shared.progress.notify_all();
        }

        if prepared {
            if let Err(e) = self.backend.release_device(raw) {
                log::warn!("Cannot release {}: {}", self.device.name(), e);
            }
        }
        log::debug!("Benchmark thread for device {} exited", self.device.index());
        self.shared.progress.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{SimulatedBackend, SimulatedDevice};
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    fn worker_for(
        device: SimulatedDevice,
    ) -> (Arc<SimulatedBackend>, DeviceWorker, Receiver<BenchmarkEvent>) {
        let descriptor = Arc::new(DeviceDescriptor::new(0, 0, device.info.clone()));
        let backend = Arc::new(SimulatedBackend::new(vec![device]));
        let (tx, rx) = mpsc::channel();
        let config = BenchmarkConfig {
            copy_bytes: 1 << 20,
            copy_iterations: 2,
            kernel_iterations: 1,
            heavy_multiplier: 4,
        };
        let worker = DeviceWorker::new(descriptor, backend.clone(), config, tx);
        (backend, worker, rx)
    }

    #[test]
    fn test_starts_idle_without_thread() {
        let (backend, worker, _rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(backend.stats().prepares, 0);
    }

    #[test]
    fn test_wait_for_run_publishes_results() {
        let (_backend, worker, rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        worker.wait_for_run(0);

        let results = worker.device().results();
        assert_eq!(results.run, 1);
        assert!(results.bandwidth.host_pinned_to_device > 0.0);
        assert!(results.throughput.float32 > 0.0);
        assert_eq!(worker.state(), WorkerState::Ready);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            BenchmarkEvent { index: 0 }
        );
    }

    #[test]
    fn test_requests_coalesce_to_latest() {
        let (backend, worker, rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        // Hold the thread in prepare so nothing is dequeued yet
        backend.set_paused(true);
        worker.device().set_heavy_mode(false);
        worker.request_run(0);
        worker.request_run(1);
        worker.device().set_heavy_mode(true);
        worker.request_run(2);
        backend.set_paused(false);

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, BenchmarkEvent { index: 2 });
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        let results = worker.device().results();
        assert_eq!(results.run, 1);
        assert!(results.heavy);
        // One heavy pass: 5 copies x (2 x 4) iterations
        assert_eq!(backend.stats().copies, 5 * 8);
    }

    #[test]
    fn test_wait_does_not_deadlock_with_pending_request() {
        let (_backend, worker, _rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        let worker = Arc::new(worker);
        worker.request_run(0);
        worker.request_run(0);
        worker.wait_for_run(0);
        let after_wait = worker.device().results().run;
        assert!(after_wait >= 1);

        let waiter = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.wait_for_run(0))
        };
        worker.request_run(0);
        waiter.join().unwrap();
        assert!(worker.device().results().run > after_wait);
    }

    #[test]
    fn test_failed_prepare_publishes_not_measured() {
        let (backend, worker, rx) =
            worker_for(SimulatedDevice::preset("Broken", 7, 5).failing_prepare());
        worker.wait_for_run(0);

        assert_eq!(worker.state(), WorkerState::Failed);
        let results = worker.device().results();
        assert_eq!(results.run, 1);
        assert_eq!(results.bandwidth.host_pinned_to_device, 0.0);
        assert_eq!(results.throughput.float32, 0.0);
        assert_eq!(backend.stats().copies, 0);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());

        // Still serviceable
        worker.wait_for_run(0);
        assert_eq!(worker.device().results().run, 2);

        drop(worker);
        assert_eq!(backend.stats().releases, 0);
    }

    #[test]
    fn test_shutdown_releases_after_loop_exits() {
        let (backend, worker, _rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        worker.wait_for_run(0);
        assert!(backend.is_prepared(0));

        worker.shutdown();
        assert_eq!(worker.state(), WorkerState::Terminating);
        assert!(!backend.is_prepared(0));
        let stats = backend.stats();
        assert_eq!(stats.prepares, 1);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.unprepared_calls, 0);

        // Requests after shutdown are ignored and never block
        worker.request_run(0);
        worker.wait_for_run(0);
        assert_eq!(worker.device().results().run, 1);
    }

    #[test]
    fn test_shutdown_during_prepare_still_releases() {
        let (backend, worker, _rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        backend.set_paused(true);
        worker.request_run(0);
        let releaser = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                backend.set_paused(false);
            })
        };
        worker.shutdown();
        releaser.join().unwrap();

        let stats = backend.stats();
        assert_eq!(stats.unprepared_calls, 0);
        assert_eq!(stats.prepares, stats.releases);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (_backend, worker, rx) = worker_for(SimulatedDevice::preset("Test", 7, 5));
        drop(rx);
        worker.wait_for_run(0);
        worker.wait_for_run(0);
        assert_eq!(worker.device().results().run, 2);
    }
}
