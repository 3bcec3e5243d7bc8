/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Bounded FIFO task queue shared by the pool's workers.
//!
//! One mutex guards the queued tasks, the outstanding stop requests and the
//! closed flag. Two [`Notify`] handles wake idle workers (`task_ready`) and
//! blocked submitters (`space_ready`). Waiters always register with
//! `Notified::enable` before inspecting the state, so a notification sent
//! between the check and the await is never lost.

use std::collections::VecDeque;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::Task;

/// What a worker received from [`TaskQueue::pop`].
pub(crate) enum Dequeued {
    /// Next task in FIFO order.
    Task(Task),
    /// The worker should exit (the pool is shrinking).
    Stop,
    /// The queue is closed and fully drained.
    Closed,
}

/// Why [`TaskQueue::push`] gave up on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushRejected {
    Closed,
    Cancelled,
}

enum TryPush {
    Pushed,
    Full(Task),
    Closed,
}

struct QueueState {
    tasks: VecDeque<Task>,
    pending_stops: usize,
    closed: bool,
}

pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    task_ready: Notify,
    space_ready: Notify,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::with_capacity(capacity),
                pending_stops: 0,
                closed: false,
            }),
            capacity: capacity.max(1),
            task_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    fn try_push(&self, task: Task) -> TryPush {
        let mut state = self.state.lock();
        if state.closed {
            return TryPush::Closed;
        }
        if state.tasks.len() >= self.capacity {
            return TryPush::Full(task);
        }
        state.tasks.push_back(task);
        drop(state);
        self.task_ready.notify_one();
        TryPush::Pushed
    }

    /// Enqueues `task`, waiting for space while the queue is full.
    ///
    /// Gives up when the queue is closed or `stop` completes, whichever is
    /// observed first. `stop` is only consulted while the task is waiting;
    /// a task that fits immediately is accepted.
    pub(crate) async fn push<F>(&self, mut task: Task, stop: F) -> Result<(), PushRejected>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_push(task) {
                TryPush::Pushed => return Ok(()),
                TryPush::Closed => return Err(PushRejected::Closed),
                TryPush::Full(rejected) => task = rejected,
            }

            tokio::select! {
                biased;
                _ = &mut stop => return Err(PushRejected::Cancelled),
                _ = &mut space => {}
            }
        }
    }

    /// Waits for the next unit of work for a worker.
    ///
    /// Stop requests are served before queued tasks so an idle pool shrinks
    /// promptly; queued tasks are still drained by the remaining workers.
    pub(crate) async fn pop(&self) -> Dequeued {
        loop {
            let ready = self.task_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.pending_stops > 0 {
                    state.pending_stops -= 1;
                    return Dequeued::Stop;
                }
                if let Some(task) = state.tasks.pop_front() {
                    drop(state);
                    self.space_ready.notify_one();
                    return Dequeued::Task(task);
                }
                if state.closed {
                    return Dequeued::Closed;
                }
            }

            ready.await;
        }
    }

    /// Asks `count` workers to exit after their current task.
    pub(crate) fn request_stops(&self, count: usize) {
        self.state.lock().pending_stops += count;
        self.task_ready.notify_waiters();
    }

    /// Withdraws up to `count` stop requests that no worker has consumed
    /// yet. Returns how many were withdrawn.
    pub(crate) fn withdraw_stops(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let withdrawn = state.pending_stops.min(count);
        state.pending_stops -= withdrawn;
        withdrawn
    }

    /// Stops accepting tasks. Queued tasks remain poppable until drained.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.task_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }
}
