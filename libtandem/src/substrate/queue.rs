// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A FIFO queue shared between threads, with bounded blocking pops.
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Pops the oldest item, waiting until `deadline` for one to arrive.
    pub fn pop_until(&self, deadline: Instant) -> Option<T> {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.pop_until(Instant::now() + timeout)
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Drops every queued item, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let queue = Queue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue: Queue<u32> = Queue::new();
        let start = Instant::now();

        assert_eq!(queue.pop_timeout(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn pop_wakes_on_push_from_another_thread() {
        let queue = Arc::new(Queue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push("vote");
            })
        };

        assert_eq!(queue.pop_timeout(Duration::from_secs(5)), Some("vote"));
        producer.join().unwrap();
    }

    #[test]
    fn clear_reports_dropped() {
        let queue = Queue::new();
        queue.push('a');
        queue.push('b');

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
