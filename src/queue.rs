use crossbeam::queue::ArrayQueue;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A fixed-capacity FIFO channel, the sole transport between stages.
///
/// `push` blocks while the queue is full and `pop` blocks while it is empty;
/// both are safe for multiple concurrent producers and consumers. Blocking
/// on a full queue is the only backpressure mechanism: a slow consumer stage
/// causes producers to stall rather than drop items. Strict FIFO, no
/// priority, no peeking, no bulk dequeue.
#[derive(Debug)]
pub struct BoundedQueue<T: Send> {
    queue: Arc<ArrayQueue<T>>,
}

impl<T: Send> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: Send> BoundedQueue<T> {
    /// Create a new queue with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    /// Push an item, blocking while the queue is at capacity
    pub fn push(&self, item: T) {
        let mut item = item;
        loop {
            match self.queue.push(item) {
                Ok(()) => return,
                Err(i) => {
                    item = i;
                    // Spin with a small backoff to reduce CPU usage
                    thread::sleep(Duration::from_micros(50));
                }
            }
        }
    }

    /// Attempt to push without blocking
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.queue.push(item)
    }

    /// Pop an item, blocking while the queue is empty
    pub fn pop(&self) -> T {
        loop {
            match self.queue.pop() {
                Some(item) => return item,
                None => thread::sleep(Duration::from_micros(50)),
            }
        }
    }

    /// Attempt to pop without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Get the current number of queued items
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the capacity of the queue
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Whether two handles share the same underlying storage
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let queue = BoundedQueue::new(10);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), 1);
        assert_eq!(queue.pop(), 2);
        assert_eq!(queue.pop(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_push_full() {
        let queue = BoundedQueue::new(2);
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_unblocks_after_pop() {
        let queue = BoundedQueue::new(1);
        queue.push(1);
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.pop(), 1);
        producer.join().unwrap();
        assert_eq!(queue.pop(), 2);
    }

    #[test]
    fn test_clone_shares_storage() {
        let queue = BoundedQueue::new(5);
        let other = queue.clone();
        assert!(queue.same_queue(&other));
        assert!(!queue.same_queue(&BoundedQueue::new(5)));

        other.push(7);
        assert_eq!(queue.pop(), 7);
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        let queue = BoundedQueue::new(4);
        let producers: Vec<_> = (0..3)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        queue.push(p * 100 + i);
                    }
                })
            })
            .collect();
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || (0..30).map(|_| queue.pop()).count())
        };
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(consumer.join().unwrap(), 30);
        assert!(queue.is_empty());
    }
}
