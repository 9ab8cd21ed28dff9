//! Fixed-capacity inbound message queue
//!
//! Received frames are copied into a pool of fixed-size pages. Occupied
//! pages are chained head to tail through index links, so pushing and
//! pulling never allocate. When every page is taken the newest frame is
//! refused and counted as dropped.
//!
//! [`InboundQueue`] is a cheap clonable handle: the engine pushes from the
//! radio task while a consumer on another task pulls.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::frame::MAX_FRAME_SIZE;

/// Page size in bytes: header plus message type, length and data
pub const PAGE_SIZE: usize = MAX_FRAME_SIZE;

/// Number of pages in the pool
pub const QUEUE_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy)]
struct Page {
    data: [u8; PAGE_SIZE],
    occupied: bool,
    next: Option<usize>,
}

impl Page {
    const EMPTY: Page = Page {
        data: [0; PAGE_SIZE],
        occupied: false,
        next: None,
    };
}

#[derive(Debug)]
struct PagePool {
    pages: [Page; QUEUE_CAPACITY],
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    stats: QueueStats,
}

impl PagePool {
    fn new() -> Self {
        Self {
            pages: [Page::EMPTY; QUEUE_CAPACITY],
            head: None,
            tail: None,
            len: 0,
            stats: QueueStats::default(),
        }
    }

    fn free_page(&self) -> Option<usize> {
        self.pages.iter().position(|page| !page.occupied)
    }

    fn push(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > PAGE_SIZE {
            warn!(size = bytes.len(), "Refusing frame larger than a queue page");
            self.stats.dropped += 1;
            return false;
        }

        let Some(index) = self.free_page() else {
            self.stats.dropped += 1;
            return false;
        };

        let page = &mut self.pages[index];
        page.data = [0; PAGE_SIZE];
        page.data[..bytes.len()].copy_from_slice(bytes);
        page.occupied = true;
        page.next = None;

        match self.tail {
            Some(tail) => self.pages[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        self.stats.pushed += 1;
        trace!(page = index, len = self.len, "Queued frame");
        true
    }

    fn pull(&mut self, out: &mut [u8; PAGE_SIZE]) -> bool {
        let Some(index) = self.head else {
            return false;
        };

        let page = &mut self.pages[index];
        out.copy_from_slice(&page.data);
        page.occupied = false;
        self.head = page.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        self.stats.pulled += 1;
        trace!(page = index, len = self.len, "Dequeued frame");
        true
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames accepted
    pub pushed: u64,
    /// Frames handed to the consumer
    pub pulled: u64,
    /// Frames refused because the pool was full
    pub dropped: u64,
}

/// Shared handle to the inbound page pool
#[derive(Debug, Clone)]
pub struct InboundQueue {
    pool: Arc<Mutex<PagePool>>,
}

impl InboundQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            pool: Arc::new(Mutex::new(PagePool::new())),
        }
    }

    /// Copy `bytes` into a free page
    ///
    /// Returns `false` without touching the queue when no page is free.
    pub fn push(&self, bytes: &[u8]) -> bool {
        self.pool.lock().push(bytes)
    }

    /// Copy the oldest page into `out` and release it
    ///
    /// Returns `false` when the queue is empty.
    pub fn pull(&self, out: &mut [u8; PAGE_SIZE]) -> bool {
        self.pool.lock().pull(out)
    }

    /// Whether no page is occupied
    pub fn is_empty(&self) -> bool {
        self.pool.lock().head.is_none()
    }

    /// Number of occupied pages
    pub fn len(&self) -> usize {
        self.pool.lock().len
    }

    /// Whether every page is occupied
    pub fn is_full(&self) -> bool {
        self.len() == QUEUE_CAPACITY
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> QueueStats {
        self.pool.lock().stats
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
