//! Paged read-back of a stopped capture

use std::collections::{HashMap, VecDeque};

use crate::capture::CaptureCache;

/// Events waiting to be read, FIFO first
///
/// The overflow map's values are moved into the queue only once the FIFO
/// portion has been read out; their order is arbitrary.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    queue: VecDeque<String>,
    last: HashMap<String, String>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a stopped capture's cache
    pub fn load(&mut self, cache: CaptureCache) {
        self.queue = cache.fifo.into();
        self.last = cache.last;
    }

    pub fn len(&self) -> usize {
        self.queue.len() + self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.last.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.last.clear();
    }

    /// Remove and return up to `size` events
    pub fn next_page(&mut self, size: usize) -> Vec<String> {
        let mut page = Vec::with_capacity(size.min(self.len()));
        while page.len() < size {
            if self.queue.is_empty() {
                if self.last.is_empty() {
                    break;
                }
                self.queue.extend(self.last.drain().map(|(_, event)| event));
            }
            match self.queue.pop_front() {
                Some(event) => page.push(event),
                None => break,
            }
        }
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cache(fifo: usize, last: usize) -> CaptureCache {
        CaptureCache {
            fifo: (0..fifo).map(|i| format!("f{}", i)).collect(),
            last: (0..last).map(|i| (format!("r{}", i), format!("l{}", i))).collect(),
            overflow: last as u64,
        }
    }

    #[test]
    fn test_fifo_first_then_last() {
        let mut buffer = ReadBuffer::new();
        buffer.load(cache(3, 2));
        assert_eq!(buffer.len(), 5);

        assert_eq!(buffer.next_page(2), vec!["f0", "f1"]);
        let page = buffer.next_page(2);
        assert_eq!(page[0], "f2");
        assert!(page[1].starts_with('l'));
        assert_eq!(buffer.next_page(2).len(), 1);
        assert!(buffer.next_page(2).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pages_cover_everything_once() {
        let mut buffer = ReadBuffer::new();
        buffer.load(cache(250, 37));

        let mut seen = HashSet::new();
        loop {
            let page = buffer.next_page(100);
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 100);
            for event in page {
                assert!(seen.insert(event));
            }
        }
        assert_eq!(seen.len(), 287);
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReadBuffer::new();
        buffer.load(cache(2, 2));
        buffer.clear();
        assert!(buffer.next_page(10).is_empty());
    }
}
