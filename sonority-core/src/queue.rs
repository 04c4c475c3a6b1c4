//! Per-source buffer queue.
//!
//! Entries before `read_index` have been played and may be unqueued. The entry
//! at `read_index` is the one the mixer is reading. A queue with no buffers
//! holds a single sentinel entry (`buffer == None`).

use crate::buffer::BufferId;
use crate::error::{Result, SonorityError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueEntry {
    /// `None` for the sentinel.
    pub buffer: Option<BufferId>,
    /// Set while a callback buffer entry has not produced any data yet.
    pub pending_callback: bool,
}

impl QueueEntry {
    fn new(buffer: Option<BufferId>) -> Self {
        Self {
            buffer,
            pending_callback: false,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.buffer.is_none()
    }
}

/// One-shot re-pointing of the read position, applied by the mixer in place of
/// the normal cursor advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSplice {
    pub read_index: usize,
    /// Frame offset within the entry at `read_index`.
    pub soundpos: u64,
}

#[derive(Debug, Clone)]
pub struct BufferQueue {
    entries: Vec<QueueEntry>,
    read_index: usize,
    splice: Option<QueueSplice>,
}

impl Default for BufferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferQueue {
    pub fn new() -> Self {
        Self {
            entries: vec![QueueEntry::new(None)],
            read_index: 0,
            splice: None,
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut QueueEntry> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A queue always holds at least the sentinel.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(QueueEntry::is_sentinel)
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// One past the last queued entry.
    pub fn write_index(&self) -> usize {
        self.entries.len()
    }

    /// Allocated entry slots.
    pub fn size(&self) -> usize {
        self.entries.capacity()
    }

    /// Entries already played.
    pub fn processed(&self) -> usize {
        self.read_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.read_index >= self.entries.len()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.get(self.read_index)
    }

    pub fn current_buffer(&self) -> Option<BufferId> {
        self.current().and_then(|entry| entry.buffer)
    }

    /// Buffer ids in queue order, sentinels skipped.
    pub fn buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.entries.iter().filter_map(|entry| entry.buffer)
    }

    pub(crate) fn set_read_index(&mut self, index: usize) {
        self.read_index = index.min(self.entries.len());
    }

    /// Push `buffer` to the back. A trailing sentinel is overwritten in place.
    pub fn append(&mut self, buffer: BufferId) -> Result<()> {
        if let Some(last) = self.entries.last_mut().filter(|entry| entry.is_sentinel()) {
            *last = QueueEntry::new(Some(buffer));
            return Ok(());
        }
        self.entries.try_reserve(1)?;
        self.entries.push(QueueEntry::new(Some(buffer)));
        Ok(())
    }

    /// Remove the first `n` processed entries and return their buffers.
    ///
    /// Fails without modifying the queue when fewer than `n` entries have been
    /// processed. A pending splice into one of the removed entries is dropped.
    pub fn unqueue(&mut self, n: usize) -> Result<Vec<BufferId>> {
        if n > self.read_index {
            return Err(SonorityError::InvalidValue(format!(
                "Cannot unqueue {} buffers, only {} processed",
                n, self.read_index
            )));
        }
        let mut removed = Vec::new();
        removed.try_reserve(n)?;
        removed.extend(self.entries.drain(..n).filter_map(|entry| entry.buffer));
        self.read_index -= n;
        // A jump into a removed entry has nowhere left to land.
        self.splice = self
            .splice
            .filter(|splice| splice.read_index >= n)
            .map(|splice| QueueSplice {
                read_index: splice.read_index - n,
                ..splice
            });
        if self.entries.is_empty() {
            self.entries.push(QueueEntry::new(None));
            self.read_index = 0;
        }
        Ok(removed)
    }

    /// Drop every entry and reinstate the sentinel.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.push(QueueEntry::new(None));
        self.read_index = 0;
        self.splice = None;
    }

    /// Replace the whole queue with a single entry.
    pub fn head(&mut self, buffer: Option<BufferId>) {
        self.entries.clear();
        self.entries.push(QueueEntry::new(buffer));
        self.read_index = 0;
        self.splice = None;
    }

    /// Ask the mixer to jump to `soundpos` frames into entry `read_index` on
    /// its next pass.
    pub fn request_splice(&mut self, read_index: usize, soundpos: u64) -> Result<()> {
        match self.entries.get(read_index) {
            Some(entry) if !entry.is_sentinel() => {
                self.splice = Some(QueueSplice {
                    read_index,
                    soundpos,
                });
                Ok(())
            }
            _ => Err(SonorityError::InvalidValue(format!(
                "No queued buffer at index {}",
                read_index
            ))),
        }
    }

    pub fn pending_splice(&self) -> Option<QueueSplice> {
        self.splice
    }

    pub(crate) fn take_splice(&mut self) -> Option<QueueSplice> {
        self.splice.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(n: u64) -> BufferId {
        BufferId::from_raw(n)
    }

    fn assert_invariant(queue: &BufferQueue) {
        assert!(queue.read_index() <= queue.write_index());
        assert!(queue.write_index() <= queue.size());
        assert!(queue.len() >= 1);
    }

    #[test]
    fn test_new_queue_is_sentinel() {
        let queue = BufferQueue::new();
        assert_eq!(queue.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.current_buffer(), None);
        assert_invariant(&queue);
    }

    #[test]
    fn test_append_overwrites_sentinel() {
        let mut queue = BufferQueue::new();
        queue.append(bid(1)).unwrap();
        queue.append(bid(2)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.buffers().collect::<Vec<_>>(), vec![bid(1), bid(2)]);
        assert_eq!(queue.current_buffer(), Some(bid(1)));
        assert_invariant(&queue);
    }

    #[test]
    fn test_unqueue_more_than_processed_fails_unchanged() {
        let mut queue = BufferQueue::new();
        for n in 1..=3 {
            queue.append(bid(n)).unwrap();
        }
        queue.set_read_index(1);

        assert!(matches!(
            queue.unqueue(2),
            Err(SonorityError::InvalidValue(_))
        ));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.read_index(), 1);
        assert_invariant(&queue);

        assert_eq!(queue.unqueue(1).unwrap(), vec![bid(1)]);
        assert_eq!(queue.read_index(), 0);
        assert_eq!(queue.current_buffer(), Some(bid(2)));
        assert_invariant(&queue);
    }

    #[test]
    fn test_unqueue_everything_reinstates_sentinel() {
        let mut queue = BufferQueue::new();
        queue.append(bid(1)).unwrap();
        queue.append(bid(2)).unwrap();
        queue.set_read_index(2);
        assert!(queue.is_exhausted());

        assert_eq!(queue.unqueue(2).unwrap(), vec![bid(1), bid(2)]);
        assert_eq!(queue.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.read_index(), 0);
        assert_invariant(&queue);
    }

    #[test]
    fn test_clear_and_head() {
        let mut queue = BufferQueue::new();
        queue.append(bid(1)).unwrap();
        queue.append(bid(2)).unwrap();
        queue.set_read_index(1);

        queue.head(Some(bid(7)));
        assert_eq!(queue.buffers().collect::<Vec<_>>(), vec![bid(7)]);
        assert_eq!(queue.read_index(), 0);

        queue.clear();
        assert!(queue.is_empty());
        assert_invariant(&queue);
    }

    #[test]
    fn test_splice_is_one_shot() {
        let mut queue = BufferQueue::new();
        queue.append(bid(1)).unwrap();
        queue.append(bid(2)).unwrap();

        assert!(queue.request_splice(5, 0).is_err());
        queue.request_splice(1, 64).unwrap();
        assert_eq!(
            queue.take_splice(),
            Some(QueueSplice {
                read_index: 1,
                soundpos: 64
            })
        );
        assert_eq!(queue.take_splice(), None);
    }

    #[test]
    fn test_splice_rebased_on_unqueue() {
        let mut queue = BufferQueue::new();
        for n in 1..=3 {
            queue.append(bid(n)).unwrap();
        }
        queue.set_read_index(1);
        queue.request_splice(2, 0).unwrap();
        queue.unqueue(1).unwrap();
        assert_eq!(queue.pending_splice().map(|s| s.read_index), Some(1));
    }

    #[test]
    fn test_splice_into_unqueued_entry_is_dropped() {
        let mut queue = BufferQueue::new();
        for n in 1..=3 {
            queue.append(bid(n)).unwrap();
        }
        queue.set_read_index(2);
        queue.request_splice(0, 1).unwrap();
        assert_eq!(queue.unqueue(1).unwrap(), vec![bid(1)]);
        assert_eq!(queue.pending_splice(), None);
        assert_eq!(queue.read_index(), 1);
        assert_invariant(&queue);
    }
}
