use crate::virtual_machine::errors::Exception;
use std::collections::HashMap;

/// Byte blocks handed out to bytecode through the `alloc` and `free` natives.
///
/// Blocks are named by opaque non-zero handles that are never reused within
/// one run, so a stale handle cannot alias a newer block. The total size of
/// live blocks never exceeds `capacity` bytes.
#[derive(Debug)]
pub struct Heap {
    blocks: HashMap<u64, Vec<u8>>,
    next_handle: u64,
    used: usize,
    capacity: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            next_handle: 0,
            used: 0,
            capacity,
        }
    }

    /// Allocates a zeroed block of `size` bytes and returns its handle.
    ///
    /// Fails with `IllegalOperation` when the live total would pass the capacity.
    pub fn allocate(&mut self, size: usize) -> Result<u64, Exception> {
        let used = self
            .used
            .checked_add(size)
            .filter(|used| *used <= self.capacity)
            .ok_or(Exception::IllegalOperation)?;
        self.used = used;
        self.next_handle += 1;
        let handle = self.next_handle;
        self.blocks.insert(handle, vec![0; size]);
        Ok(handle)
    }

    /// Releases the block named by `handle`.
    pub fn free(&mut self, handle: u64) -> Result<(), Exception> {
        let block = self
            .blocks
            .remove(&handle)
            .ok_or(Exception::IllegalOperation)?;
        self.used -= block.len();
        Ok(())
    }

    pub fn block(&self, handle: u64) -> Option<&[u8]> {
        self.blocks.get(&handle).map(Vec::as_slice)
    }

    pub fn block_mut(&mut self, handle: u64) -> Option<&mut [u8]> {
        self.blocks.get_mut(&handle).map(Vec::as_mut_slice)
    }

    /// Number of blocks currently allocated.
    pub fn live(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes held by live blocks.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.next_handle = 0;
        self.used = 0;
    }
}
