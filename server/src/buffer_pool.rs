//! Page-aligned buffer pool: size-class free lists of byte buffers whose
//! capacity is always a multiple of the OS page size, so a
//! `pread`/`pwrite` destination never leaves wasted slack at the tail of
//! an allocation and buffers can be recycled across requests without
//! re-touching the allocator.

use std::sync::{Arc, Mutex};

fn page_size() -> usize {
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions and always
    // returns a positive value on a real system.
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v > 0 { v as usize } else { 4096 }
}

fn align_up(len: usize, page: usize) -> usize {
    len.div_ceil(page) * page
}

struct Inner {
    page_size: usize,
    classes: std::collections::HashMap<usize, Vec<Vec<u8>>>,
}

/// Shared, cloneable handle to the pool.
#[derive(Clone)]
pub struct PageBufferPool {
    inner: Arc<Mutex<Inner>>,
}

impl PageBufferPool {
    pub fn new() -> Self {
        PageBufferPool {
            inner: Arc::new(Mutex::new(Inner {
                page_size: page_size(),
                classes: std::collections::HashMap::new(),
            })),
        }
    }

    /// Checks out a buffer whose capacity is at least `len`, rounded up to
    /// the next page-aligned size class. A new allocation only happens
    /// when that class's free list is empty.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let mut inner = self.inner.lock().unwrap();
        let class = align_up(len.max(1), inner.page_size);
        let mut buf = inner
            .classes
            .get_mut(&class)
            .and_then(Vec::pop)
            .unwrap_or_else(|| Vec::with_capacity(class));
        buf.clear();
        buf.resize(len, 0);
        PooledBuffer {
            buf,
            class,
            pool: self.inner.clone(),
        }
    }
}

impl Default for PageBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A checked-out buffer. Returned to its size class's free list on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    class: usize,
    pool: Arc<Mutex<Inner>>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.truncate(0);
        buf.reserve_exact(self.class.saturating_sub(buf.capacity()));
        debug_assert!(
            buf.capacity() >= self.class,
            "returned buffer must still be at least its size class"
        );
        let mut inner = self.pool.lock().unwrap();
        let page = inner.page_size;
        debug_assert_eq!(self.class % page, 0, "size class must stay page-aligned");
        inner.classes.entry(self.class).or_default().push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffer_is_page_aligned_and_sized() {
        let pool = PageBufferPool::new();
        let page = page_size();
        let buf = pool.acquire(10);
        assert_eq!(buf.len(), 10);
        assert!(buf.capacity() >= page);
        assert_eq!(buf.capacity() % page, 0);
    }

    #[test]
    fn reuses_freed_buffer_of_the_same_class() {
        let pool = PageBufferPool::new();
        {
            let _buf = pool.acquire(100);
        }
        let inner = pool.inner.lock().unwrap();
        let page = inner.page_size;
        drop(inner);
        let classes_len = {
            let inner = pool.inner.lock().unwrap();
            inner.classes.get(&page).map(Vec::len).unwrap_or(0)
        };
        assert_eq!(classes_len, 1, "freed buffer should be on its class free list");
    }
}
