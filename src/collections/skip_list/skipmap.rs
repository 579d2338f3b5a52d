use crate::collections::skip_list::{rand_level, MAX_LEVEL};
use crate::comparator::Comparator;
use std::alloc::Layout;
use std::cmp::Ordering as CmpOrdering;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

#[repr(C)]
pub struct Node {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// ranges [0, `MAX_LEVEL`]
    level: usize,
    /// the actual length is `level + 1`
    next: [AtomicPtr<Node>; 0],
}

impl Node {
    fn head() -> *mut Node {
        Self::new_with_level(Vec::new(), Vec::new(), MAX_LEVEL)
    }

    fn new_with_level(key: Vec<u8>, value: Vec<u8>, level: usize) -> *mut Node {
        let layout = Self::layout_for(level);
        unsafe {
            let node_ptr = std::alloc::alloc(layout) as *mut Node;
            let node = &mut *node_ptr;
            ptr::write(&mut node.key, key);
            ptr::write(&mut node.value, value);
            ptr::write(&mut node.level, level);
            // Null out the pointer array; AtomicPtr is a plain pointer in
            // memory, so zero bytes are valid nulls.
            ptr::write_bytes(node.next.as_mut_ptr(), 0, level + 1);
            node_ptr
        }
    }

    fn layout_for(level: usize) -> Layout {
        let pointers_size = (level + 1) * mem::size_of::<AtomicPtr<Node>>();
        Layout::from_size_align(
            mem::size_of::<Node>() + pointers_size,
            mem::align_of::<Node>(),
        )
        .unwrap()
    }

    #[inline]
    fn next_slot(&self, level: usize) -> &AtomicPtr<Node> {
        debug_assert!(level <= self.level);
        unsafe { &*self.next.as_ptr().add(level) }
    }

    /// Acquire pairs with the Release in `set_next`, so a reader that
    /// observes a node also observes its fully-written contents.
    #[inline]
    pub fn get_next(&self, level: usize) -> *mut Node {
        self.next_slot(level).load(Ordering::Acquire)
    }

    #[inline]
    fn set_next(&self, level: usize, node: *mut Node) {
        self.next_slot(level).store(node, Ordering::Release);
    }
}

unsafe fn drop_node(node: *mut Node) {
    let layout = Node::layout_for((*node).level);
    ptr::drop_in_place(node);
    std::alloc::dealloc(node as *mut u8, layout);
}

/// Sorted map from byte keys to byte values, ordered by a [`Comparator`].
///
/// # Concurrency
///
/// A single writer may call [`SkipMap::insert`] while any number of
/// readers traverse concurrently without locking: nodes are published by
/// a Release store of the predecessor pointer and never moved or freed
/// until the map itself is dropped. Callers must serialize writers
/// externally.
pub struct SkipMap<C: Comparator> {
    head: *mut Node,
    cmp: C,
    cur_max_level: AtomicUsize,
    len: AtomicUsize,
    mem_usage: AtomicUsize,
}

unsafe impl<C: Comparator> Send for SkipMap<C> {}
unsafe impl<C: Comparator> Sync for SkipMap<C> {}

impl<C: Comparator> SkipMap<C> {
    pub fn new(cmp: C) -> SkipMap<C> {
        SkipMap {
            head: Node::head(),
            cmp,
            cur_max_level: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            mem_usage: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of keys and values plus node overhead inserted so far.
    #[inline]
    pub fn approximate_memory_usage(&self) -> usize {
        self.mem_usage.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn comparator(&self) -> &C {
        &self.cmp
    }

    fn key_is_after_node(&self, key: &[u8], node: *mut Node) -> bool {
        !node.is_null() && self.cmp.compare(unsafe { &(*node).key }, key) == CmpOrdering::Less
    }

    /// First node, or null when the map is empty.
    pub fn first(&self) -> *mut Node {
        unsafe { (*self.head).get_next(0) }
    }

    /// Last node, or null when the map is empty.
    pub fn last(&self) -> *mut Node {
        let mut node = self.head;
        let mut level = self.cur_max_level.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*node).get_next(level) };
            if !next.is_null() {
                node = next;
            } else if level == 0 {
                return if node == self.head {
                    ptr::null_mut()
                } else {
                    node
                };
            } else {
                level -= 1;
            }
        }
    }

    /// First node with key >= `key`, or null when there is none.
    pub fn find_greater_or_equal(&self, key: &[u8]) -> *mut Node {
        let mut node = self.head;
        let mut level = self.cur_max_level.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*node).get_next(level) };
            if self.key_is_after_node(key, next) {
                node = next;
            } else if level == 0 {
                return next;
            } else {
                level -= 1;
            }
        }
    }

    fn find_greater_or_equal_with_prev(
        &self,
        key: &[u8],
        prev: &mut [*mut Node; MAX_LEVEL + 1],
    ) -> *mut Node {
        let mut node = self.head;
        let mut level = self.cur_max_level.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*node).get_next(level) };
            if self.key_is_after_node(key, next) {
                node = next;
            } else {
                prev[level] = node;
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Last node with key < `key`, or null when there is none.
    pub fn find_less_than(&self, key: &[u8]) -> *mut Node {
        let mut node = self.head;
        let mut level = self.cur_max_level.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*node).get_next(level) };
            if self.key_is_after_node(key, next) {
                node = next;
            } else if level == 0 {
                return if node == self.head {
                    ptr::null_mut()
                } else {
                    node
                };
            } else {
                level -= 1;
            }
        }
    }

    /// Insert an entry. `key` must not already be present.
    ///
    /// Requires external serialization with other writers; readers may
    /// run concurrently.
    pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut prev = [self.head; MAX_LEVEL + 1];
        let node = self.find_greater_or_equal_with_prev(&key, &mut prev);
        debug_assert!(
            node.is_null() || self.cmp.compare(unsafe { &(*node).key }, &key) != CmpOrdering::Equal,
            "duplicate key inserted into skipmap"
        );

        let level = rand_level();
        let cur_max = self.cur_max_level.load(Ordering::Relaxed);
        if level > cur_max {
            // Concurrent readers may observe the new level before the new
            // node; they then just fall through head's null pointer.
            self.cur_max_level.store(level, Ordering::Relaxed);
        }

        let charge = key.len()
            + value.len()
            + mem::size_of::<Node>()
            + (level + 1) * mem::size_of::<AtomicPtr<Node>>();
        let new_node = Node::new_with_level(key, value, level);
        unsafe {
            for (i, &prev_node) in prev.iter().enumerate().take(level + 1) {
                (*new_node).set_next(i, (*prev_node).get_next(i));
                // Publication point: the node becomes reachable here.
                (*prev_node).set_next(i, new_node);
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        self.mem_usage.fetch_add(charge, Ordering::Relaxed);
    }

    /// Borrowing iterator over entries in key order, for in-process scans.
    pub fn iter(&self) -> SkipMapVisitor<'_, C> {
        SkipMapVisitor {
            map: self,
            node: self.first(),
        }
    }
}

impl<C: Comparator> Drop for SkipMap<C> {
    fn drop(&mut self) {
        unsafe {
            let mut node = self.head;
            while !node.is_null() {
                let next = (*node).get_next(0);
                drop_node(node);
                node = next;
            }
        }
    }
}

pub struct SkipMapVisitor<'a, C: Comparator> {
    map: &'a SkipMap<C>,
    node: *mut Node,
}

impl<'a, C: Comparator> Iterator for SkipMapVisitor<'a, C> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        let _keep_alive = self.map;
        let entry = unsafe { ((*self.node).key.as_slice(), (*self.node).value.as_slice()) };
        self.node = unsafe { (*self.node).get_next(0) };
        Some(entry)
    }
}
