use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

/// A pooled GPU resource with a byte cost and a reuse key.
pub trait HwResource {
    type Key: Ord + Clone;

    fn key(&self) -> &Self::Key;
    fn bytes(&self) -> usize;
}

pub trait HwResourceAllocator<R: HwResource> {
    fn allocate_resource(&mut self, key: &R::Key) -> Arc<R>;
}

/// Byte-budgeted cache of reusable resources.
///
/// A resource is either live (checked out, counted in [`total_resource_bytes`]) or
/// purgeable (checked in, counted in both totals). Only purgeable resources are reused or
/// evicted. Eviction removes the least recently stored first.
///
/// ```
/// use std::sync::Arc;
/// use tessera::cache::{HwResource, HwResourceAllocator, HwResourceCache};
///
/// struct Blob(u32);
/// impl HwResource for Blob {
///     type Key = u32;
///     fn key(&self) -> &u32 { &self.0 }
///     fn bytes(&self) -> usize { self.0 as usize }
/// }
/// struct Alloc;
/// impl HwResourceAllocator<Blob> for Alloc {
///     fn allocate_resource(&mut self, key: &u32) -> Arc<Blob> { Arc::new(Blob(*key)) }
/// }
///
/// let mut cache: HwResourceCache<Blob> = HwResourceCache::new(Box::new(Alloc), 100);
/// let blob = cache.obtain_resource(&64, None);
/// cache.store_resource(blob);
/// assert_eq!(cache.purgeable_bytes(), 64);
/// let _again = cache.obtain_resource(&64, None);
/// assert_eq!(cache.total_resource_bytes(), 64);
/// ```
///
/// [`total_resource_bytes`]: HwResourceCache::total_resource_bytes
pub struct HwResourceCache<R: HwResource> {
    allocator: Box<dyn HwResourceAllocator<R>>,
    max_bytes: usize,
    total_resource_bytes: usize,
    purgeable_bytes: usize,
    next_id: u64,
    purgeable: LruCache<u64, Arc<R>>,
    purgeable_by_key: BTreeMap<R::Key, VecDeque<u64>>,
}

impl<R: HwResource> HwResourceCache<R> {
    pub fn new(allocator: Box<dyn HwResourceAllocator<R>>, max_bytes: usize) -> Self {
        Self {
            allocator,
            max_bytes,
            total_resource_bytes: 0,
            purgeable_bytes: 0,
            next_id: 0,
            purgeable: LruCache::unbounded(),
            purgeable_by_key: BTreeMap::new(),
        }
    }

    /// Reuses a purgeable resource with the same key, or allocates a new one. Among equal
    /// keys the one stored earliest is taken.
    pub fn obtain_resource(&mut self, key: &R::Key, pool: Option<&mut Pool<'_, R>>) -> Arc<R> {
        let reused = self.purgeable_by_key.get_mut(key).and_then(VecDeque::pop_front);
        if self.purgeable_by_key.get(key).is_some_and(VecDeque::is_empty) {
            self.purgeable_by_key.remove(key);
        }

        let resource = match reused.and_then(|id| self.purgeable.pop(&id)) {
            Some(resource) => {
                self.purgeable_bytes -= resource.bytes();
                resource
            }
            None => {
                let resource = self.allocator.allocate_resource(key);
                self.total_resource_bytes += resource.bytes();
                trace!(bytes = resource.bytes(), total = self.total_resource_bytes, "allocated resource");
                resource
            }
        };

        if let Some(pool) = pool {
            pool.put_resource(resource.clone());
        }
        resource
    }

    /// Checks a resource back in as the most recently stored one.
    pub fn store_resource(&mut self, resource: Arc<R>) {
        let id = self.next_id;
        self.next_id += 1;
        self.purgeable_bytes += resource.bytes();
        self.purgeable_by_key
            .entry(resource.key().clone())
            .or_default()
            .push_back(id);
        self.purgeable.put(id, resource);
    }

    pub fn purge_as_needed(&mut self) {
        while self.total_resource_bytes > self.max_bytes {
            let Some((id, resource)) = self.purgeable.pop_lru() else {
                break;
            };
            if let Some(ids) = self.purgeable_by_key.get_mut(resource.key()) {
                ids.retain(|&i| i != id);
                if ids.is_empty() {
                    self.purgeable_by_key.remove(resource.key());
                }
            }
            self.total_resource_bytes -= resource.bytes();
            self.purgeable_bytes -= resource.bytes();
        }
    }

    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
        self.purge_as_needed();
    }

    pub fn total_resource_bytes(&self) -> usize {
        self.total_resource_bytes
    }

    pub fn purgeable_bytes(&self) -> usize {
        self.purgeable_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

/// Resources obtained for one scope. Dropping the pool stores all of them back.
pub struct Pool<'c, R: HwResource> {
    cache: &'c RefCell<HwResourceCache<R>>,
    resources: Vec<Arc<R>>,
}

impl<'c, R: HwResource> Pool<'c, R> {
    pub fn new(cache: &'c RefCell<HwResourceCache<R>>) -> Self {
        Self {
            cache,
            resources: Vec::new(),
        }
    }

    pub fn put_resource(&mut self, resource: Arc<R>) {
        self.resources.push(resource);
    }

    /// Obtains from the pool's cache and keeps the resource until the pool drops.
    pub fn obtain(&mut self, key: &R::Key) -> Arc<R> {
        let cache = self.cache;
        cache.borrow_mut().obtain_resource(key, Some(self))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<R: HwResource> Drop for Pool<'_, R> {
    fn drop(&mut self) {
        let mut cache = self.cache.borrow_mut();
        for resource in self.resources.drain(..) {
            cache.store_resource(resource);
        }
    }
}
