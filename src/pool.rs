/// Reset hook for pooled objects. Called when an object goes back to its pool
/// so the next user sees a clean value.
pub trait Poolable: Default {
    fn reset(&mut self);
}

/// Free list of reusable objects of one type.
pub struct Pool<T: Poolable> {
    free: Vec<T>,
    max_free: usize,
    allocated: usize,
    reused: usize,
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Pool::new(256)
    }
}

impl<T: Poolable> Pool<T> {
    /// Creates a pool that keeps at most `max_free` released objects around.
    pub fn new(max_free: usize) -> Pool<T> {
        Pool {
            free: Vec::new(),
            max_free,
            allocated: 0,
            reused: 0,
        }
    }

    pub fn acquire(&mut self) -> T {
        match self.free.pop() {
            Some(item) => {
                self.reused += 1;
                item
            }
            None => {
                self.allocated += 1;
                T::default()
            }
        }
    }

    pub fn release(&mut self, mut item: T) {
        item.reset();

        if self.free.len() < self.max_free {
            self.free.push(item);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of objects created because the free list was empty.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of acquisitions served from the free list.
    pub fn reused(&self) -> usize {
        self.reused
    }
}

/// Index-addressed arena whose slots survive `clear`. Slots are reset and
/// handed out again in order, so after warm-up no allocation happens.
pub struct Arena<T: Poolable> {
    slots: Vec<T>,
    live: usize,
}

impl<T: Poolable> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T: Poolable> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena {
            slots: Vec::new(),
            live: 0,
        }
    }

    pub fn alloc(&mut self) -> usize {
        let index = self.live;

        if index < self.slots.len() {
            self.slots[index].reset();
        } else {
            self.slots.push(T::default());
        }

        self.live += 1;

        index
    }

    pub fn get(&self, index: usize) -> &T {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index]
    }

    pub fn clear(&mut self) {
        self.live = 0;
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
