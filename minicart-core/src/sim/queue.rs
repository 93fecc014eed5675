use crate::hal::pio::FIFO_DEPTH;

/// Fixed-depth state machine FIFO. Pushing into a full FIFO hands the value back instead of
/// growing, the same way hardware stalls or drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fifo<T> {
    arr: [T; FIFO_DEPTH],
    start: usize,
    len: usize,
}

impl<T> Fifo<T> {
    pub(crate) const CAPACITY: usize = FIFO_DEPTH;
}

impl<T> Fifo<T>
where
    T: Copy + Default,
{
    pub(crate) fn new() -> Self {
        Self {
            arr: [T::default(); FIFO_DEPTH],
            start: 0,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == Self::CAPACITY
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let front = self.arr[self.start];
        self.start = (self.start + 1) % Self::CAPACITY;
        self.len -= 1;

        Some(front)
    }

    pub(crate) fn push_back(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }

        self.arr[(self.start + self.len) % Self::CAPACITY] = value;
        self.len += 1;

        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

impl<T> Default for Fifo<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}
