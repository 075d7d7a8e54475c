/// Picks which query index the next polling sweep serves.
///
/// The index only moves once a sweep has finished (or the query was found to
/// be permanently off-limits), never in the middle of paging.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    current: usize,
    len: usize,
}

impl RoundRobin {
    pub fn new(len: usize) -> Self {
        Self { current: 0, len }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Step to the next index, wrapping. Returns the new current index.
    pub fn advance(&mut self) -> usize {
        if self.len > 0 {
            self.current = (self.current + 1) % self.len;
        }
        self.current
    }
}
