//! Bounded ring of submitted command lines.

/// Fixed-capacity command history.
///
/// When full, a new entry overwrites the oldest one. Empty lines and lines
/// equal to the newest entry are not recorded.
#[derive(Debug, Clone)]
pub struct History {
    slots: Vec<String>,
    /// Index the next entry is written to
    head: usize,
    len: usize,
}

impl History {
    /// Create an empty history holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![String::new(); capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of lines kept.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of lines currently kept.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record a submitted line.
    pub fn push(&mut self, line: &str) {
        if line.is_empty() || self.get(0) == Some(line) {
            return;
        }
        self.slots[self.head] = line.to_string();
        self.head = (self.head + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Entry by age: `0` is the most recent line.
    pub fn get(&self, age: usize) -> Option<&str> {
        if age >= self.len {
            return None;
        }
        let cap = self.capacity();
        let index = (self.head + cap - 1 - age) % cap;
        Some(&self.slots[index])
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.len).filter_map(move |age| self.get(age))
    }
}
