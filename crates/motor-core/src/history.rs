use crate::command::Command;
use std::collections::VecDeque;

/// Most-recent-first command log with a fixed capacity.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<Command>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest entry on overflow.
    pub fn record(&mut self, command: Command) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(command);
    }

    /// Replace the entry with the same id. Returns false if it was evicted.
    pub fn update(&mut self, command: &Command) -> bool {
        match self.entries.iter_mut().find(|c| c.id == command.id) {
            Some(entry) => {
                *entry = command.clone();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<&Command> {
        self.entries.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Command> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
