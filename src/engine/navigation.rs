use crate::engine::playlist::PlaylistStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved { from: usize, to: usize },
    /// Back at frame 0 with the session background restored.
    Restarted,
    Unchanged,
}

/// Reader-driven movement through a playlist. Every move goes through
/// [`PlaylistStore::set_current_index`], which keeps the index in range and
/// the high-water mark monotonic.
pub struct NavigationController<'a> {
    store: &'a mut PlaylistStore,
}

impl<'a> NavigationController<'a> {
    pub fn new(store: &'a mut PlaylistStore) -> Self {
        Self { store }
    }

    pub fn next(&mut self) -> NavOutcome {
        let from = self.store.current_index();
        if from + 1 < self.store.len() {
            self.move_to(from + 1)
        } else {
            NavOutcome::Unchanged
        }
    }

    pub fn prev(&mut self) -> NavOutcome {
        let from = self.store.current_index();
        if from > 0 {
            self.move_to(from - 1)
        } else {
            NavOutcome::Unchanged
        }
    }

    pub fn jump_to(&mut self, index: usize) -> NavOutcome {
        if index >= self.store.len() {
            return NavOutcome::Unchanged;
        }
        self.move_to(index)
    }

    pub fn restart(&mut self) -> NavOutcome {
        self.store.set_current_index(0);
        NavOutcome::Restarted
    }

    fn move_to(&mut self, to: usize) -> NavOutcome {
        let from = self.store.current_index();
        self.store.set_current_index(to);
        NavOutcome::Moved { from, to }
    }
}
