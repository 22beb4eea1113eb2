use crate::story::StoryItem;

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved { from: usize, to: usize },
    /// Stepped past the last item; the session ends.
    Finished,
    /// Nothing to do (retreat at the first item).
    Stay,
}

/// Ordered items of one author plus the current position.
///
/// Membership is fixed for the session; only fields inside the current item
/// are patched live.
#[derive(Debug, Clone)]
pub struct Sequencer {
    items: Vec<StoryItem>,
    index: usize,
}

impl Sequencer {
    /// Returns `None` for an empty group.
    pub fn new(items: Vec<StoryItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self { items, index: 0 })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.items.len()
    }

    pub fn current(&self) -> &StoryItem {
        &self.items[self.index]
    }

    pub fn current_mut(&mut self) -> &mut StoryItem {
        &mut self.items[self.index]
    }

    pub fn advance(&mut self) -> Step {
        if self.is_last() {
            return Step::Finished;
        }
        let from = self.index;
        self.index += 1;
        Step::Moved {
            from,
            to: self.index,
        }
    }

    pub fn retreat(&mut self) -> Step {
        if self.index == 0 {
            return Step::Stay;
        }
        let from = self.index;
        self.index -= 1;
        Step::Moved {
            from,
            to: self.index,
        }
    }

    /// Moves to `index`, clamped to the group. Jumping to the current item
    /// restarts it.
    pub fn jump_to(&mut self, index: usize) -> Step {
        let from = self.index;
        self.index = index.min(self.items.len() - 1);
        Step::Moved {
            from,
            to: self.index,
        }
    }
}
