//! The bounded reversible-history log.
//!
//! Mutations are appended (and applied) while a block is being processed,
//! then sealed into a height group by [`History::commit`]. The log retains
//! the last [`crate::MAX_HISTORY_CAPACITY`] committed heights; rolling back
//! executes the retained mutations' reverts in strict reverse order.

use std::collections::VecDeque;

use crate::error::{Result, StateError};
use crate::keyframe::StateKeyFrame;
use crate::mutation::{Mutation, MutationCtx};

// A sealed group of mutations committed at one height. Heights with no
// mutations still occupy a group so the retention window is measured in
// heights, not entries.
#[derive(Debug, Clone)]
struct HeightGroup {
    height: u64,
    mutations: Vec<Mutation>,
}

/// The reversible mutation log.
#[derive(Debug, Clone, Default)]
pub struct History {
    // Committed groups in ascending height order.
    groups: VecDeque<HeightGroup>,
    // Mutations applied since the last commit.
    pending: Vec<Mutation>,
    // Last committed height.
    height: u64,
    // Retention window in heights.
    capacity: usize,
}

impl History {
    /// Creates an empty log retaining `capacity` heights.
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: VecDeque::new(),
            pending: Vec::new(),
            height: 0,
            capacity,
        }
    }

    /// The last committed height.
    pub fn current_height(&self) -> u64 {
        self.height
    }

    /// The oldest height still retained, if any group is committed.
    pub fn oldest_height(&self) -> Option<u64> {
        self.groups.front().map(|g| g.height)
    }

    /// Number of mutations retained across all committed groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.mutations.len()).sum()
    }

    /// Whether no committed mutations are retained.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Applies a mutation to the frame and records it for the next commit.
    pub fn append(
        &mut self,
        mutation: Mutation,
        frame: &mut StateKeyFrame,
        ctx: &MutationCtx<'_>,
    ) {
        mutation.apply(frame, ctx);
        self.pending.push(mutation);
    }

    /// Seals all pending mutations into the group for `height` and trims the
    /// retention window. Committing an already committed height with nothing
    /// pending is a no-op.
    pub fn commit(&mut self, height: u64) {
        if height <= self.height && self.pending.is_empty() {
            return;
        }
        let mutations = std::mem::take(&mut self.pending);
        self.groups.push_back(HeightGroup { height, mutations });
        self.height = height;

        // Trim heights that fell out of the window.
        let floor = height.saturating_sub(self.capacity as u64);
        while let Some(front) = self.groups.front() {
            if front.height < floor {
                self.groups.pop_front();
            } else {
                break;
            }
        }
    }

    /// Rolls the frame back so that `target` is the last committed height.
    ///
    /// Reverts are executed in strict reverse order. Fails with
    /// [`StateError::RollbackBeyondWindow`] when `target` is below the oldest
    /// retained height; the frame is untouched in that case.
    pub fn rollback_to(
        &mut self,
        target: u64,
        frame: &mut StateKeyFrame,
        ctx: &MutationCtx<'_>,
    ) -> Result<()> {
        if target >= self.height {
            return Ok(());
        }
        if let Some(oldest) = self.oldest_height() {
            if target < oldest {
                return Err(StateError::RollbackBeyondWindow { target, oldest });
            }
        }
        self.rollback_tail(target, frame, ctx);
        Ok(())
    }

    /// Like [`History::rollback_to`], but silently caps at the retention
    /// window instead of failing.
    pub fn rollback_seek_to(
        &mut self,
        target: u64,
        frame: &mut StateKeyFrame,
        ctx: &MutationCtx<'_>,
    ) {
        self.rollback_tail(target, frame, ctx);
    }

    fn rollback_tail(&mut self, target: u64, frame: &mut StateKeyFrame, ctx: &MutationCtx<'_>) {
        while self.groups.back().is_some_and(|g| g.height > target) {
            let group = match self.groups.pop_back() {
                Some(group) => group,
                None => break,
            };
            for mutation in group.mutations.iter().rev() {
                mutation.revert(frame, ctx);
            }
            // When the window caps the rollback, the cursor lands just below
            // the deepest group that could be undone, not at the target.
            self.height = self
                .groups
                .back()
                .map(|g| g.height)
                .unwrap_or_else(|| group.height.saturating_sub(1).max(target));
        }
    }

    /// Moves a detached frame, currently positioned at `from`, to `target`
    /// by reverting or replaying the retained mutations. The log itself is
    /// not modified, so the live cursor is unaffected.
    pub fn seek_to(
        &self,
        target: u64,
        from: u64,
        frame: &mut StateKeyFrame,
        ctx: &MutationCtx<'_>,
    ) -> Result<()> {
        if target > self.height {
            return Err(StateError::SeekOutOfRange {
                target,
                current: self.height,
            });
        }
        if target < from {
            if let Some(oldest) = self.oldest_height() {
                if target < oldest {
                    return Err(StateError::RollbackBeyondWindow { target, oldest });
                }
            }
            for group in self.groups.iter().rev() {
                if group.height <= target {
                    break;
                }
                if group.height > from {
                    continue;
                }
                for mutation in group.mutations.iter().rev() {
                    mutation.revert(frame, ctx);
                }
            }
        } else {
            for group in self.groups.iter() {
                if group.height <= from {
                    continue;
                }
                if group.height > target {
                    break;
                }
                for mutation in group.mutations.iter() {
                    mutation.apply(frame, ctx);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vertex_config::ChainParams;
    use vertex_types::H256;

    fn ctx(params: &ChainParams) -> MutationCtx<'_> {
        MutationCtx {
            params,
            cr_hooks: None,
        }
    }

    fn special_tx(tag: u8) -> Mutation {
        Mutation::SpecialTxRecord {
            hash: H256::keccak256(&[tag]),
        }
    }

    #[test]
    fn test_append_applies_immediately() {
        let params = ChainParams::default();
        let mut history = History::new(720);
        let mut frame = StateKeyFrame::new();

        history.append(special_tx(1), &mut frame, &ctx(&params));
        assert_eq!(frame.special_tx_hashes.len(), 1);
        // Not yet committed.
        assert_eq!(history.current_height(), 0);

        history.commit(10);
        assert_eq!(history.current_height(), 10);
    }

    #[test]
    fn test_rollback_reverts_in_reverse_order() {
        let params = ChainParams::default();
        let mut history = History::new(720);
        let mut frame = StateKeyFrame::new();

        for h in 1..=5u64 {
            history.append(special_tx(h as u8), &mut frame, &ctx(&params));
            history.commit(h);
        }
        assert_eq!(frame.special_tx_hashes.len(), 5);

        history
            .rollback_to(2, &mut frame, &ctx(&params))
            .unwrap();
        assert_eq!(history.current_height(), 2);
        assert_eq!(frame.special_tx_hashes.len(), 2);
        assert!(frame.special_tx_hashes.contains(&H256::keccak256(&[1])));
        assert!(frame.special_tx_hashes.contains(&H256::keccak256(&[2])));
    }

    #[test]
    fn test_window_trimming_and_beyond_window_error() {
        let params = ChainParams::default();
        let mut history = History::new(720);
        let mut frame = StateKeyFrame::new();

        for h in 1..=1000u64 {
            history.append(special_tx((h % 251) as u8), &mut frame, &ctx(&params));
            history.commit(h);
        }
        assert_eq!(history.oldest_height(), Some(280));

        assert!(history.rollback_to(280, &mut frame, &ctx(&params)).is_ok());
        assert_eq!(history.current_height(), 280);

        let err = history
            .rollback_to(279, &mut frame, &ctx(&params))
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::RollbackBeyondWindow { target: 279, oldest: 280 }
        ));
    }

    #[test]
    fn test_rollback_seek_caps_silently() {
        let params = ChainParams::default();
        let mut history = History::new(3);
        let mut frame = StateKeyFrame::new();

        for h in 1..=10u64 {
            history.append(special_tx(h as u8), &mut frame, &ctx(&params));
            history.commit(h);
        }
        // Window retains heights 7..=10; seek below just caps there.
        history.rollback_seek_to(2, &mut frame, &ctx(&params));
        assert_eq!(history.current_height(), 6);
    }

    #[test]
    fn test_double_commit_is_noop() {
        let params = ChainParams::default();
        let mut history = History::new(720);
        let mut frame = StateKeyFrame::new();

        history.append(special_tx(1), &mut frame, &ctx(&params));
        history.commit(5);
        let len = history.len();
        history.commit(5);
        assert_eq!(history.len(), len);
        assert_eq!(history.current_height(), 5);
    }

    #[test]
    fn test_seek_on_detached_frame() {
        let params = ChainParams::default();
        let mut history = History::new(720);
        let mut frame = StateKeyFrame::new();

        for h in 1..=8u64 {
            history.append(special_tx(h as u8), &mut frame, &ctx(&params));
            history.commit(h);
        }

        let mut snapshot = frame.snapshot();
        history
            .seek_to(3, 8, &mut snapshot, &ctx(&params))
            .unwrap();
        assert_eq!(snapshot.special_tx_hashes.len(), 3);
        // The live frame and cursor are untouched.
        assert_eq!(frame.special_tx_hashes.len(), 8);
        assert_eq!(history.current_height(), 8);

        // Forward replay brings the snapshot back.
        history
            .seek_to(8, 3, &mut snapshot, &ctx(&params))
            .unwrap();
        assert_eq!(snapshot, frame);

        assert!(history.seek_to(9, 8, &mut snapshot, &ctx(&params)).is_err());
    }
}
