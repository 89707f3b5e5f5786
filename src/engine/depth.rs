//! Per-thread call depth
//!
//! Depth is logically a property of one call stack, so it lives in a
//! thread-local keyed by engine id. Concurrent threads never disturb each
//! other's indentation, and independent engines keep separate counts.

use crate::rules::Action;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct CallStack {
    depth: usize,
    /// Active `hide_tree` frames on this stack
    hidden: usize,
}

thread_local! {
    static STACKS: RefCell<HashMap<u64, CallStack>> = RefCell::new(HashMap::new());
}

/// One active wrapped call; leaving the scope pops it, on unwind too
#[derive(Debug)]
pub(crate) struct Frame {
    engine_id: u64,
    /// Depth of this call, 0 for the outermost traced call
    pub(crate) depth: usize,
    /// Inside a `hide_tree` call's extent: run, but emit nothing
    pub(crate) suppressed: bool,
    hides: bool,
}

impl Frame {
    pub(crate) fn enter(engine_id: u64, action: Action) -> Self {
        let (depth, suppressed, hides) = STACKS
            .try_with(|stacks| {
                let mut stacks = stacks.borrow_mut();
                let stack = stacks.entry(engine_id).or_default();
                let depth = stack.depth;
                let suppressed = stack.hidden > 0;
                let hides = action.hides_tree() && !suppressed;
                stack.depth += 1;
                if hides {
                    stack.hidden += 1;
                }
                (depth, suppressed, hides)
            })
            .unwrap_or((0, false, false));

        Self {
            engine_id,
            depth,
            suppressed,
            hides,
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let _ = STACKS.try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            if let Some(stack) = stacks.get_mut(&self.engine_id) {
                stack.depth = stack.depth.saturating_sub(1);
                if self.hides {
                    stack.hidden = stack.hidden.saturating_sub(1);
                }
                if stack.depth == 0 {
                    stacks.remove(&self.engine_id);
                }
            }
        });
    }
}

/// Current depth of `engine_id` on this thread
pub(crate) fn current_depth(engine_id: u64) -> usize {
    STACKS
        .try_with(|stacks| stacks.borrow().get(&engine_id).map_or(0, |s| s.depth))
        .unwrap_or(0)
}
