//! Draw context, the request-scoped cache of drawn values.
//!
//! One `DrawContext` lives for exactly one posterior-predictive request and
//! is dropped when the request returns, successfully or not. Nested
//! resolution steps enter scopes on it:
//! - a [`ScopeMode::Shared`] scope reads and writes the enclosing cache,
//! - a [`ScopeMode::Blocked`] scope starts from its own cache that is
//!   discarded when the scope exits, so speculative draws never leak out.
//!   [`DrawContext::enter_row`] pre-fills that cache with one row of the
//!   enclosing draws.
//!
//! Scopes are popped by their guard's `Drop`, which keeps enter/exit
//! balanced on every early return.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use rand::rngs::StdRng;

use crate::error::PredictiveError;
use crate::model::NodeId;
use crate::runtime::Array;

/// Cache key: node identity plus the requested `size`.
pub type DrawKey = (NodeId, Option<usize>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeMode {
    Shared,
    Blocked,
}

enum Frame {
    Shared,
    Blocked(HashMap<DrawKey, Array>),
}

pub struct DrawContext {
    root: HashMap<DrawKey, Array>,
    frames: Vec<Frame>,
    rng: StdRng,
}

impl DrawContext {
    pub fn new(rng: StdRng) -> Self {
        Self {
            root: HashMap::new(),
            frames: Vec::new(),
            rng,
        }
    }

    pub fn enter(&mut self, mode: ScopeMode) -> DrawScope<'_> {
        self.frames.push(match mode {
            ScopeMode::Shared => Frame::Shared,
            ScopeMode::Blocked => Frame::Blocked(HashMap::new()),
        });
        DrawScope { ctx: self }
    }

    /// Enter a blocked scope seeded with row `row` (modulo its row count)
    /// of every `seed` value.
    pub fn enter_row(
        &mut self,
        seed: &[(DrawKey, Array)],
        row: usize,
    ) -> Result<DrawScope<'_>, PredictiveError> {
        let mut drawn = HashMap::with_capacity(seed.len());
        for (key, value) in seed.iter().filter(|(_, value)| value.rows() > 0) {
            drawn.insert(*key, value.row(row % value.rows())?);
        }
        self.frames.push(Frame::Blocked(drawn));
        Ok(DrawScope { ctx: self })
    }

    /// Number of scopes currently entered.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether writes currently land in a throwaway cache.
    pub fn is_blocked(&self) -> bool {
        self.frames.iter().any(|f| matches!(f, Frame::Blocked(_)))
    }

    fn active(&self) -> &HashMap<DrawKey, Array> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Frame::Blocked(drawn) => Some(drawn),
                Frame::Shared => None,
            })
            .unwrap_or(&self.root)
    }

    fn active_mut(&mut self) -> &mut HashMap<DrawKey, Array> {
        let blocked = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Blocked(drawn) => Some(drawn),
            Frame::Shared => None,
        });
        match blocked {
            Some(drawn) => drawn,
            None => &mut self.root,
        }
    }

    pub fn get(&self, key: &DrawKey) -> Option<&Array> {
        self.active().get(key)
    }

    pub fn contains(&self, key: &DrawKey) -> bool {
        self.active().contains_key(key)
    }

    pub fn insert(&mut self, key: DrawKey, value: Array) {
        self.active_mut().insert(key, value);
    }

    /// Entries of the cache visible from the current scope.
    pub fn drawn(&self) -> impl Iterator<Item = (&DrawKey, &Array)> {
        self.active().iter()
    }

    pub fn len(&self) -> usize {
        self.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Guard for an entered scope; exits the scope when dropped.
pub struct DrawScope<'a> {
    ctx: &'a mut DrawContext,
}

impl Deref for DrawScope<'_> {
    type Target = DrawContext;

    fn deref(&self) -> &DrawContext {
        self.ctx
    }
}

impl DerefMut for DrawScope<'_> {
    fn deref_mut(&mut self) -> &mut DrawContext {
        self.ctx
    }
}

impl Drop for DrawScope<'_> {
    fn drop(&mut self) {
        self.ctx.frames.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn context() -> DrawContext {
        DrawContext::new(StdRng::seed_from_u64(0))
    }

    #[test]
    fn shared_scopes_write_through() {
        let mut ctx = context();
        {
            let mut outer = ctx.enter(ScopeMode::Shared);
            let mut inner = outer.enter(ScopeMode::Shared);
            inner.insert((NodeId(1), None), Array::scalar(1.0));
            assert_eq!(inner.depth(), 2);
        }
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.get(&(NodeId(1), None)), Some(&Array::scalar(1.0)));
    }

    #[test]
    fn blocked_scopes_are_isolated() {
        let mut ctx = context();
        ctx.insert((NodeId(1), None), Array::scalar(1.0));
        {
            let mut blocked = ctx.enter(ScopeMode::Blocked);
            assert!(blocked.is_blocked());
            assert!(!blocked.contains(&(NodeId(1), None)));
            blocked.insert((NodeId(2), None), Array::scalar(2.0));
            let nested = blocked.enter(ScopeMode::Shared);
            assert!(nested.contains(&(NodeId(2), None)));
        }
        assert!(!ctx.contains(&(NodeId(2), None)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn row_scopes_see_one_row_of_the_seed() {
        let mut ctx = context();
        let seed = vec![((NodeId(4), None), Array::from_vec(vec![1.0, 2.0, 3.0]))];
        {
            let mut scope = ctx.enter_row(&seed, 4).unwrap();
            assert_eq!(scope.get(&(NodeId(4), None)), Some(&Array::scalar(2.0)));
            scope.insert((NodeId(5), None), Array::scalar(5.0));
        }
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.is_empty());
    }

    #[test]
    fn scopes_exit_on_early_return() {
        fn failing(ctx: &mut DrawContext) -> Result<(), String> {
            let mut scope = ctx.enter(ScopeMode::Blocked);
            scope.insert((NodeId(3), None), Array::scalar(3.0));
            Err("stop".to_string())
        }

        let mut ctx = context();
        assert!(failing(&mut ctx).is_err());
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.is_empty());
    }
}
