//! Tagged recursion limiter.
//!
//! Guards call sites that user code can legally re-enter (re-entrant queue
//! drains, handlers triggering events from handlers) against unbounded
//! recursion. Depth is tracked per thread and per tag.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::EventError;

thread_local! {
    static DEPTHS: RefCell<HashMap<&'static str, usize>> = RefCell::new(HashMap::new());
}

/// Scope guard incrementing the tagged depth; fails with
/// [`EventError::TooDeep`] when the maximum is exceeded.
#[derive(Debug)]
pub(crate) struct RecursionGuard {
    site: &'static str,
}

impl RecursionGuard {
    pub(crate) fn enter(site: &'static str, max_depth: usize) -> Result<Self, EventError> {
        DEPTHS.with(|depths| {
            let mut depths = depths.borrow_mut();
            let depth = depths.entry(site).or_insert(0);
            if *depth >= max_depth {
                return Err(EventError::TooDeep { site });
            }
            *depth += 1;
            Ok(Self { site })
        })
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        DEPTHS.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(self.site) {
                *depth = depth.saturating_sub(1);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_bounded() {
        let a = RecursionGuard::enter("test_site", 2).unwrap();
        let b = RecursionGuard::enter("test_site", 2).unwrap();
        assert_eq!(
            RecursionGuard::enter("test_site", 2).unwrap_err(),
            EventError::TooDeep { site: "test_site" }
        );
        drop(b);
        let c = RecursionGuard::enter("test_site", 2);
        assert!(c.is_ok());
        drop(a);
    }

    #[test]
    fn tags_are_independent() {
        let _a = RecursionGuard::enter("site_a", 1).unwrap();
        assert!(RecursionGuard::enter("site_b", 1).is_ok());
    }
}
