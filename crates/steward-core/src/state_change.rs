//! Composable descriptions of convergence work
//!
//! `calculate_changes` never touches the node; it returns a `StateChange`
//! tree describing what should happen, and the loop driver hands that tree to
//! a [`StateChangeExecutor`]. The leaf type `A` is chosen by each agent.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::effects::StateChangeExecutor;
use crate::Result;

/// A description of work that moves local state toward configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange<A> {
    /// Nothing to do. The loop sleeps for the agent's full poll interval.
    NoOp,
    /// A single agent-specific action
    Action(A),
    /// Children run one after another; the first failure stops the rest
    Sequentially(Vec<StateChange<A>>),
    /// Children run concurrently; every child runs even if one fails
    InParallel(Vec<StateChange<A>>),
}

impl<A> Default for StateChange<A> {
    fn default() -> Self {
        Self::NoOp
    }
}

impl<A> StateChange<A> {
    /// Whether this change is the no-op sentinel.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Leaf actions in depth-first order.
    pub fn actions(&self) -> Vec<&A> {
        let mut out = Vec::new();
        self.collect_actions(&mut out);
        out
    }

    fn collect_actions<'a>(&'a self, out: &mut Vec<&'a A>) {
        match self {
            Self::NoOp => {}
            Self::Action(action) => out.push(action),
            Self::Sequentially(children) | Self::InParallel(children) => {
                for child in children {
                    child.collect_actions(out);
                }
            }
        }
    }
}

fn normalise<A>(
    changes: impl IntoIterator<Item = StateChange<A>>,
    wrap: fn(Vec<StateChange<A>>) -> StateChange<A>,
) -> StateChange<A> {
    let mut children: Vec<_> = changes.into_iter().filter(|c| !c.is_noop()).collect();
    match children.len() {
        0 => StateChange::NoOp,
        1 => children.remove(0),
        _ => wrap(children),
    }
}

/// Run `changes` in order. No-ops are dropped; an empty result is `NoOp` and a
/// single survivor is returned unwrapped.
pub fn sequentially<A>(changes: impl IntoIterator<Item = StateChange<A>>) -> StateChange<A> {
    normalise(changes, StateChange::Sequentially)
}

/// Run `changes` concurrently, normalised like [`sequentially`].
pub fn in_parallel<A>(changes: impl IntoIterator<Item = StateChange<A>>) -> StateChange<A> {
    normalise(changes, StateChange::InParallel)
}

/// Execute a change tree through `executor`.
///
/// Sequential children stop at the first failure. Parallel children all run to
/// completion and the first failure (in child order) is returned.
pub fn run_state_change<'a, A, E>(
    change: &'a StateChange<A>,
    executor: &'a E,
) -> BoxFuture<'a, Result<()>>
where
    A: Sync,
    E: StateChangeExecutor<A> + ?Sized,
{
    async move {
        match change {
            StateChange::NoOp => Ok(()),
            StateChange::Action(action) => executor.execute(action).await,
            StateChange::Sequentially(children) => {
                for child in children {
                    run_state_change(child, executor).await?;
                }
                Ok(())
            }
            StateChange::InParallel(children) => {
                let results =
                    join_all(children.iter().map(|child| run_state_change(child, executor))).await;
                results.into_iter().collect()
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StewardError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl StateChangeExecutor<u32> for Recorder {
        async fn execute(&self, action: &u32) -> Result<()> {
            self.seen.lock().unwrap().push(*action);
            if self.fail_on == Some(*action) {
                return Err(StewardError::execution(format!("action {action}")));
            }
            Ok(())
        }
    }

    #[test]
    fn combinators_drop_noops() {
        let change: StateChange<u32> = sequentially([StateChange::NoOp, StateChange::NoOp]);
        assert!(change.is_noop());

        let single = in_parallel([StateChange::NoOp, StateChange::Action(1)]);
        assert_eq!(single, StateChange::Action(1));

        let pair = in_parallel([StateChange::Action(1), StateChange::Action(2)]);
        assert_eq!(
            pair,
            StateChange::InParallel(vec![StateChange::Action(1), StateChange::Action(2)])
        );
    }

    #[test]
    fn actions_are_depth_first() {
        let change = sequentially([
            StateChange::Action(1),
            in_parallel([StateChange::Action(2), StateChange::Action(3)]),
            StateChange::Action(4),
        ]);
        assert_eq!(change.actions(), vec![&1, &2, &3, &4]);
    }

    #[tokio::test]
    async fn sequential_stops_at_first_failure() {
        let recorder = Recorder {
            fail_on: Some(2),
            ..Default::default()
        };
        let change = sequentially([
            StateChange::Action(1),
            StateChange::Action(2),
            StateChange::Action(3),
        ]);
        let result = run_state_change(&change, &recorder).await;

        assert!(result.is_err());
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn parallel_runs_every_child() {
        let recorder = Recorder {
            fail_on: Some(1),
            ..Default::default()
        };
        let change = in_parallel([
            StateChange::Action(1),
            StateChange::Action(2),
            StateChange::Action(3),
        ]);
        let result = run_state_change(&change, &recorder).await;

        assert_eq!(result, Err(StewardError::execution("action 1")));
        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn noop_executes_nothing() {
        let recorder = Recorder::default();
        run_state_change(&StateChange::NoOp, &recorder).await.unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    fn arb_change() -> impl Strategy<Value = StateChange<u8>> {
        let leaf = prop_oneof![Just(StateChange::NoOp), any::<u8>().prop_map(StateChange::Action)];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(|children| sequentially(children)),
                prop::collection::vec(inner, 0..4).prop_map(|children| in_parallel(children)),
            ]
        })
    }

    fn has_nested_noop(change: &StateChange<u8>) -> bool {
        match change {
            StateChange::NoOp | StateChange::Action(_) => false,
            StateChange::Sequentially(children) | StateChange::InParallel(children) => {
                children.len() < 2 || children.iter().any(|c| c.is_noop() || has_nested_noop(c))
            }
        }
    }

    proptest! {
        #[test]
        fn combinators_never_nest_noops(change in arb_change()) {
            prop_assert!(!has_nested_noop(&change));
        }

        #[test]
        fn wrapping_keeps_leaf_order(changes in prop::collection::vec(arb_change(), 0..4)) {
            let expected: Vec<u8> = changes.iter().flat_map(|c| c.actions()).copied().collect();
            let wrapped = sequentially(changes);
            let actual: Vec<u8> = wrapped.actions().into_iter().copied().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
