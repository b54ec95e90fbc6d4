//! Transition-graph enforcement shared by every stateful entity.
//!
//! Each state enum declares its outgoing edges through [`StateGraph`]. The
//! entity keeps its state inside a [`Lifecycle`], whose only mutator is
//! [`Lifecycle::move_to`]. A target that is not an edge of the current state
//! is rejected with a [`TransitionError`] and the state is left untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A directed transition graph over a closed set of states.
pub trait StateGraph: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// The states reachable from `self` in a single move.
    fn successors(self) -> &'static [Self];

    fn can_move_to(self, target: Self) -> bool {
        self.successors().contains(&target)
    }

    /// A state without outgoing edges.
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

/// Rejected move between two states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot move {entity} from state {from} to state {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

/// Unknown persisted state code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {entity} state code {code:?}")]
pub struct StateCodeError {
    pub entity: &'static str,
    pub code: String,
}

/// Current state of an entity plus the moment it last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle<S> {
    state: S,
    state_changed: DateTime<Utc>,
}

impl<S: StateGraph> Lifecycle<S> {
    pub fn new(initial: S, at: DateTime<Utc>) -> Self {
        Self {
            state: initial,
            state_changed: at,
        }
    }

    /// Rebuild a lifecycle from persisted columns.
    pub fn restore(state: S, state_changed: DateTime<Utc>) -> Self {
        Self {
            state,
            state_changed,
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn state_changed(&self) -> DateTime<Utc> {
        self.state_changed
    }

    pub fn move_to(&mut self, target: S, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.can_move_to(target) {
            return Err(TransitionError {
                entity: S::ENTITY,
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        self.state = target;
        self.state_changed = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Duration;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Lamp {
        Off,
        On,
        Broken,
    }

    impl fmt::Display for Lamp {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(match self {
                Self::Off => "OFF",
                Self::On => "ON",
                Self::Broken => "BROKEN",
            })
        }
    }

    impl FromStr for Lamp {
        type Err = StateCodeError;

        fn from_str(code: &str) -> Result<Self, Self::Err> {
            match code {
                "OFF" => Ok(Self::Off),
                "ON" => Ok(Self::On),
                "BROKEN" => Ok(Self::Broken),
                other => Err(StateCodeError {
                    entity: "lamp",
                    code: other.to_string(),
                }),
            }
        }
    }

    impl StateGraph for Lamp {
        const ENTITY: &'static str = "lamp";

        fn successors(self) -> &'static [Self] {
            match self {
                Self::Off => &[Self::On, Self::Broken],
                Self::On => &[Self::Off, Self::Broken],
                Self::Broken => &[],
            }
        }
    }

    #[test]
    fn move_to_follows_edges_and_stamps_time() {
        let start = Utc::now();
        let mut lamp = Lifecycle::new(Lamp::Off, start);

        let later = start + Duration::seconds(5);
        lamp.move_to(Lamp::On, later).unwrap();

        assert_eq!(lamp.state(), Lamp::On);
        assert_eq!(lamp.state_changed(), later);
    }

    #[test]
    fn rejected_move_leaves_state_untouched() {
        let start = Utc::now();
        let mut lamp = Lifecycle::new(Lamp::Broken, start);

        let err = lamp
            .move_to(Lamp::On, start + Duration::seconds(1))
            .unwrap_err();

        assert_eq!(err.to_string(), "cannot move lamp from state BROKEN to state ON");
        assert_eq!(lamp.state(), Lamp::Broken);
        assert_eq!(lamp.state_changed(), start);
    }

    #[test]
    fn self_loops_are_not_implied() {
        let mut lamp = Lifecycle::new(Lamp::On, Utc::now());
        assert!(lamp.move_to(Lamp::On, Utc::now()).is_err());
    }

    #[test]
    fn terminal_states_have_no_edges() {
        assert!(Lamp::Broken.is_terminal());
        assert!(!Lamp::Off.is_terminal());
        assert_eq!("BROKEN".parse::<Lamp>().unwrap(), Lamp::Broken);
        assert!("DIM".parse::<Lamp>().is_err());
    }
}
