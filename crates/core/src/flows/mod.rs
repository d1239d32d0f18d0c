pub mod engine;
pub mod states;

pub use engine::{TurnEngine, TurnPolicy, TurnTransitionError};
pub use states::{ExecutionOutcome, RoutingIntent, StateUpdate, Transition, TurnNode};
