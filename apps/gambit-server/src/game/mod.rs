pub mod engine;
pub mod rules;
pub mod session;
pub mod store;
pub mod types;

pub use rules::{RuleBook, RuleSet};
pub use store::SessionStore;
pub use types::{Action, Event, Rejection, SessionSnapshot};
