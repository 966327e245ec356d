//! Orchestration core: confidence routing, the document state machine,
//! review dispatch, and result merging.

pub mod dispatcher;
pub mod merger;
pub mod router;
pub mod state_machine;

pub use dispatcher::{
    DispatchError, LoggingReviewQueue, ReviewAnnotation, ReviewDispatcher, ReviewQueue,
};
pub use router::{route, RoutingDecision};
pub use state_machine::{Applied, DocumentEvent, DocumentStateMachine, StateError};
