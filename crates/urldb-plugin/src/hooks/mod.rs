//! Hook system: registry, dispatcher, and hook definitions.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookEvent, HookPoint};
pub use dispatcher::{DispatchOutcome, HandlerFailure, HookDispatcher, Next};
pub use registry::{HookEntry, HookHandler, HookRegistry, HookSubscription, RegistrationOrder};
