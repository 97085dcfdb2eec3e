//! Application layer: card allocation, background dispatch and the
//! settlement flow built on top of them.
//!
//! Every service is an explicit instance wired by [`gateway::Gateway`];
//! nothing here is a process-wide singleton.

pub mod allocator;
pub mod broker;
pub mod completion;
pub mod dispatcher;
pub mod gateway;
pub mod notifications;
pub mod orders;
pub mod settlement;
pub mod waiter;
