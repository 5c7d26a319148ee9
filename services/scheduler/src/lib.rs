//! envctl Environment Scheduler
//!
//! A time-triggered controller that moves the conductor environment between
//! ACTIVE (serving traffic) and SUSPENDED (compute scaled to zero, database
//! powered off) to eliminate idle cost outside business hours.
//!
//! ## Architecture
//!
//! - **Trigger**: A calendar rule invokes the binary twice a day with a
//!   `start` or `stop` action
//! - **Scheduler**: Observes live resource state, plans the minimal diff,
//!   and issues commands with bounded retry
//! - **Control client**: HTTP implementation of the platform's
//!   describe/mutate contract (in-memory fake available for tests)

pub mod client;
pub mod config;
pub mod retry;
pub mod scheduler;
pub mod trigger;
