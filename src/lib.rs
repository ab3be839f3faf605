//! Lethe - idempotent intake for at-least-once event delivery
//!
//! Named after the river of forgetting, Lethe remembers each inbound event
//! identifier for a retention window and then lets it go. Chat platforms and
//! webhook transports redeliver events whenever an acknowledgement is slow or
//! lost; Lethe makes sure the business logic behind them runs at most once per
//! identifier within that window, while still letting a genuinely failed
//! delivery be retried.
//!
//! # Example
//!
//! ```no_run
//! use lethe_rs::{DedupGate, Effect, EventId, GateConfig, HandlerError, Outcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // 5 minute window, transient failures released, everything else retained
//! let gate = DedupGate::from_config(&GateConfig::default());
//!
//! let outcome = gate
//!     .admit(EventId::from("om_5ce6d572455d361153b7cb51da133945"), |id| async move {
//!         // Write the row, send the reply...
//!         println!("handling {id}");
//!         Ok::<_, HandlerError>(Effect::Committed)
//!     })
//!     .await?;
//!
//! match outcome {
//!     Outcome::Duplicate => println!("already handled"),
//!     Outcome::Success { committed } => println!("handled, committed={committed}"),
//!     Outcome::Failure { retryable, reason } => {
//!         println!("failed ({reason}), retryable={retryable}")
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gate;
pub mod link;
pub mod memory;
pub mod model;
pub mod router;
pub mod store;

// Re-export commonly used types
pub use error::{Error, HandlerError};
pub use gate::{Admission, DedupGate, Ticket};
pub use lethe_macros::deduplicate;
pub use link::{extract_url, strip_query, Platform, SharedLink};
pub use memory::ExpiringIdSet;
pub use model::{Claim, Effect, EventId, FailurePolicy, GateConfig, Outcome, DEFAULT_WINDOW};
pub use router::{Ack, Dispatch, EventHandler, EventRouter, InboundEvent};
pub use store::SeenStore;
