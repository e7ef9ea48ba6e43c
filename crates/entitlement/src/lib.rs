//! Zaply Entitlement Engine
//!
//! Plan lifecycle rules for Zaply tenants: trial expiry, paid expiry with a
//! grace window, and the one side effect that follows from losing
//! entitlement - disconnecting the tenant's WhatsApp sessions.
//!
//! The crate keeps the decision separate from the effect:
//! - [`evaluate::evaluate`] is a pure function over a plan record and an
//!   instant; it never reads the clock or the database
//! - [`orchestrator::EntitlementService::check_and_enforce`] loads state,
//!   evaluates, and applies teardown when the verdict requires it
//!
//! The payment event reducer lives here too, but on the other side of the
//! plan-record seam: it writes the fields the evaluator reads, and never
//! participates in evaluation itself.

pub mod error;
pub mod evaluate;
pub mod events;
pub mod gateway;
pub mod orchestrator;
pub mod payment_events;
pub mod plan_store;
pub mod teardown;

pub use error::{EntitlementError, EntitlementResult};
pub use evaluate::{evaluate, Entitlement, PlanKind, GRACE_PERIOD_DAYS};
pub use gateway::{GatewayClient, GatewayConfig};
pub use orchestrator::EntitlementService;
pub use payment_events::{PaymentEvent, PaymentEventReducer, PaymentEventType};
pub use plan_store::PlanStore;
pub use teardown::{TeardownResult, TeardownService};
