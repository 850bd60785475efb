//! Event tracking and identity resolution for a storefront.
//!
//! The engine resolves a stable visitor identity, decides per action whether
//! tracking is permitted, queues client-side script fragments for one flush
//! per render, and delivers server-side measurement hits — idempotently for
//! monetary events. Everything persistent or external sits behind the trait
//! seams in [`store`]; the only network I/O lives in the measurement client
//! behind [`delivery::HitSender`].

pub mod context;
pub mod delivery;
pub mod ecommerce;
pub mod identity;
pub mod policy;
pub mod queue;
pub mod script;
pub mod store;
pub mod tracker;
pub mod uuid_gen;

pub use context::{referer_path_from_url, RequestContext};
pub use delivery::HitSender;
pub use ecommerce::{PayloadBuilder, PayloadMutator};
pub use identity::{ClientIdPolicy, IdentityResolver};
pub use policy::{PolicyOverride, TrackingPolicy};
pub use queue::ScriptQueue;
pub use store::{
    AccountDirectory, IdentityStore, OrderReader, ProductCatalog, TrackedMarkerStore,
};
pub use tracker::{EventTracker, TrackerStores};
