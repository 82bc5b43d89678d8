//! Building lifecycle for the Bulwark server.
//!
//! Players place buildings from templates; workers raise them block by
//! block; the registry ticks them, syncs their progress, aggregates
//! population supply and removes them once destroyed. Explosions and block
//! breaks are arbitrated against building footprints before they touch the
//! world.
//!
//! [`BuildingServer`] bundles the per-world state and plugs into the
//! server's [`HookBus`](bulwark_sim::HookBus).

pub mod arbiter;
pub mod building;
pub mod ledger;
pub mod notify;
pub mod registry;
pub mod server;
pub mod template;

pub use arbiter::WorldEventArbiter;
pub use building::{Building, BuildingTuning};
pub use ledger::{PlayerResources, ResourceLedger, ResourceName, Resources};
pub use notify::{
    Envelope, Notification, NotificationSink, Outbox, PROTOCOL_VERSION, Recipient, WireError,
    decode_envelope, encode_envelope,
};
pub use registry::{BuildingRegistry, PlacementRequest, Relationship};
pub use server::BuildingServer;
pub use template::{BlockDef, BuildingPlan, PlacementError, TemplateDef, TemplateError, TemplateLibrary};
