// Collaborator gateways.
//
// Everything that talks to the outside world sits behind a narrow interface
// here so the engine can be driven by fakes in tests.
//
// - registry: schema registry REST client
// - kafka: broker transport (publish, consume)
// - clipboard: system clipboard

pub mod clipboard;
pub mod kafka;
pub mod registry;

pub use kafka::{Broker, BrokerError, ConsumedMessage, ConsumerHandle, FetchOutcome, OutboundRecord};
pub use registry::{RegistryError, SchemaRegistry, SubjectSchema};
