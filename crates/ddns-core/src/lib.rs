// # ddns-core
//
// Core library of the DDNS updater.
//
// ## Architecture Overview
//
// This library provides everything between "what is my public IP" and
// "the vendor confirmed the record":
// - **IpSource** / **Resolver**: public IP strategies and the fallthrough policy
// - **DnsProvider**: uniform contract implemented by every vendor adapter
// - **StateStore**: persisted per-record IP history
// - **DdnsEngine**: per-record update pipeline and parallel cycles
// - **Scheduler**: periodic ticks, manual triggers and graceful shutdown
// - **ProviderRegistry**: name-based factories for providers, sources and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Classified Errors**: The engine acts on `ErrorKind`, never on messages
// 3. **Plugin-Based**: Providers are registered by name, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **One Writer Per Record**: A record never runs two updates at once

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod traits;
pub mod transport;

// Re-export core types for convenience
pub use cancel::Cancellation;
pub use config::{DdnsConfig, IpStrategy, IpVersion, Ipv6Suffix, RecordConfig, RecordId};
pub use engine::{CycleSummary, DdnsEngine, EngineEvent, UpdateOutcome};
pub use error::{Error, ErrorKind, Result};
pub use registry::ProviderRegistry;
pub use resolver::Resolver;
pub use runtime::{RuntimeSnapshot, Status};
pub use scheduler::{Scheduler, UpdateTrigger};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, IpSource, StateStore, UpdateTarget};
