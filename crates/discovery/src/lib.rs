//! Discovery and health tracking of local tool servers.
//!
//! The [`DiscoveryController`] owns a [`Registry`] of [`ServiceRecord`]s
//! keyed by address. A background loop sweeps a port range with
//! [`healthcheck::PortScanner`] and merges every responsive endpoint into
//! the registry; users can also register endpoints by hand, re-probe known
//! ones, and remove them.
//!
//! # Example
//!
//! ```no_run
//! use discovery::{ControllerConfig, DiscoveryController};
//! use healthcheck::PortRange;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = DiscoveryController::new(ControllerConfig::default())?;
//! controller.start(PortRange::new(8000, 8100)?).await;
//!
//! controller.register_manual("Search", "http://localhost:9000").await?;
//! for record in controller.snapshot() {
//!     println!("{} {} {}", record.identity, record.address, record.status);
//! }
//!
//! controller.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod events;
pub mod record;
pub mod registry;

pub use controller::{ControllerConfig, DiscoveryController};
pub use error::{DiscoveryError, Result};
pub use events::{DiscoveryEvent, DiscoveryState};
pub use record::{ServiceRecord, ServiceStatus};
pub use registry::{Registry, StatusChange, Upsert};
