//! Application lifecycle
//!
//! Startup modules are driven through `initialize → start → stop` by the
//! [`ApplicationOrchestrator`]; resource on-ready hooks run concurrently once
//! every module is initialized.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration Loading
//!    ↓
//! 2. Registry Build (singletons constructed)
//!    ↓
//! 3. Module initialize (registration order)
//!    ↓
//! 4. On-ready hooks (concurrent, failures isolated)
//!    ↓
//! 5. Module start (registration order)
//!    ↓
//! [Running...]
//!    ↓
//! 6. Shutdown Signal (SIGTERM/SIGINT)
//!    ↓
//! 7. Module stop (reverse order, failures isolated)
//! ```

mod application;
mod error;
mod health;
mod hooks;
mod orchestrator;
mod shutdown;
mod traits;

pub use application::{Application, ApplicationBuilder};
pub use error::{LifecycleError, Result};
pub use health::{ComponentHealth, HealthRegistry, HealthStatus};
pub use hooks::{HookReport, InitHookExecutor};
pub use orchestrator::ApplicationOrchestrator;
pub use shutdown::{ShutdownHandler, shutdown_signal};
pub use traits::{ModuleState, StartupModule};
