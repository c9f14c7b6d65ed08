mod resources;
mod teardown;

pub use resources::CoreModule;
pub use teardown::ResourcesModule;

use crate::di::RegistryBuilder;
use crate::error::Result;

/// Trait for feature modules
///
/// A feature module contributes registrations to the registry before it is
/// built. Registrations are applied in module order, so a later module can
/// replace a token an earlier one registered.
///
/// # Example
/// ```rust,ignore
/// use conductor::di::{RegistryBuilder, ResourceRegistration};
/// use conductor::module::Module;
///
/// pub struct BillingModule;
///
/// impl Module for BillingModule {
///     fn register(builder: &mut RegistryBuilder) -> conductor::Result<()> {
///         builder.register(ResourceRegistration::singleton("invoices", |registry| {
///             Ok(InvoiceService::new(registry.resolve(tokens::STORE)?))
///         }));
///         Ok(())
///     }
/// }
/// ```
pub trait Module {
    /// Register this module's resources
    fn register(builder: &mut RegistryBuilder) -> Result<()>;
}

/// Object-safe form of [`Module::register`], for lists of modules chosen at runtime.
pub type ModuleRegistrar = fn(&mut RegistryBuilder) -> Result<()>;
