mod builder;
mod container;
mod lazy;
mod registration;
mod scope;
pub mod tokens;

pub use builder::RegistryBuilder;
pub use container::ResourceRegistry;
pub use lazy::Proxy;
pub use registration::{InitHook, OnReadyFn, ResolverKind, ResourceRegistration};
pub use scope::Scope;
