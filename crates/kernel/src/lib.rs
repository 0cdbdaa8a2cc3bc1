//! Core building blocks shared by every shelf crate: layered settings, the
//! module lifecycle, field validation, partial-update values and pagination.

pub mod module;
pub mod pagination;
pub mod patch;
pub mod registry;
pub mod settings;
pub mod validator;

pub use module::{InitCtx, Migration, Module};
pub use pagination::{Filters, Metadata, SortColumn, SortDirection};
pub use patch::Patch;
pub use registry::ModuleRegistry;
pub use validator::Validator;
