//! Domain model types shared across repositories and routes.

pub mod entity;
pub mod label;
pub mod pagination;
pub mod validation;

pub use entity::{EntityBase, EntityKind};
pub use label::EntityLabel;
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use validation::ValidationError;
