//! Dependency injection infrastructure.
//!
//! This module provides compile-time dependency injection using the `FromRef` trait
//! and derive macros from `di-macros`.
//!
//! # Overview
//!
//! - `FromRef<T>`: Trait for extracting a value from a reference to `T`
//! - `#[derive(Context)]`: Makes each field of a struct extractable via `FromRef`
//! - `#[derive(FromContext)]`: Generates `FromRef` impl by resolving each field
//!
//! # Example
//!
//! ```ignore
//! use crate::di::{FromContext, FromRef};
//!
//! // `Context` derives `FromRef<Context>` for `AppStore`, `Arc<Config>`,
//! // and `Arc<ModeRegistry>`.
//! #[derive(FromContext, Clone)]
//! pub struct ContextAssembler {
//!     store: AppStore,        // resolved via FromRef<Context>
//!     config: Arc<Config>,
//!     modes: Arc<ModeRegistry>,
//! }
//!
//! let ctx = Context::new(store, config);
//! let assembler = ContextAssembler::from_ref(&ctx);
//! ```

/// Trait for extracting a value from a reference to another type.
///
/// This is the core trait for compile-time dependency injection.
/// Types that implement `FromRef<T>` can be extracted from `&T`.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

/// Blanket implementation: any Clone type can be extracted from itself.
impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

// Re-export derive macros
pub use di_macros::{Context, FromContext};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::FromRef;
    use crate::config::Config;
    use crate::context::Context;
    use crate::services::{ContextAssembler, GraphExporter};
    use crate::store::{MemoryGraph, MemoryStore};

    #[test]
    fn test_services_share_context_dependencies() {
        let store = MemoryStore::new(MemoryGraph::default()).unwrap();
        let ctx = Context::new(Arc::new(store), Config::default());

        let config: Arc<Config> = FromRef::from_ref(&ctx);
        assert!(Arc::ptr_eq(&config, &ctx.config));

        let _assembler = ContextAssembler::from_ref(&ctx);
        let _exporter = GraphExporter::from_ref(&ctx);
        // config, store, and mode table are shared, not copied
        assert_eq!(Arc::strong_count(&ctx.config), 4);
    }
}
