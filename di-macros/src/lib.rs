//! Compile-time dependency injection macros for kgrag.
//!
//! - `#[derive(Context)]` makes each field of the root context extractable
//! - `#[derive(FromContext)]` builds a service by extracting each of its fields
//!
//! Generated code refers to `crate::FromRef`, so the consuming crate must
//! define or re-export `FromRef` at its root.

use proc_macro::TokenStream;

mod context;
mod from_context;

/// Derive macro for the root DI context.
///
/// Generates one `FromRef<Ctx>` implementation per field type. Field types
/// must be `Clone` and pairwise distinct.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub store: AppStore,
///     pub config: Arc<Config>,
///     pub modes: Arc<ModeRegistry>,
/// }
///
/// // impl FromRef<Context> for AppStore { ... }
/// // impl FromRef<Context> for Arc<Config> { ... }
/// // impl FromRef<Context> for Arc<ModeRegistry> { ... }
/// ```
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Derive macro for services resolved from a context.
///
/// Every field type must implement `FromRef<Context>`. The context type
/// defaults to `Context` in scope and can be overridden with
/// `#[from_context(Context = "path::To::Ctx")]`.
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct GraphExporter {
///     store: AppStore,      // <AppStore as FromRef<Context>>::from_ref(ctx)
///     config: Arc<Config>,
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}
