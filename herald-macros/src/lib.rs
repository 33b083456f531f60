//! Procedural macros for declaring Herald service components.
//!
//! The source used function decorators as a declarative DSL executed at
//! load-time on a shared mutable staging buffer. `#[component(...)]`
//! replaces that with a compile-time-checked builder: it reads the
//! attribute's `provides`/`requires` list and the impl block's
//! `#[validate]`/`#[invalidate]`/`#[bind_field]`/`#[unbind_field]`-tagged
//! methods, and emits an `inventory::submit!` registration so every
//! annotated component surfaces through `inventory::iter::<ComponentDescriptor>()`
//! without a central registration call site.

mod component;

use proc_macro::TokenStream;

/// Declares a struct's `impl` block as a Herald component.
///
/// ```ignore
/// #[component(provides = "led.on", requires = "herald.directory")]
/// impl Led {
///     #[validate]
///     fn validate(&self) -> Result<(), String> { Ok(()) }
/// }
/// ```
#[proc_macro_attribute]
pub fn component(attr: TokenStream, item: TokenStream) -> TokenStream {
    component::component_macro(attr, item)
}
