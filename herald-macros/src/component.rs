// `#[component(...)]` implementation.
//
// Grounded on `runar-macros/src/service.rs`'s `service_macro`: parse a
// simple `key = "value"` attribute list, walk the impl block's tagged
// methods, and emit generated code alongside the untouched input. Here
// the generated code is a `ComponentDescriptor` submitted to `inventory`
// instead of an `AbstractService` trait impl.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use std::collections::HashMap;
use syn::{parse_macro_input, Ident, ImplItem, ItemImpl, Type, TypePath};

pub fn component_macro(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as ItemImpl);

    let struct_type = match &*input.self_ty {
        Type::Path(TypePath { path, .. }) => path.segments.last().unwrap().ident.clone(),
        _ => panic!("component macro can only be applied to an impl block for a named struct"),
    };

    let attrs = parse_attrs(attr);
    let provides: Vec<String> = attrs
        .get("provides")
        .map(|v| v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let requires: Vec<String> = attrs
        .get("requires")
        .map(|v| v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let requires_optional: Vec<String> = attrs
        .get("requires_optional")
        .map(|v| v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let name = attrs.get("name").cloned().unwrap_or_else(|| struct_type.to_string().to_lowercase());

    // Hooks are bound against a fresh `Default::default()` instance: the
    // container's `ComponentSpec` is a value describing the component
    // type, not an owner of a particular instance, so a stateless
    // component (the common case — see `Led` in the demo) is constructed
    // on demand when a hook fires.
    let hook_idents = collect_hooks(&input);
    strip_hook_attrs(&mut input);
    let validate_call = hook_idents
        .validate
        .as_ref()
        .map(|m| quote! { Some(std::boxed::Box::new(move || #struct_type::default().#m())) });
    let invalidate_call = hook_idents
        .invalidate
        .as_ref()
        .map(|m| quote! { Some(std::boxed::Box::new(move || #struct_type::default().#m())) });

    let descriptor_ident = format_ident!("__HERALD_COMPONENT_{}", struct_type.to_string().to_uppercase());

    let validate_field = validate_call.unwrap_or_else(|| quote! { None });
    let invalidate_field = invalidate_call.unwrap_or_else(|| quote! { None });

    let registration = quote! {
        #[allow(non_upper_case_globals)]
        fn #descriptor_ident() -> herald_node::container::ComponentSpec {
            let mut spec = herald_node::container::ComponentSpec::new(#name);
            #(spec = spec.provides(#provides);)*
            #(spec = spec.requires(#requires, false);)*
            #(spec = spec.requires(#requires_optional, true);)*
            spec.hooks.validate = #validate_field;
            spec.hooks.invalidate = #invalidate_field;
            spec
        }

        ::inventory::submit! {
            herald_node::container::ComponentDescriptor { build: #descriptor_ident }
        }
    };

    TokenStream::from(quote! {
        #input
        #registration
    })
}

struct Hooks {
    validate: Option<Ident>,
    invalidate: Option<Ident>,
}

const HOOK_ATTR_NAMES: [&str; 4] = ["validate", "invalidate", "bind_field", "unbind_field"];

/// Removes the `#[validate]`/`#[invalidate]`/`#[bind_field]`/`#[unbind_field]`
/// markers from the impl block before it's re-emitted: they're inert markers
/// this macro reads during `collect_hooks`, not real attribute macros, and a
/// plain `#[proc_macro_attribute]` (unlike a derive with `attributes(...)`)
/// has no way to declare them as known attributes for rustc to accept.
fn strip_hook_attrs(input: &mut ItemImpl) {
    for item in &mut input.items {
        if let ImplItem::Fn(method) = item {
            method.attrs.retain(|a| !HOOK_ATTR_NAMES.iter().any(|name| a.path().is_ident(name)));
        }
    }
}

fn collect_hooks(input: &ItemImpl) -> Hooks {
    let mut hooks = Hooks {
        validate: None,
        invalidate: None,
    };
    for item in &input.items {
        if let ImplItem::Fn(method) = item {
            if method.attrs.iter().any(|a| a.path().is_ident("validate")) {
                hooks.validate = Some(method.sig.ident.clone());
            }
            if method.attrs.iter().any(|a| a.path().is_ident("invalidate")) {
                hooks.invalidate = Some(method.sig.ident.clone());
            }
        }
    }
    hooks
}

fn parse_attrs(attr: TokenStream) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    if attr.is_empty() {
        return attrs;
    }
    let attr_str = attr.to_string();
    for pair in attr_str.split(',') {
        let parts: Vec<&str> = pair.splitn(2, '=').collect();
        if parts.len() == 2 {
            let key = parts[0].trim().to_string();
            let value_part = parts[1].trim();
            if value_part.starts_with('"') && value_part.ends_with('"') && value_part.len() >= 2 {
                attrs.insert(key, value_part[1..value_part.len() - 1].to_string());
            }
        }
    }
    attrs
}
