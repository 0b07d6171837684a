//! # hclint-macros
//!
//! Derive macro for decoding hclint body content into typed values.
//!
//! ```ignore
//! use hclint_core::Decode;
//!
//! #[derive(Debug, Default, Decode)]
//! struct RuleConfig {
//!     #[hcl(attr = "exclude", optional)]
//!     exclude: Vec<String>,
//! }
//! ```
//!
//! Field attributes:
//!
//! - `#[hcl(attr = "name")]` / `#[hcl(attr)]` - required attribute, decoded
//!   through serde; the bare form uses the field name
//! - `#[hcl(attr = "name", optional)]` - attribute that may be absent
//! - `#[hcl(block = "type")]` - nested block; `Vec<T>` takes any number,
//!   `Option<T>` at most one and a bare `T` exactly one
//! - `#[hcl(label)]` / `#[hcl(label = "name")]` - block label, in field order
//!
//! Fields without `#[hcl]` are left at their default. `Option<_>` attribute
//! fields are never required. The container attribute `#[hcl(crate = "path")]`
//! overrides the path of the core crate (default `::hclint_core`).

#![forbid(unsafe_code)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, Ident, LitStr, Path,
    PathArguments, Type,
};

/// Derives `Decode` and the implied body schema for a struct.
#[proc_macro_derive(Decode, attributes(hcl))]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

enum Kind {
    Attr { name: String, optional: bool },
    Block { block_type: String },
    Label { name: String },
}

enum Shape<'a> {
    Bare(&'a Type),
    Option(&'a Type),
    Vec(&'a Type),
}

struct DecodeField<'a> {
    ident: &'a Ident,
    kind: Kind,
    shape: Shape<'a>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let krate = container_crate(input)?;
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Decode can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Decode can only be derived for structs with named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in &named.named {
        if let Some(parsed) = parse_field(field)? {
            fields.push(parsed);
        }
    }

    let schema = implied_schema(&krate, &fields);
    let decode_into = decode_into(&krate, &fields);
    let labels = labels(&krate, &fields);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::hclext::Decode for #name #ty_generics #where_clause {
            #schema
            #decode_into
            #labels
        }
    })
}

fn container_crate(input: &DeriveInput) -> syn::Result<Path> {
    let mut krate: Path = syn::parse_quote!(::hclint_core);
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("hcl")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let lit: LitStr = meta.value()?.parse()?;
                krate = lit.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported container attribute, expected `crate`"))
            }
        })?;
    }
    Ok(krate)
}

fn parse_field(field: &Field) -> syn::Result<Option<DecodeField<'_>>> {
    let Some(ident) = &field.ident else {
        return Ok(None);
    };
    let mut kind = None;
    let mut optional = false;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("hcl")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("attr") {
                let name = if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse::<LitStr>()?.value()
                } else {
                    ident.to_string()
                };
                kind = Some(Kind::Attr {
                    name,
                    optional: false,
                });
            } else if meta.path.is_ident("optional") {
                optional = true;
            } else if meta.path.is_ident("block") {
                let lit: LitStr = meta.value()?.parse()?;
                kind = Some(Kind::Block {
                    block_type: lit.value(),
                });
            } else if meta.path.is_ident("label") {
                let name = if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse::<LitStr>()?.value()
                } else {
                    ident.to_string()
                };
                kind = Some(Kind::Label { name });
            } else if meta.path.is_ident("remain") || meta.path.is_ident("body") {
                return Err(meta.error(
                    "`remain` and `body` are accepted by HCL decoding but cannot be expressed in a schema",
                ));
            } else {
                return Err(meta.error(
                    "unsupported hcl attribute, expected `attr`, `optional`, `block` or `label`",
                ));
            }
            Ok(())
        })?;
    }

    let Some(mut kind) = kind else {
        if optional {
            return Err(syn::Error::new_spanned(
                ident,
                "`optional` requires `attr`",
            ));
        }
        return Ok(None);
    };
    if let Kind::Attr { optional: opt, .. } = &mut kind {
        *opt = optional;
    } else if optional {
        return Err(syn::Error::new_spanned(
            ident,
            "`optional` only applies to attributes",
        ));
    }

    let shape = shape_of(&field.ty);
    match (&kind, &shape) {
        (Kind::Label { .. }, Shape::Bare(ty)) if last_segment_is(ty, "String") => {}
        (Kind::Label { .. }, _) => {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "label fields must be of type `String`",
            ));
        }
        (Kind::Block { .. }, Shape::Option(inner) | Shape::Vec(inner) | Shape::Bare(inner))
            if last_segment_is(inner, "Expression") =>
        {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "block fields must be structs deriving `Decode`",
            ));
        }
        _ => {}
    }

    Ok(Some(DecodeField { ident, kind, shape }))
}

fn shape_of(ty: &Type) -> Shape<'_> {
    if let Some(inner) = generic_inner(ty, "Option") {
        Shape::Option(inner)
    } else if let Some(inner) = generic_inner(ty, "Vec") {
        Shape::Vec(inner)
    } else {
        Shape::Bare(ty)
    }
}

fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn last_segment_is(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == name),
        _ => false,
    }
}

fn implied_schema(krate: &Path, fields: &[DecodeField<'_>]) -> TokenStream2 {
    let mut attrs: Vec<(&str, bool)> = fields
        .iter()
        .filter_map(|f| match &f.kind {
            Kind::Attr { name, optional } => {
                let required = !optional && !matches!(f.shape, Shape::Option(_));
                Some((name.as_str(), required))
            }
            _ => None,
        })
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));

    let mut blocks: Vec<(&str, &Type)> = fields
        .iter()
        .filter_map(|f| match (&f.kind, &f.shape) {
            (Kind::Block { block_type }, Shape::Bare(ty) | Shape::Option(ty) | Shape::Vec(ty)) => {
                Some((block_type.as_str(), *ty))
            }
            _ => None,
        })
        .collect();
    blocks.sort_by(|a, b| a.0.cmp(b.0));

    let attrs = attrs.iter().map(|(name, required)| {
        quote! {
            #krate::hclext::AttributeSchema {
                name: ::std::string::String::from(#name),
                required: #required,
            }
        }
    });
    let blocks = blocks.iter().map(|(block_type, ty)| {
        quote! {
            #krate::hclext::BlockSchema {
                block_type: ::std::string::String::from(#block_type),
                label_names: <#ty as #krate::hclext::Decode>::label_names(),
                body: ::std::option::Option::Some(<#ty as #krate::hclext::Decode>::implied_schema()),
            }
        }
    });

    quote! {
        fn implied_schema() -> #krate::hclext::BodySchema {
            #krate::hclext::BodySchema {
                mode: #krate::hclext::SchemaMode::Default,
                attributes: ::std::vec![#(#attrs),*],
                blocks: ::std::vec![#(#blocks),*],
            }
        }
    }
}

fn decode_into(krate: &Path, fields: &[DecodeField<'_>]) -> TokenStream2 {
    let decode = quote!(#krate::hclext::decode);
    let steps = fields.iter().filter_map(|f| {
        let ident = f.ident;
        match (&f.kind, &f.shape) {
            (Kind::Attr { name, .. }, Shape::Option(inner)) if last_segment_is(inner, "Expression") => {
                Some(quote! {
                    if let ::std::option::Option::Some(value) =
                        #decode::attribute_expression(content, #name, false, &mut diags)
                    {
                        self.#ident = ::std::option::Option::Some(value);
                    }
                })
            }
            (Kind::Attr { name, optional }, Shape::Bare(ty)) if last_segment_is(ty, "Expression") => {
                let required = !optional;
                Some(quote! {
                    if let ::std::option::Option::Some(value) =
                        #decode::attribute_expression(content, #name, #required, &mut diags)
                    {
                        self.#ident = value;
                    }
                })
            }
            (Kind::Attr { name, optional }, shape) => {
                let required = !optional && !matches!(shape, Shape::Option(_));
                Some(quote! {
                    if let ::std::option::Option::Some(value) =
                        #decode::attribute(content, #name, #required, ctx, &mut diags)
                    {
                        self.#ident = value;
                    }
                })
            }
            (Kind::Block { block_type }, Shape::Vec(_)) => Some(quote! {
                #decode::block_list(&mut self.#ident, content, #block_type, ctx, &mut diags);
            }),
            (Kind::Block { block_type }, Shape::Option(_)) => Some(quote! {
                #decode::optional_block(&mut self.#ident, content, #block_type, ctx, &mut diags);
            }),
            (Kind::Block { block_type }, Shape::Bare(_)) => Some(quote! {
                #decode::required_block(&mut self.#ident, content, #block_type, ctx, &mut diags);
            }),
            (Kind::Label { .. }, _) => None,
        }
    });

    quote! {
        fn decode_into(
            &mut self,
            content: &#krate::hclext::BodyContent,
            ctx: ::std::option::Option<&#krate::hcl::eval::Context<'_>>,
        ) -> #krate::hclext::Diagnostics {
            let _ = ctx;
            let mut diags = #krate::hclext::Diagnostics::new();
            #(#steps)*
            diags
        }
    }
}

fn labels(krate: &Path, fields: &[DecodeField<'_>]) -> TokenStream2 {
    let labels: Vec<(&Ident, &str)> = fields
        .iter()
        .filter_map(|f| match &f.kind {
            Kind::Label { name } => Some((f.ident, name.as_str())),
            _ => None,
        })
        .collect();
    if labels.is_empty() {
        return TokenStream2::new();
    }

    let names = labels.iter().map(|(_, name)| name);
    let assigns = labels.iter().enumerate().map(|(index, (ident, _))| {
        quote! {
            if let ::std::option::Option::Some(label) = block.labels.get(#index) {
                self.#ident = ::std::clone::Clone::clone(label);
            }
        }
    });

    quote! {
        fn label_names() -> ::std::vec::Vec<::std::string::String> {
            ::std::vec![#(::std::string::String::from(#names)),*]
        }

        fn decode_labels(
            &mut self,
            block: &#krate::hclext::Block,
        ) -> #krate::hclext::Diagnostics {
            let diags = #krate::hclext::decode::check_labels(
                block,
                &<Self as #krate::hclext::Decode>::label_names(),
            );
            if diags.has_errors() {
                return diags;
            }
            #(#assigns)*
            diags
        }
    }
}
