//! Proc macros for enumerated rule types.
//!
//! Provides `#[derive(RuleType)]` to generate the stable integer code and
//! display-name tables for fieldless enums.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Clone, Copy, RuleType)]
//! enum Skill {
//!     Athletics = 0,
//!     Acrobatics = 10,
//!     #[rule(name = "Sleight of Hand")]
//!     SleightOfHand = 11,
//! }
//! ```
//!
//! A variant's code is its explicit discriminant, or its position when the
//! enum declares none. Codes end up in saved data and exported documents, so
//! variants are only ever appended.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use std::collections::HashSet;
use syn::{parse_macro_input, Attribute, DeriveInput, Expr, Lit, Meta};

/// Derive macro for generating `RuleType` implementations.
///
/// # Attributes
///
/// - `#[rule(name = "...")]` on variants - Override the display name
///   (defaults to the variant name split into words)
#[proc_macro_derive(RuleType, attributes(rule))]
pub fn derive_rule_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_rule_type(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_rule_type(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = &input.ident;
    let kind = enum_name.to_string();

    let variants = match &input.data {
        syn::Data::Enum(data) => &data.variants,
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "RuleType derive only supports enums",
            ))
        }
    };

    if variants.is_empty() {
        return Err(syn::Error::new_spanned(
            &input,
            "RuleType derive needs at least one variant",
        ));
    }

    let mut idents = Vec::new();
    let mut codes = Vec::new();
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    for (position, variant) in variants.iter().enumerate() {
        if !matches!(variant.fields, syn::Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "RuleType variants cannot carry fields",
            ));
        }

        let code = match &variant.discriminant {
            Some((_, expr)) => discriminant_code(expr)?,
            None => position as u32,
        };
        if !seen.insert(code) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate rule code {code}"),
            ));
        }

        let name = get_rule_name(&variant.attrs)?
            .unwrap_or_else(|| split_words(&variant.ident.to_string()));

        idents.push(&variant.ident);
        codes.push(code);
        names.push(name);
    }

    Ok(quote! {
        impl ::questlog_core::rules::RuleType for #enum_name {
            const KIND: &'static str = #kind;

            fn code(&self) -> u32 {
                match self {
                    #( #enum_name::#idents => #codes, )*
                }
            }

            fn from_code(code: u32) -> ::std::option::Option<Self> {
                match code {
                    #( #codes => ::std::option::Option::Some(#enum_name::#idents), )*
                    _ => ::std::option::Option::None,
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    #( #enum_name::#idents => #names, )*
                }
            }

            fn all() -> &'static [Self] {
                &[ #( #enum_name::#idents ),* ]
            }
        }

        impl ::std::fmt::Display for #enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(::questlog_core::rules::RuleType::name(self))
            }
        }

        impl ::std::convert::From<#enum_name> for u32 {
            fn from(value: #enum_name) -> u32 {
                ::questlog_core::rules::RuleType::code(&value)
            }
        }

        impl ::std::convert::TryFrom<u32> for #enum_name {
            type Error = ::questlog_core::rules::UnknownCode;

            fn try_from(code: u32) -> ::std::result::Result<Self, Self::Error> {
                <#enum_name as ::questlog_core::rules::RuleType>::from_code(code)
                    .ok_or(::questlog_core::rules::UnknownCode { kind: #kind, code })
            }
        }
    })
}

fn discriminant_code(expr: &Expr) -> syn::Result<u32> {
    if let Expr::Lit(expr_lit) = expr {
        if let Lit::Int(int) = &expr_lit.lit {
            return int.base10_parse::<u32>();
        }
    }
    Err(syn::Error::new_spanned(
        expr,
        "RuleType codes must be integer literals",
    ))
}

fn get_rule_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident("rule") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("name") {
                    if let Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(Some(s.value()));
                        }
                    }
                }
                return Err(syn::Error::new_spanned(
                    nv,
                    "expected #[rule(name = \"...\")]",
                ));
            }
        }
    }
    Ok(None)
}

/// "LawfulGood" -> "Lawful Good".
fn split_words(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push(' ');
        }
        result.push(c);
    }
    result
}
