//! Derive macros for dcpuasm's keyword enums.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::{ToTokens, quote};

/// Collects the unit variants of an enum together with their lowercase names.
fn unit_variants(type_: &syn::DeriveInput, derive_name: &str) -> Vec<(syn::Ident, String)> {
	match &type_.data {
		syn::Data::Enum(enum_) => enum_
			.variants
			.iter()
			.map(|variant| match variant.fields {
				syn::Fields::Unit => (variant.ident.clone(), variant.ident.to_string().to_lowercase()),
				_ => panic!(
					"{derive_name} cannot be derived for enums containing non-unit variants; variant {} is not a unit.",
					variant.to_token_stream()
				),
			})
			.collect(),
		_ => panic!("{derive_name} cannot be derived for non-enum types."),
	}
}

/// Derives `crate::parser::Parse` for an enum of unit variants. Every variant is parsed from its lowercase name.
#[proc_macro_derive(Parse)]
pub fn parse_macro_derive(input: TokenStream) -> TokenStream {
	let type_ = syn::parse_macro_input!(input as syn::DeriveInput);
	let variants = unit_variants(&type_, "Parse");
	let name = &type_.ident;
	let name_string = name.to_string().to_lowercase();
	let variant_identifiers = variants.iter().map(|(identifier, _)| identifier).collect::<Vec<_>>();
	let variant_strings = variants.iter().map(|(_, string)| string).collect::<Vec<_>>();

	quote! {
		#[automatically_derived]
		impl crate::parser::Parse for #name {
			fn parse(
				value: &str,
				location: ::miette::SourceSpan,
				src: ::std::sync::Arc<crate::AssemblyCode>,
			) -> ::std::result::Result<Self, ::std::boxed::Box<crate::AssemblyError>> {
				Ok(match value {
					#( #variant_strings => Self::#variant_identifiers, )*
					_ => return Err(::std::boxed::Box::new(crate::AssemblyError::InvalidConstant {
						constant: value.into(),
						typename: #name_string.into(),
						location,
						src,
					})),
				})
			}

			fn is_valid(value: &str) -> bool {
				matches!(value, #( #variant_strings )|*)
			}
		}
	}
	.into()
}

/// Derives `crate::parser::VariantName`, which gives the lowercase name of each unit variant.
#[proc_macro_derive(VariantName)]
pub fn variant_name_derive(input: TokenStream) -> TokenStream {
	let type_ = syn::parse_macro_input!(input as syn::DeriveInput);
	let variants = unit_variants(&type_, "VariantName");
	let name = &type_.ident;
	let variant_identifiers = variants.iter().map(|(identifier, _)| identifier).collect::<Vec<_>>();
	let variant_strings = variants.iter().map(|(_, string)| string).collect::<Vec<_>>();

	quote! {
		#[automatically_derived]
		impl crate::parser::VariantName for #name {
			fn variant_name(&self) -> &'static str {
				match self {
					#( Self::#variant_identifiers => #variant_strings, )*
				}
			}
		}
	}
	.into()
}
