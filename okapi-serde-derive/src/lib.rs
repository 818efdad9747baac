//! Derive macros for the Okapi consensus serialization traits.
//!
//! `#[derive(OkSerialize)]` and `#[derive(OkDeserialize)]` generate
//! field-by-field implementations of the `OkapiSerialize` and
//! `OkapiDeserialize` traits defined in `okapi_chain::serialization`. The
//! deriving module must have `OkapiSerialize`, `OkapiDeserialize`, and
//! `SerializationError` in scope.
//!
//! Only structs are supported; enums with non-uniform wire encodings (such as
//! transaction inputs, where the coinbase sentinel changes the layout) are
//! implemented by hand.

extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(OkSerialize)]
pub fn ok_serialize(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).expect("OkSerialize derive input must parse");
    serialize::impl_serialize(&ast)
}

#[proc_macro_derive(OkDeserialize)]
pub fn ok_deserialize(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).expect("OkDeserialize derive input must parse");
    deserialize::impl_deserialize(&ast)
}
