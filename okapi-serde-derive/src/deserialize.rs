use proc_macro::TokenStream;
use quote::quote;

pub fn impl_deserialize(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        _ => panic!("OkapiDeserialize can only be derived for structs"),
    };
    let is_tuple_struct = matches!(data.fields, syn::Fields::Unnamed(_));

    let statements: Vec<proc_macro2::TokenStream> = data
        .fields
        .iter()
        .map(deserialize_field)
        .collect();

    let constructor = if is_tuple_struct {
        quote! { #name ( #(#statements)* ) }
    } else {
        quote! { #name { #(#statements)* } }
    };

    let expanded = quote! {
        impl OkapiDeserialize for #name {
            fn okapi_deserialize<R: std::io::Read>(
                mut target: R,
            ) -> Result<Self, SerializationError> {
                Ok(#constructor)
            }
        }
    };
    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field) -> proc_macro2::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(ident) => {
            quote! { #ident: <#ty as OkapiDeserialize>::okapi_deserialize(&mut target)?, }
        }
        None => quote! { <#ty as OkapiDeserialize>::okapi_deserialize(&mut target)?, },
    }
}
