/* SPDX-License-Identifier: MIT
 * Copyright(c) 2023 Darek Stojaczyk
 */

extern crate proc_macro;
extern crate syn;
#[macro_use]
extern crate quote;

mod enum_parse;

#[allow(clippy::from_str_radix_10)]
fn parse_int(str: &str) -> Result<usize, std::num::ParseIntError> {
    if let Some(str) = str.strip_prefix("0x") {
        usize::from_str_radix(str, 16)
    } else {
        usize::from_str_radix(str, 10)
    }
}

#[proc_macro_attribute]
pub fn packet(
    attr: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let id = if !attr.to_string().is_empty() {
        Some(
            parse_int(attr.to_string().as_str())
                .expect("Malformed ID attribute. Expecting e.g.: #[packet(0x42)]"),
        )
    } else {
        None
    };

    let ast = syn::parse_macro_input!(input as syn::DeriveInput);
    let packet_vis = ast.vis;
    let packet_attrs = ast.attrs;
    let (impl_generics, type_generics, where_clause) = ast.generics.split_for_impl();
    let packet_ident = ast.ident;

    // Extract the fields
    let mut fields: Vec<syn::Field> = match ast.data {
        syn::Data::Struct(data_struct) => data_struct.fields.into_iter().collect(),
        _ => panic!("#[packet] expects a struct"),
    };

    // Set visibility to each field
    for f in fields.iter_mut() {
        f.vis = packet_vis.clone();
    }

    // Re-create the original struct
    let mut ret_stream = quote! {
        #(#packet_attrs)*
        #[derive(std::fmt::Debug, PartialEq, Clone, Default, ::bincode::Encode, ::bincode::Decode)]
        #packet_vis struct #packet_ident #impl_generics #where_clause {
            #(#fields),*
        }
    };

    if let Some(id) = id {
        let Ok(id) = u16::try_from(id) else {
            panic!("Packet ID greater than u16::MAX");
        };

        ret_stream.extend(quote! {
            impl #packet_ident #type_generics #where_clause {
                pub const ID: u16 = #id;
            }
            impl #impl_generics crate::Payload for #packet_ident #type_generics #where_clause {
                fn id(&self) -> u16 {
                    Self::ID
                }

                fn serialize_no_hdr(&self, dst: &mut Vec<u8>) -> Result<usize, crate::PayloadSerializeError> {
                    Ok(::bincode::encode_into_std_write(self, dst, ::bincode::config::legacy())?)
                }
            }
        });
    }

    ret_stream.into()
}

#[proc_macro_derive(PacketEnum)]
pub fn derive_packet_enum(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let enum_parse::EnumInfo { name, repr } = syn::parse_macro_input!(input);

    quote! {
        impl ::bincode::Encode for #name {
            fn encode<E: ::bincode::enc::Encoder>(
                &self,
                encoder: &mut E,
            ) -> std::result::Result<(), ::bincode::error::EncodeError> {
                let val = #repr::from(*self);
                ::bincode::enc::write::Writer::write(encoder.writer(), &val.to_le_bytes())
            }
        }

        impl ::bincode::Decode for #name {
            fn decode<D: ::bincode::de::Decoder>(
                decoder: &mut D,
            ) -> std::result::Result<Self, ::bincode::error::DecodeError> {
                let mut buf = [0u8; std::mem::size_of::<#repr>()];
                ::bincode::de::read::Reader::read(decoder.reader(), &mut buf)?;
                let val = #repr::from_le_bytes(buf);

                Self::try_from(val).map_err(|e| {
                    ::bincode::error::DecodeError::OtherString(format!(
                        "Cannot convert {val} to {}: {e}",
                        stringify!(#name)
                    ))
                })
            }
        }

        impl<'de> ::bincode::BorrowDecode<'de> for #name {
            fn borrow_decode<D: ::bincode::de::BorrowDecoder<'de>>(
                decoder: &mut D,
            ) -> std::result::Result<Self, ::bincode::error::DecodeError> {
                <Self as ::bincode::Decode>::decode(decoder)
            }
        }
    }
    .into()
}

/// Dispatch enum over a list of packets. Each unit variant names the
/// packet struct it wraps. An `Unknown` variant catches all other ids.
#[proc_macro_attribute]
pub fn packet_list(
    _: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    let syn::Data::Enum(data_enum) = input.data else {
        panic!("#[packet_list] expects enum");
    };
    let enum_attrs = input.attrs;
    let enum_vis = input.vis;
    let enum_name = input.ident;

    let packets: Vec<syn::Ident> = data_enum
        .variants
        .into_iter()
        .map(|variant| {
            if !matches!(variant.fields, syn::Fields::Unit) {
                panic!("#[packet_list] variants can't have fields");
            }
            variant.ident
        })
        .collect();

    quote! {
        #(#enum_attrs)*
        #[derive(PartialEq, Clone)]
        #enum_vis enum #enum_name {
            Unknown(Unknown),
            #(#packets(#packets),)*
        }

        impl crate::PacketList for #enum_name {
            fn deserialize_with_id(id: u16, data: &[u8]) -> Result<Self, crate::PayloadDeserializeError> {
                fn decode<P: ::bincode::Decode>(data: &[u8]) -> Result<P, crate::PayloadDeserializeError> {
                    let (obj, _) = ::bincode::decode_from_slice::<P, _>(data, ::bincode::config::legacy())?;
                    Ok(obj)
                }

                Ok(match id {
                    #(#packets::ID => Self::#packets(decode(data)?),)*
                    _ => Self::Unknown(Unknown { id, data: crate::UnboundVec(data.into()) }),
                })
            }
        }

        impl crate::Payload for #enum_name {
            fn id(&self) -> u16 {
                match self {
                    Self::Unknown(inner) => crate::Payload::id(inner),
                    #(Self::#packets(inner) => crate::Payload::id(inner),)*
                }
            }

            fn serialize_no_hdr(&self, dst: &mut Vec<u8>) -> Result<usize, crate::PayloadSerializeError> {
                match self {
                    Self::Unknown(inner) => crate::Payload::serialize_no_hdr(inner, dst),
                    #(Self::#packets(inner) => crate::Payload::serialize_no_hdr(inner, dst),)*
                }
            }
        }

        impl ::std::fmt::Debug for #enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    Self::Unknown(inner) => ::std::fmt::Debug::fmt(inner, f),
                    #(Self::#packets(inner) => ::std::fmt::Debug::fmt(inner, f),)*
                }
            }
        }
    }
    .into()
}
