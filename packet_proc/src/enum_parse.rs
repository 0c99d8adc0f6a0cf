/* SPDX-License-Identifier: MIT
 * Copyright(c) 2023 Darek Stojaczyk
 */

//! Minimal `#[repr(uN)]` enum parsing for `#[derive(PacketEnum)]`.

use syn::{
    parse::{Parse, ParseStream},
    Attribute, DeriveInput, Ident, Meta, Result,
};

pub(crate) struct EnumInfo {
    pub(crate) name: Ident,
    pub(crate) repr: Ident,
}

fn find_repr(input: &DeriveInput) -> Result<Ident> {
    let repr_attr = input
        .attrs
        .iter()
        .find(|attr: &&Attribute| match &attr.meta {
            Meta::List(list) => list.path.is_ident("repr"),
            _ => false,
        })
        .ok_or_else(|| {
            syn::Error::new_spanned(&input.ident, "Missing `#[repr(Integer)]` attribute")
        })?;

    let repr: Ident = repr_attr.parse_args()?;
    if repr == "C" {
        return Err(syn::Error::new_spanned(
            repr,
            "repr(C) doesn't have a well defined size",
        ));
    }
    Ok(repr)
}

impl Parse for EnumInfo {
    fn parse(input: ParseStream) -> Result<Self> {
        let input: DeriveInput = input.parse()?;
        if !matches!(input.data, syn::Data::Enum(_)) {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "#[derive(PacketEnum)] expects an enum",
            ));
        }
        let repr = find_repr(&input)?;
        Ok(EnumInfo {
            name: input.ident,
            repr,
        })
    }
}
