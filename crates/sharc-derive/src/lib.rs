//! Derive macro for the `SharedFromThis` trait.

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned, ToTokens};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Data, DeriveInput, Field, Fields, Index,
    Path, Type,
};

/// Implements `SharedFromThis` by pointing `self_cell` at a `SelfCell<Self>` field.
///
/// The field is either the one marked `#[sharc(self_cell)]`, or the only field
/// whose type is spelled `SelfCell<..>`.
///
/// `#[sharc(crate = path)]` on the struct overrides the path of the `sharc`
/// crate in the generated code.
#[proc_macro_derive(SharedFromThis, attributes(sharc))]
pub fn derive_shared_from_this(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let krate = crate_path(input)?;

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(e) => {
            return Ok(quote_spanned! {
                e.enum_token.span => compile_error!("`SharedFromThis` can only be derived for structs");
            });
        }
        Data::Union(u) => {
            return Ok(quote_spanned! {
                u.union_token.span => compile_error!("`SharedFromThis` can only be derived for structs");
            });
        }
    };

    let accessor = self_cell_accessor(input, fields)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::SharedFromThis for #name #ty_generics #where_clause {
            #[inline]
            fn self_cell(&self) -> &#krate::SelfCell<Self> {
                &self.#accessor
            }
        }
    })
}

fn crate_path(input: &DeriveInput) -> syn::Result<Path> {
    let mut krate: Path = parse_quote!(::sharc);

    for attr in &input.attrs {
        if !attr.path().is_ident("sharc") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                krate = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;
    }

    Ok(krate)
}

/// Returns the member expression (`name` or `0`) of the self-reference field.
fn self_cell_accessor(input: &DeriveInput, fields: &Fields) -> syn::Result<TokenStream> {
    let fields: Vec<&Field> = fields.iter().collect();

    let mut marked = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        if is_marked(field)? {
            marked.push(index);
        }
    }

    let chosen = match marked.as_slice() {
        [index] => *index,
        [] => {
            let candidates: Vec<usize> = fields
                .iter()
                .enumerate()
                .filter(|(_, field)| is_self_cell_type(&field.ty))
                .map(|(index, _)| index)
                .collect();
            match candidates.as_slice() {
                [index] => *index,
                [] => {
                    return Err(syn::Error::new_spanned(
                        &input.ident,
                        "`SharedFromThis` needs a `SelfCell<Self>` field",
                    ));
                }
                [_, second, ..] => {
                    return Err(syn::Error::new(
                        fields[*second].span(),
                        "several `SelfCell` fields; mark one with #[sharc(self_cell)]",
                    ));
                }
            }
        }
        [_, second, ..] => {
            return Err(syn::Error::new(
                fields[*second].span(),
                "only one field may be marked #[sharc(self_cell)]",
            ));
        }
    };

    let field = fields[chosen];
    Ok(field.ident.as_ref().map_or_else(
        || Index::from(chosen).into_token_stream(),
        ToTokens::to_token_stream,
    ))
}

fn is_marked(field: &Field) -> syn::Result<bool> {
    let mut marked = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("sharc") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("self_cell") {
                marked = true;
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;
    }
    Ok(marked)
}

fn is_self_cell_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "SelfCell"),
        Type::Group(group) => is_self_cell_type(&group.elem),
        Type::Paren(paren) => is_self_cell_type(&paren.elem),
        _ => false,
    }
}
