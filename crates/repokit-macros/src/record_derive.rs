//! Implementation of the Record derive macro.
//!
//! This module generates the `Record` implementation at compile time based on
//! `#[record(...)]` struct and field attributes.

use proc_macro2::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{
    Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, LitStr, PathArguments, Result,
    Type, Visibility,
};

/// Parsed definition of a struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    /// The struct name.
    pub name: Ident,
    /// The struct visibility, reused for generated descriptor constants.
    pub vis: Visibility,
    /// Table name.
    pub table: String,
    /// Parsed fields.
    pub fields: Vec<RecordFieldDef>,
}

/// Navigation shape declared on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationShape {
    /// `reference(...)` on a `Related<R>` field.
    Reference,
    /// `collection(...)` on a `RelatedMany<R>` field.
    Collection,
}

/// Parsed navigation attribute.
#[derive(Debug)]
pub struct NavigationDef {
    /// Reference or collection.
    pub shape: NavigationShape,
    /// The related record type `R`.
    pub target: Type,
    /// Owner-side foreign key column.
    pub local_key: Option<String>,
    /// Target-side foreign key column.
    pub remote_key: Option<String>,
}

/// Parsed attributes of a single field.
#[derive(Debug)]
pub struct RecordFieldDef {
    /// The field name.
    pub name: Ident,
    /// The field type.
    pub ty: Type,
    /// Column name.
    pub column: String,
    /// `#[record(primary_key)]`.
    pub primary_key: bool,
    /// `#[record(generated)]`.
    pub generated: bool,
    /// `#[record(row_version)]`.
    pub row_version: bool,
    /// `#[record(soft_delete)]`.
    pub soft_delete: bool,
    /// `#[record(deleted_at)]`.
    pub deleted_at: bool,
    /// `#[record(skip)]`: not persisted, defaulted on load.
    pub skip: bool,
    /// Navigation declaration, if this is a navigation field.
    pub navigation: Option<NavigationDef>,
}

impl RecordFieldDef {
    fn is_column(&self) -> bool {
        !self.skip && self.navigation.is_none()
    }
}

/// Parse a `DeriveInput` into a `RecordDef`.
pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let name = input.ident.clone();
    let mut table = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                let attr_name = meta.path.to_token_stream().to_string();
                Err(meta.error(format!(
                    "unknown record attribute `{attr_name}`. Valid struct attributes are: table"
                )))
            }
        })?;
    }

    let fields = match &input.data {
        Data::Struct(data) => parse_record_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not unions",
            ));
        }
    };

    Ok(RecordDef {
        table: table.unwrap_or_else(|| default_table_name(&name.to_string())),
        name,
        vis: input.vis.clone(),
        fields,
    })
}

/// `HeroPower` -> `hero_powers`.
fn default_table_name(struct_name: &str) -> String {
    let mut out = String::with_capacity(struct_name.len() + 4);
    for (i, ch) in struct_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out.push('s');
    out
}

/// Parse all fields from a struct.
fn parse_record_fields(fields: &Fields) -> Result<Vec<RecordFieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_record_field).collect(),
        Fields::Unnamed(_) | Fields::Unit => Err(Error::new_spanned(
            fields,
            "Record requires a struct with named fields",
        )),
    }
}

/// Parse a single field and its `#[record(...)]` attributes.
fn parse_record_field(field: &Field) -> Result<RecordFieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut def = RecordFieldDef {
        column: name.to_string(),
        name,
        ty: field.ty.clone(),
        primary_key: false,
        generated: false,
        row_version: false,
        soft_delete: false,
        deleted_at: false,
        skip: false,
        navigation: None,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("primary_key") {
                def.primary_key = true;
            } else if path.is_ident("generated") {
                def.generated = true;
            } else if path.is_ident("row_version") {
                def.row_version = true;
            } else if path.is_ident("soft_delete") {
                def.soft_delete = true;
            } else if path.is_ident("deleted_at") {
                def.deleted_at = true;
            } else if path.is_ident("skip") {
                def.skip = true;
            } else if path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                def.column = value.value();
            } else if path.is_ident("reference") || path.is_ident("collection") {
                let shape = if path.is_ident("reference") {
                    NavigationShape::Reference
                } else {
                    NavigationShape::Collection
                };
                let mut local_key = None;
                let mut remote_key = None;
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("local_key") {
                        let value: LitStr = inner.value()?.parse()?;
                        local_key = Some(value.value());
                        Ok(())
                    } else if inner.path.is_ident("remote_key") {
                        let value: LitStr = inner.value()?.parse()?;
                        remote_key = Some(value.value());
                        Ok(())
                    } else {
                        Err(inner.error("expected `local_key = \"...\"` or `remote_key = \"...\"`"))
                    }
                })?;
                def.navigation = Some(parse_navigation(
                    &field.ty, shape, local_key, remote_key,
                )?);
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown record attribute `{attr_name}`. \
                     Valid attributes are: primary_key, generated, row_version, soft_delete, \
                     deleted_at, column, skip, reference, collection"
                )));
            }

            Ok(())
        })?;
    }

    Ok(def)
}

/// Validate a navigation declaration against the field type.
fn parse_navigation(
    ty: &Type,
    shape: NavigationShape,
    local_key: Option<String>,
    remote_key: Option<String>,
) -> Result<NavigationDef> {
    let wrapper = match shape {
        NavigationShape::Reference => "Related",
        NavigationShape::Collection => "RelatedMany",
    };
    let target = extract_wrapper_inner(ty, wrapper).ok_or_else(|| {
        Error::new_spanned(ty, format!("navigation field must have type `{wrapper}<R>`"))
    })?;

    match (shape, &local_key, &remote_key) {
        (_, Some(_), Some(_)) => Err(Error::new_spanned(
            ty,
            "declare either `local_key` or `remote_key`, not both",
        )),
        (_, None, None) => Err(Error::new_spanned(
            ty,
            "navigation requires `local_key = \"...\"` or `remote_key = \"...\"`",
        )),
        (NavigationShape::Collection, Some(_), None) => Err(Error::new_spanned(
            ty,
            "collection navigations join on the target: use `remote_key = \"...\"`",
        )),
        _ => Ok(NavigationDef {
            shape,
            target: target.clone(),
            local_key,
            remote_key,
        }),
    }
}

/// Check if a type is `Option<T>`.
fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// Extract `R` from `Wrapper<R>`.
fn extract_wrapper_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == wrapper {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return Some(inner);
                    }
                }
            }
        }
    }
    None
}

/// Generate the `Record` implementation and navigation descriptors.
pub fn generate_record_impl(def: &RecordDef) -> TokenStream {
    let name = &def.name;
    let name_str = name.to_string();
    let table = &def.table;

    let field_infos = def
        .fields
        .iter()
        .filter(|f| f.is_column())
        .map(generate_field_info);

    let navigation_infos = def
        .fields
        .iter()
        .filter_map(|f| f.navigation.as_ref().map(|nav| (f, nav)))
        .map(|(f, nav)| generate_navigation_info(f, nav));

    let to_row_entries = def.fields.iter().filter(|f| f.is_column()).map(|f| {
        let field_name = &f.name;
        let column = &f.column;
        quote! {
            (#column, ::repokit_core::Value::from(::core::clone::Clone::clone(&self.#field_name)))
        }
    });

    let from_row_fields = def.fields.iter().map(|f| {
        let field_name = &f.name;
        let column = &f.column;
        let navigation_name = field_name.to_string();
        match (&f.navigation, f.skip) {
            (_, true) => quote! { #field_name: ::core::default::Default::default() },
            (Some(nav), false) if nav.shape == NavigationShape::Reference => {
                quote! { #field_name: row.related_one(#navigation_name)? }
            }
            (Some(_), false) => quote! { #field_name: row.related_many(#navigation_name)? },
            (None, false) => quote! { #field_name: row.get_as(#column)? },
        }
    });

    let apply_row_fields = def.fields.iter().filter(|f| f.is_column()).map(|f| {
        let field_name = &f.name;
        let column = &f.column;
        quote! {
            if let ::core::option::Option::Some(value) = row.get(#column) {
                self.#field_name = ::repokit_core::FromValue::from_value(#column, value)?;
            }
        }
    });

    let descriptors = generate_navigation_descriptors(def);

    quote! {
        impl ::repokit_core::Record for #name {
            fn entity_type() -> &'static ::repokit_core::EntityType {
                static FIELDS: &[::repokit_core::FieldInfo] = &[#(#field_infos),*];
                static NAVIGATIONS: &[::repokit_core::NavigationInfo] = &[#(#navigation_infos),*];
                static ENTITY: ::repokit_core::EntityType =
                    ::repokit_core::EntityType::new(#name_str, #table, FIELDS, NAVIGATIONS);
                &ENTITY
            }

            fn to_row(&self) -> ::std::vec::Vec<(&'static str, ::repokit_core::Value)> {
                ::std::vec![#(#to_row_entries),*]
            }

            fn from_row(row: &::repokit_core::Row) -> ::repokit_core::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#from_row_fields),*
                })
            }

            fn apply_row(&mut self, row: &::repokit_core::Row) -> ::repokit_core::Result<()> {
                #(#apply_row_fields)*
                ::core::result::Result::Ok(())
            }
        }

        #descriptors
    }
}

/// Generate the `FieldInfo` expression for a column field.
fn generate_field_info(field: &RecordFieldDef) -> TokenStream {
    let name = field.name.to_string();
    let column = &field.column;
    let nullable = is_option_type(&field.ty);
    let primary_key = field.primary_key;
    let generated = field.generated;
    let row_version = field.row_version;
    let soft_delete = field.soft_delete;
    let deleted_at = field.deleted_at;

    quote! {
        ::repokit_core::FieldInfo::new(#name, #column)
            .nullable(#nullable)
            .primary_key(#primary_key)
            .store_generated(#generated)
            .concurrency_token(#row_version)
            .soft_delete_flag(#soft_delete)
            .deletion_timestamp(#deleted_at)
    }
}

/// Generate the `NavigationInfo` expression for a navigation field.
fn generate_navigation_info(field: &RecordFieldDef, nav: &NavigationDef) -> TokenStream {
    let name = field.name.to_string();
    let target = &nav.target;
    let kind = match nav.shape {
        NavigationShape::Reference => quote! { ::repokit_core::NavigationKind::Reference },
        NavigationShape::Collection => quote! { ::repokit_core::NavigationKind::Collection },
    };
    let local_key = nav
        .local_key
        .as_ref()
        .map(|key| quote! { .local_key(#key) });
    let remote_key = nav
        .remote_key
        .as_ref()
        .map(|key| quote! { .remote_key(#key) });

    quote! {
        ::repokit_core::NavigationInfo::new(
            #name,
            #kind,
            <#target as ::repokit_core::Record>::entity_type,
        )
        #local_key
        #remote_key
    }
}

/// Generate `Reference`/`Collection` constants and their accessor functions.
fn generate_navigation_descriptors(def: &RecordDef) -> TokenStream {
    let name = &def.name;
    let vis = &def.vis;

    let items: Vec<TokenStream> = def
        .fields
        .iter()
        .filter_map(|f| f.navigation.as_ref().map(|nav| (f, nav)))
        .map(|(f, nav)| {
            let field_name = &f.name;
            let navigation_name = field_name.to_string();
            let const_name = format_ident!("{}", navigation_name.to_uppercase());
            let get = format_ident!("__repokit_{}_slot", navigation_name);
            let get_mut = format_ident!("__repokit_{}_slot_mut", navigation_name);
            let target = &nav.target;
            let (descriptor, slot) = match nav.shape {
                NavigationShape::Reference => (
                    quote! { ::repokit_core::Reference },
                    quote! { ::repokit_core::Related },
                ),
                NavigationShape::Collection => (
                    quote! { ::repokit_core::Collection },
                    quote! { ::repokit_core::RelatedMany },
                ),
            };
            let doc = format!("Navigation descriptor for `{name}.{navigation_name}`.");

            quote! {
                #[doc = #doc]
                #vis const #const_name: #descriptor<#name, #target> =
                    #descriptor::new(#navigation_name, Self::#get, Self::#get_mut);

                #[doc(hidden)]
                fn #get(record: &Self) -> &#slot<#target> {
                    &record.#field_name
                }

                #[doc(hidden)]
                fn #get_mut(record: &mut Self) -> &mut #slot<#target> {
                    &mut record.#field_name
                }
            }
        })
        .collect();

    if items.is_empty() {
        return TokenStream::new();
    }

    quote! {
        impl #name {
            #(#items)*
        }
    }
}
