//! Rust renderer
//!
//! Namespaces become nested modules and classes become structs. Each struct
//! gets an inherent impl for properties and methods, a `<Type>Hooks` trait
//! with empty defaults for extension hooks, and an impl of its base's
//! `Overrides` trait for runtime overrides. Bases are embedded as a `base`
//! field reached through `Deref`.

use crate::descriptor::ScalarType;
use crate::graph::{
    walk_expr, walk_stmt, AttributeDecl, ClientType, Expr, GeneratedTypeGraph, Literal, Member,
    MethodDecl, MethodKind, PropertyDecl, Stmt, TypeDecl, TypeDeclKind, TypeReference, Visibility,
    Visitor, FRAMEWORK_NAMESPACE,
};
use crate::GeneratorError;
use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use indexmap::IndexMap;
use proc_macro2::{Ident, Literal as LiteralToken, Span, TokenStream};
use quote::quote;
use std::collections::HashSet;

/// Language name this renderer answers to
pub const LANGUAGE: &str = "Rust";

/// Crate the generated code depends on for runtime types
pub const RUNTIME_CRATE: &str = "domain_client";

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Identifiers that cannot be written raw
const RESERVED: &[&str] = &["self", "Self", "super", "crate", "_"];

/// Render the graph as one Rust source file
pub fn render(graph: &GeneratedTypeGraph) -> Result<String, GeneratorError> {
    let mut root = ModuleTree::default();
    for ns in graph.namespaces() {
        let node = root.node(&ns.name);
        for import in &ns.imports {
            let path = namespace_path(import);
            node.items.push(quote!(use #path::*;));
        }
        for decl in &ns.types {
            node.items.push(type_decl(decl));
        }
    }

    let file = syn::parse2::<syn::File>(root.into_tokens()).map_err(|e| {
        GeneratorError::CodeGenError(format!("generated code is not valid Rust: {}", e))
    })?;
    Ok(prettyplease::unparse(&file))
}

/// A valid identifier for `name`
///
/// Keywords become raw identifiers; names that cannot be raw get a trailing
/// underscore.
pub fn ident(name: &str) -> Ident {
    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }
    if RESERVED.contains(&cleaned.as_str()) {
        return Ident::new(&format!("{}_", cleaned), Span::call_site());
    }
    if KEYWORDS.contains(&cleaned.as_str()) {
        return Ident::new_raw(&cleaned, Span::call_site());
    }
    Ident::new(&cleaned, Span::call_site())
}

fn member_ident(name: &str) -> Ident {
    ident(&name.to_snake_case())
}

fn type_ident(name: &str) -> Ident {
    ident(&name.to_upper_camel_case())
}

fn runtime_path() -> TokenStream {
    let krate = ident(RUNTIME_CRATE);
    quote!(::#krate)
}

fn namespace_path(namespace: &str) -> TokenStream {
    if namespace == FRAMEWORK_NAMESPACE {
        return runtime_path();
    }
    let segments: Vec<Ident> = namespace
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| ident(&s.to_snake_case()))
        .collect();
    quote!(crate #(::#segments)*)
}

fn type_path(reference: &TypeReference) -> TokenStream {
    let name = type_ident(&reference.name);
    if reference.qualified {
        let namespace = namespace_path(&reference.namespace);
        quote!(#namespace::#name)
    } else {
        quote!(#name)
    }
}

fn scalar_type(scalar: ScalarType) -> TokenStream {
    let runtime = runtime_path();
    match scalar {
        ScalarType::Bool => quote!(bool),
        ScalarType::Byte => quote!(u8),
        ScalarType::Int16 => quote!(i16),
        ScalarType::Int32 => quote!(i32),
        ScalarType::Int64 => quote!(i64),
        ScalarType::UInt16 => quote!(u16),
        ScalarType::UInt32 => quote!(u32),
        ScalarType::UInt64 => quote!(u64),
        ScalarType::Single => quote!(f32),
        ScalarType::Double => quote!(f64),
        ScalarType::Char => quote!(char),
        ScalarType::String => quote!(String),
        ScalarType::Binary => quote!(Vec<u8>),
        ScalarType::Decimal => quote!(#runtime::Decimal),
        ScalarType::Guid => quote!(#runtime::Guid),
        ScalarType::DateTime => quote!(#runtime::DateTime),
        ScalarType::DateTimeOffset => quote!(#runtime::DateTimeOffset),
        ScalarType::TimeSpan => quote!(#runtime::TimeSpan),
        ScalarType::Uri => quote!(#runtime::Uri),
    }
}

fn client_type(ty: &ClientType) -> TokenStream {
    match ty {
        ClientType::Scalar(scalar) => scalar_type(*scalar),
        ClientType::Named(reference) => type_path(reference),
        ClientType::Generic(reference, args) => {
            let path = type_path(reference);
            let args: Vec<TokenStream> = args.iter().map(client_type).collect();
            quote!(#path<#(#args),*>)
        }
        ClientType::Nullable(inner) => {
            let inner = client_type(inner);
            quote!(Option<#inner>)
        }
        ClientType::List(inner) => {
            let inner = client_type(inner);
            quote!(Vec<#inner>)
        }
        ClientType::Object => {
            let runtime = runtime_path();
            quote!(#runtime::Object)
        }
    }
}

/// A type in expression position, ready for `::method`
fn type_in_expr(ty: &ClientType) -> TokenStream {
    match ty {
        ClientType::Named(reference) => type_path(reference),
        ClientType::Generic(reference, args) => {
            let path = type_path(reference);
            let args: Vec<TokenStream> = args.iter().map(client_type).collect();
            quote!(#path::<#(#args),*>)
        }
        other => {
            let ty = client_type(other);
            quote!(<#ty>)
        }
    }
}

fn literal(value: &Literal) -> TokenStream {
    match value {
        Literal::Str(s) => {
            let lit = LiteralToken::string(s);
            quote!(#lit)
        }
        Literal::Bool(true) => quote!(true),
        Literal::Bool(false) => quote!(false),
        Literal::Int(i) => int_literal(*i),
    }
}

fn int_literal(value: i64) -> TokenStream {
    let magnitude = LiteralToken::u64_unsuffixed(value.unsigned_abs());
    if value < 0 {
        quote!(-#magnitude)
    } else {
        quote!(#magnitude)
    }
}

fn docs(comments: &[String]) -> Vec<TokenStream> {
    comments
        .iter()
        .map(|c| {
            let text = format!(" {}", c);
            quote!(#[doc = #text])
        })
        .collect()
}

fn visibility(visibility: Visibility) -> TokenStream {
    match visibility {
        Visibility::Public => quote!(pub),
        Visibility::Internal => quote!(pub(crate)),
        Visibility::Private => TokenStream::new(),
    }
}

fn attribute(attribute: &AttributeDecl) -> TokenStream {
    let short = attribute.ty.name.strip_suffix("Attribute").unwrap_or(&attribute.ty.name);
    let name = member_ident(short);
    let path = if attribute.ty.namespace == FRAMEWORK_NAMESPACE {
        let krate = ident(RUNTIME_CRATE);
        quote!(#krate::#name)
    } else if attribute.ty.qualified {
        let namespace = namespace_path(&attribute.ty.namespace);
        quote!(#namespace::#name)
    } else {
        quote!(#name)
    };
    if attribute.args.is_empty() {
        return quote!(#[#path]);
    }

    let args: Vec<TokenStream> = attribute
        .args
        .iter()
        .map(|arg| {
            let value = match &arg.value {
                Expr::TypeOf(ty) => client_type(ty),
                other => Body::method().expr(other),
            };
            match &arg.name {
                Some(name) => {
                    let name = member_ident(name);
                    quote!(#name = #value)
                }
                None => value,
            }
        })
        .collect();
    quote!(#[#path(#(#args),*)])
}

fn attributes(attributes: &[AttributeDecl]) -> Vec<TokenStream> {
    attributes.iter().map(attribute).collect()
}

fn type_decl(decl: &TypeDecl) -> TokenStream {
    match &decl.kind {
        TypeDeclKind::Class => class(decl),
        TypeDeclKind::Enum { is_flags, members } => {
            let name = type_ident(&decl.name);
            let docs = docs(&decl.comments);
            if *is_flags {
                let attrs: Vec<TokenStream> = decl
                    .attributes
                    .iter()
                    .filter(|a| a.ty.name != "Flags")
                    .map(attribute)
                    .collect();
                let consts: Vec<TokenStream> = members
                    .iter()
                    .map(|m| {
                        let member = ident(&m.name.to_shouty_snake_case());
                        let value = int_literal(m.value);
                        quote!(const #member = #value;)
                    })
                    .collect();
                quote! {
                    ::bitflags::bitflags! {
                        #(#docs)*
                        #(#attrs)*
                        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
                        pub struct #name: i64 {
                            #(#consts)*
                        }
                    }
                }
            } else {
                let attrs = attributes(&decl.attributes);
                let variants: Vec<TokenStream> = members
                    .iter()
                    .map(|m| {
                        let member = type_ident(&m.name);
                        let value = int_literal(m.value);
                        quote!(#member = #value)
                    })
                    .collect();
                quote! {
                    #(#docs)*
                    #(#attrs)*
                    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
                    #[repr(i64)]
                    pub enum #name {
                        #(#variants),*
                    }
                }
            }
        }
    }
}

fn class(decl: &TypeDecl) -> TokenStream {
    let name = type_ident(&decl.name);
    let mut docs = docs(&decl.comments);
    if decl.is_abstract {
        docs.push(quote!(#[doc = " Abstract: only derived types are instantiated."]));
    }
    let attrs = attributes(&decl.attributes);

    let mut fields = Vec::new();
    if let Some(base) = &decl.base {
        let ty = client_type(base);
        fields.push(quote!(base: #ty));
    }

    let mut inherent = Vec::new();
    let mut overrides = Vec::new();
    let mut hooks = Vec::new();
    for member in &decl.members {
        match member {
            Member::Field(field) => {
                let field_name = member_ident(&field.name);
                let ty = client_type(&field.ty);
                fields.push(quote!(#field_name: #ty));
            }
            Member::Property(property) => inherent.push(property_accessors(property)),
            Member::Method(method) => match method.kind {
                MethodKind::Hook => hooks.push(hook(method)),
                MethodKind::Constructor => inherent.push(constructor(method)),
                MethodKind::Regular if method.is_override => {
                    overrides.push(regular_method(method, false))
                }
                MethodKind::Regular => inherent.push(regular_method(method, true)),
            },
        }
    }

    let mut tokens = quote! {
        #(#docs)*
        #(#attrs)*
        #[derive(Default)]
        pub struct #name {
            #(#fields),*
        }
    };

    if let Some(base) = &decl.base {
        let base = client_type(base);
        tokens.extend(quote! {
            impl ::core::ops::Deref for #name {
                type Target = #base;

                fn deref(&self) -> &Self::Target {
                    &self.base
                }
            }

            impl ::core::ops::DerefMut for #name {
                fn deref_mut(&mut self) -> &mut Self::Target {
                    &mut self.base
                }
            }
        });
    }

    if !inherent.is_empty() {
        tokens.extend(quote! {
            impl #name {
                #(#inherent)*
            }
        });
    }

    if !overrides.is_empty() {
        let overrides_trait = overrides_trait(decl.base.as_ref());
        tokens.extend(quote! {
            impl #overrides_trait for #name {
                #(#overrides)*
            }
        });
    }

    if !hooks.is_empty() {
        let hooks_trait = ident(&format!("{}Hooks", decl.name.to_upper_camel_case()));
        tokens.extend(quote! {
            #[allow(unused_variables)]
            pub trait #hooks_trait {
                #(#hooks)*
            }

            impl #hooks_trait for #name {}
        });
    }

    tokens
}

/// Trait through which a base type exposes overridable members
fn overrides_trait(base: Option<&ClientType>) -> TokenStream {
    match base {
        Some(ClientType::Named(reference)) | Some(ClientType::Generic(reference, _)) => {
            type_path(&TypeReference {
                name: format!("{}Overrides", reference.name),
                ..reference.clone()
            })
        }
        _ => {
            let runtime = runtime_path();
            quote!(#runtime::Overrides)
        }
    }
}

fn property_accessors(property: &PropertyDecl) -> TokenStream {
    let docs = docs(&property.comments);
    let attrs = attributes(&property.attributes);
    let name = member_ident(&property.name);
    let ty = client_type(&property.ty);

    let getter_scan = BodyScan::of(&property.getter);
    let receiver = getter_scan.receiver();
    let getter = Body::method().block(&property.getter, &getter_scan, true);
    let mut tokens = quote! {
        #(#docs)*
        #(#attrs)*
        pub fn #name(#receiver) -> #ty {
            #getter
        }
    };

    if let Some(setter) = &property.setter {
        let vis = visibility(setter.visibility);
        let setter_name = ident(&format!("set_{}", property.name.to_snake_case()));
        let scan = BodyScan::of(&setter.body);
        let value = if scan.locals.contains("value") {
            quote!(mut value)
        } else {
            quote!(value)
        };
        let body = Body::method().block(&setter.body, &scan, true);
        tokens.extend(quote! {
            #vis fn #setter_name(&mut self, #value: #ty) {
                #body
            }
        });
    }

    tokens
}

fn parameters(method: &MethodDecl, scan: &BodyScan) -> Vec<TokenStream> {
    method
        .parameters
        .iter()
        .map(|p| {
            let name = member_ident(&p.name);
            let ty = client_type(&p.ty);
            if scan.locals.contains(&p.name) {
                quote!(mut #name: #ty)
            } else {
                quote!(#name: #ty)
            }
        })
        .collect()
}

fn regular_method(method: &MethodDecl, with_visibility: bool) -> TokenStream {
    let docs = docs(&method.comments);
    let attrs = attributes(&method.attributes);
    let vis = if with_visibility {
        visibility(method.visibility)
    } else {
        TokenStream::new()
    };
    let name = member_ident(&method.name);
    let scan = BodyScan::of(&method.body);
    let receiver = scan.receiver();
    let params = parameters(method, &scan);
    let ret = method.return_type.as_ref().map(|ty| {
        let ty = client_type(ty);
        quote!(-> #ty)
    });
    let body = Body::method().block(&method.body, &scan, true);

    quote! {
        #(#docs)*
        #(#attrs)*
        #vis fn #name(#receiver #(, #params)*) #ret {
            #body
        }
    }
}

fn constructor(method: &MethodDecl) -> TokenStream {
    let docs = docs(&method.comments);
    let vis = visibility(method.visibility);
    let scan = BodyScan::of(&method.body);
    let params = parameters(method, &scan);
    let body = Body::constructor().block(&method.body, &scan, false);

    quote! {
        #(#docs)*
        #vis fn new(#(#params),*) -> Self {
            let mut this = Self::default();
            #body
            this
        }
    }
}

fn hook(method: &MethodDecl) -> TokenStream {
    let name = member_ident(&method.name);
    let params: Vec<TokenStream> = method
        .parameters
        .iter()
        .map(|p| {
            let name = member_ident(&p.name);
            let ty = client_type(&p.ty);
            quote!(#name: #ty)
        })
        .collect();
    quote! {
        fn #name(&mut self #(, #params)*) {}
    }
}

/// What a body does to its receiver and locals
#[derive(Default)]
struct BodyScan {
    mutates_self: bool,
    locals: HashSet<String>,
}

impl BodyScan {
    fn of(body: &[Stmt]) -> Self {
        let mut scan = Self::default();
        for stmt in body {
            scan.visit_stmt(stmt);
        }
        scan
    }

    fn receiver(&self) -> TokenStream {
        if self.mutates_self {
            quote!(&mut self)
        } else {
            quote!(&self)
        }
    }

    fn note_target(&mut self, target: &Expr) {
        match root_of(target) {
            Expr::This => self.mutates_self = true,
            Expr::Local(name) => {
                self.locals.insert(name.clone());
            }
            Expr::Value => {
                self.locals.insert("value".to_string());
            }
            _ => {}
        }
    }
}

impl Visitor for BodyScan {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign(target, _) | Stmt::SetProperty { target, .. } => self.note_target(target),
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Call { target, .. } = expr {
            self.note_target(target);
        }
        walk_expr(self, expr);
    }
}

fn root_of(expr: &Expr) -> &Expr {
    match expr {
        Expr::Field(owner, _) | Expr::Property(owner, _) => root_of(owner),
        Expr::Call { target, .. } => root_of(target),
        other => other,
    }
}

/// Renders statements and expressions for one body
struct Body {
    this: TokenStream,
}

impl Body {
    fn method() -> Self {
        Self { this: quote!(self) }
    }

    fn constructor() -> Self {
        Self { this: quote!(this) }
    }

    fn block(&self, body: &[Stmt], scan: &BodyScan, tail: bool) -> TokenStream {
        let mut tokens = TokenStream::new();
        for (i, stmt) in body.iter().enumerate() {
            let last = i + 1 == body.len();
            match stmt {
                Stmt::Return(Some(value)) if tail && last => tokens.extend(self.expr(value)),
                Stmt::Return(None) if tail && last => {}
                other => tokens.extend(self.stmt(other, scan)),
            }
        }
        tokens
    }

    fn stmt(&self, stmt: &Stmt, scan: &BodyScan) -> TokenStream {
        match stmt {
            Stmt::Let(name, value) => {
                let local = member_ident(name);
                let value = self.expr(value);
                if scan.locals.contains(name) {
                    quote!(let mut #local = #value;)
                } else {
                    quote!(let #local = #value;)
                }
            }
            Stmt::Assign(target, value) => {
                let target = self.expr(target);
                let value = self.expr(value);
                quote!(#target = #value;)
            }
            Stmt::SetProperty {
                target,
                property,
                value,
            } => {
                let target = self.expr(target);
                let setter = ident(&format!("set_{}", property.to_snake_case()));
                let value = self.expr(value);
                quote!(#target.#setter(#value);)
            }
            Stmt::Expr(expr) => {
                let expr = self.expr(expr);
                quote!(#expr;)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond);
                let then = self.block(then, scan, false);
                if otherwise.is_empty() {
                    quote!(if #cond { #then })
                } else {
                    let otherwise = self.block(otherwise, scan, false);
                    quote!(if #cond { #then } else { #otherwise })
                }
            }
            Stmt::Return(Some(value)) => {
                let value = self.expr(value);
                quote!(return #value;)
            }
            Stmt::Return(None) => quote!(return;),
        }
    }

    fn exprs(&self, exprs: &[Expr]) -> Vec<TokenStream> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&self, expr: &Expr) -> TokenStream {
        match expr {
            Expr::This => self.this.clone(),
            Expr::Value => quote!(value),
            Expr::Null => quote!(None),
            Expr::Literal(value) => literal(value),
            Expr::Default(ty) => {
                let ty = client_type(ty);
                quote!(<#ty as ::core::default::Default>::default())
            }
            Expr::Local(name) => {
                let local = member_ident(name);
                quote!(#local)
            }
            Expr::Field(owner, field) => {
                let owner = self.expr(owner);
                let field = member_ident(field);
                quote!(#owner.#field)
            }
            Expr::Property(owner, property) => {
                let owner = self.expr(owner);
                let property = member_ident(property);
                quote!(#owner.#property())
            }
            Expr::Call {
                target,
                method,
                type_args,
                args,
            } => {
                let target = self.expr(target);
                let method = member_ident(method);
                let args = self.exprs(args);
                if type_args.is_empty() {
                    quote!(#target.#method(#(#args),*))
                } else {
                    let type_args: Vec<TokenStream> = type_args.iter().map(client_type).collect();
                    quote!(#target.#method::<#(#type_args),*>(#(#args),*))
                }
            }
            Expr::StaticCall { ty, method, args } => {
                let ty = type_in_expr(ty);
                let method = member_ident(method);
                let args = self.exprs(args);
                quote!(#ty::#method(#(#args),*))
            }
            Expr::New(ty, args) => {
                let ty = type_in_expr(ty);
                let args = self.exprs(args);
                quote!(#ty::new(#(#args),*))
            }
            Expr::MethodRef(name) => {
                let method = member_ident(name);
                quote!(Self::#method)
            }
            Expr::TypeOf(ty) => {
                let ty = client_type(ty);
                quote!(::core::any::TypeId::of::<#ty>())
            }
            Expr::Parameters(pairs) => {
                let runtime = runtime_path();
                let entries: Vec<TokenStream> = pairs
                    .iter()
                    .map(|(name, value)| {
                        let name = LiteralToken::string(name);
                        let value = self.expr(value);
                        quote!((#name, #runtime::Value::from(#value)))
                    })
                    .collect();
                quote!(vec![#(#entries),*])
            }
            Expr::Eq(left, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                quote!(#left == #right)
            }
            Expr::Ne(left, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                quote!(#left != #right)
            }
            Expr::And(items) => match items.as_slice() {
                [] => quote!(true),
                [single] => self.expr(single),
                _ => {
                    let items: Vec<TokenStream> = items
                        .iter()
                        .map(|item| match item {
                            Expr::Or(inner) if inner.len() > 1 => {
                                let inner = self.expr(item);
                                quote!((#inner))
                            }
                            other => self.expr(other),
                        })
                        .collect();
                    quote!(#(#items)&&*)
                }
            },
            Expr::Or(items) => match items.as_slice() {
                [] => quote!(false),
                [single] => self.expr(single),
                _ => {
                    let items = self.exprs(items);
                    quote!(#(#items)||*)
                }
            },
            Expr::IsNull(inner) => {
                let inner = self.expr(inner);
                quote!(#inner.is_none())
            }
            Expr::IsNotNull(inner) => {
                let inner = self.expr(inner);
                quote!(#inner.is_some())
            }
        }
    }
}

/// Modules mirroring the namespace hierarchy
#[derive(Default)]
struct ModuleTree {
    items: Vec<TokenStream>,
    children: IndexMap<String, ModuleTree>,
}

impl ModuleTree {
    fn node(&mut self, namespace: &str) -> &mut ModuleTree {
        namespace
            .split('.')
            .filter(|s| !s.is_empty())
            .fold(self, |node, segment| {
                node.children.entry(segment.to_snake_case()).or_default()
            })
    }

    fn into_tokens(self) -> TokenStream {
        let items = self.items;
        let children: Vec<TokenStream> = self
            .children
            .into_iter()
            .map(|(name, child)| {
                let name = ident(&name);
                let body = child.into_tokens();
                quote! {
                    pub mod #name {
                        #body
                    }
                }
            })
            .collect();
        quote! {
            #(#items)*
            #(#children)*
        }
    }
}
