//! Identity generation
//!
//! Root entities get a `GetIdentity` override built from their key members.
//! Derived entities inherit it.

use super::GenerationContext;
use crate::descriptor::{PropertyDescriptor, TypeDescriptor};
use crate::graph::{ClientType, Expr, Member, MethodDecl, Stmt, TypeDecl};
use crate::GeneratorError;

/// Name of the generated identity method
pub const IDENTITY_METHOD: &str = "GetIdentity";

/// Ordered key members of an entity
///
/// Explicit key members win; otherwise every Key-tagged property visible on
/// the entity, in name order.
pub fn key_members<'a>(
    ctx: &GenerationContext<'a>,
    entity: &TypeDescriptor,
) -> Result<Vec<&'a PropertyDescriptor>, String> {
    if entity.key_members.is_empty() {
        let mut keys: Vec<_> = ctx
            .hierarchy
            .all_visible_properties(&entity.name)
            .into_iter()
            .filter(|p| p.is_key())
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        return Ok(keys);
    }

    entity
        .key_members
        .iter()
        .map(|name| {
            ctx.hierarchy
                .find_property(&entity.name, name)
                .ok_or_else(|| format!("Key member '{}' does not exist on '{}'.", name, entity.name))
        })
        .collect()
}

/// Body of `GetIdentity` for the given keys
pub fn identity_body(keys: &[&PropertyDescriptor]) -> Vec<Stmt> {
    if let [single] = keys {
        return vec![Stmt::Return(Some(Expr::this_property(single.name.clone())))];
    }

    let mut body = Vec::new();
    let nullable: Vec<Expr> = keys
        .iter()
        .filter(|k| k.ty.is_nullable_or_reference())
        .map(|k| Expr::is_null(Expr::this_property(k.name.clone())))
        .collect();
    if !nullable.is_empty() {
        body.push(Stmt::when(
            Expr::Or(nullable),
            vec![Stmt::Return(Some(Expr::Null))],
        ));
    }
    body.push(Stmt::Return(Some(Expr::StaticCall {
        ty: ClientType::framework("EntityKey"),
        method: "Create".to_string(),
        args: keys
            .iter()
            .map(|k| Expr::this_property(k.name.clone()))
            .collect(),
    })));
    body
}

/// Add `GetIdentity` to a root entity
pub fn generate(
    ctx: &mut GenerationContext<'_>,
    decl: &mut TypeDecl,
    entity: &TypeDescriptor,
) -> Result<(), GeneratorError> {
    if !ctx.hierarchy.is_root(&entity.name) {
        return Ok(());
    }

    let keys = match key_members(ctx, entity) {
        Ok(keys) => keys,
        Err(message) => {
            ctx.log.log_error(message);
            return Ok(());
        }
    };
    if keys.is_empty() {
        ctx.log.log_error(format!(
            "Entity '{}' has no key members.",
            entity.name
        ));
        return Ok(());
    }

    for key in &keys {
        if ctx.is_shared(&key.declaring_type)?
            || ctx.is_property_shared(&key.declaring_type, &key.name)?
        {
            tracing::debug!(entity = %entity.name, key = %key.name, "key is shared; identity left to the base");
            return Ok(());
        }
    }

    decl.members.push(Member::Method(MethodDecl {
        return_type: Some(ClientType::Nullable(Box::new(ClientType::Object))),
        body: identity_body(&keys),
        is_override: true,
        ..MethodDecl::new(IDENTITY_METHOD)
    }));
    Ok(())
}
