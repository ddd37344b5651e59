//! Statement introspection
//!
//! Given a snippet of source text and an evaluation scope, statically
//! determines which (document, feature) pair the snippet most plausibly
//! refers to, so a preview URL can be synthesized for its value. The walk
//! never executes anything: it only inspects the parsed tree against the
//! scope and the known feature-key set.

use crate::features::{FeatureSet, FeatureSpec};
use crate::script::{parse, Expr, Scope, ScriptValue, Stmt};

/// Recover the (document, feature) pair a statement refers to
///
/// The tree is walked pre-order with two not-yet-found slots: a bare
/// identifier bound in scope to a document fills the document slot, an
/// attribute access whose name is a known feature key fills the feature
/// slot. The first binding of each slot wins; the walk stops early once
/// both are filled. A snippet that parses badly or references neither
/// yields `None` for the missing slot — that is not an error.
pub fn extract(
    statement: &str,
    scope: &Scope,
    features: &FeatureSet,
) -> (Option<String>, Option<FeatureSpec>) {
    let stmt = match parse(statement) {
        Ok(stmt) => stmt,
        Err(_) => return (None, None),
    };

    let mut document: Option<String> = None;
    let mut feature_name: Option<String> = None;

    let expr = match &stmt {
        Stmt::Expr(expr) => expr,
        Stmt::Assign { target, value } => {
            // The assignment target is itself a name reference; it may
            // already be bound to a document.
            bind_document(&mut document, target, scope);
            value
        }
    };

    expr.walk(&mut |node| {
        match node {
            Expr::Ident(name) => bind_document(&mut document, name, scope),
            Expr::Attr { name, .. } => {
                if feature_name.is_none() && features.contains(name) {
                    feature_name = Some(name.clone());
                }
            }
            _ => {}
        }
        // Keep walking until both slots are filled.
        !(document.is_some() && feature_name.is_some())
    });

    // A name confirmed to be a member of the feature set always resolves.
    let feature = feature_name.and_then(|name| features.get(&name).cloned());
    (document, feature)
}

fn bind_document(slot: &mut Option<String>, name: &str, scope: &Scope) {
    if slot.is_some() {
        return;
    }
    if let Some(ScriptValue::Document(id)) = scope.get(name) {
        *slot = Some(id.clone());
    }
}
