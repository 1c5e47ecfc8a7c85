//! Declaration instantiation.
//!
//! Every scope is set up before any of its statements run: lexical names
//! are created uninitialized (the temporal dead zone), `var` names are
//! created initialized to `undefined` in the variable scope, and hoisted
//! functions are bound to their closures. What a scope declares is computed
//! once and cached on the syntax node that owns the scope.

use std::rc::Rc;

use super::Realm;
use super::call::create_closure;
use super::context::EvaluationContext;
use super::environment::{EnvRef, LexicalEnvironment};
use crate::ast::{FunctionNode, LexicalDeclaration, Program, Statement};
use crate::types::JsValue;

impl Realm {
    fn syntax_error(&mut self, message: String) -> JsValue {
        self.create_error("SyntaxError", &message)
    }
}

fn create_lexical(realm: &mut Realm, env: &EnvRef, decl: &LexicalDeclaration) -> Result<(), JsValue> {
    let name = decl.name();
    let created = match decl {
        LexicalDeclaration::Const(_) => env.create_immutable_binding(&name, true),
        _ => env.create_mutable_binding(realm, &name, false),
    };
    created.map_err(|e| realm.throw_fault(e.into()))
}

/// Binds or overwrites a var-scoped name.
fn bind_var(realm: &mut Realm, env: &EnvRef, name: &Rc<str>, value: JsValue) -> Result<(), JsValue> {
    let result = if env.has_binding(realm, name) {
        env.set_mutable_binding(realm, name, value, false)
    } else {
        env.create_mutable_binding(realm, name, false)
            .and_then(|()| env.initialize_binding(realm, name, value))
    };
    result.map_err(|e| realm.throw_fault(e.into()))
}

/// Sets up the variable and lexical scopes of a function body whose
/// parameters are already bound in `env`. Returns the body's context.
pub fn function_body(realm: &mut Realm, node: &Rc<FunctionNode>, env: &EnvRef) -> Result<Rc<EvaluationContext>, JsValue> {
    let info = node.scope();
    for name in info.var_names.iter().chain(info.block_functions.iter()) {
        if !env.has_binding(realm, name) {
            bind_var(realm, env, name, JsValue::Undefined)?;
        }
    }
    let lexical = if info.lexical.is_empty() {
        env.clone()
    } else {
        let lexical = LexicalEnvironment::declarative(env);
        for decl in &info.lexical {
            create_lexical(realm, &lexical, decl)?;
        }
        lexical
    };
    for (name, f) in &info.functions {
        let closure = create_closure(realm, f, &lexical, None);
        bind_var(realm, env, name, JsValue::Object(closure))?;
    }
    Ok(EvaluationContext::new(realm.id(), env.clone(), node.strict).with_lexical(lexical))
}

/// BlockDeclarationInstantiation for a block or switch statement. Returns
/// `None` when it declares nothing and can run in the enclosing scope.
pub fn block(
    realm: &mut Realm,
    stmt: &Statement,
    context: &Rc<EvaluationContext>,
) -> Result<Option<Rc<EvaluationContext>>, JsValue> {
    let info = stmt.block_scope();
    if info.lexical.is_empty() {
        return Ok(None);
    }
    let env = LexicalEnvironment::declarative(&context.lexical);
    for decl in &info.lexical {
        if let LexicalDeclaration::Function(f) = decl {
            let name = decl.name();
            if !env.has_binding(realm, &name) {
                env.create_mutable_binding(realm, &name, false)
                    .map_err(|e| realm.throw_fault(e.into()))?;
            }
            let closure = JsValue::Object(create_closure(realm, f, &env, None));
            let initialized = match env.initialize_binding(realm, &name, closure.clone()) {
                Err(crate::error::BindingError::AlreadyInitialized(_)) => {
                    env.set_mutable_binding(realm, &name, closure, false)
                }
                other => other,
            };
            initialized.map_err(|e| realm.throw_fault(e.into()))?;
        } else {
            create_lexical(realm, &env, decl)?;
        }
    }
    Ok(Some(context.with_lexical(env)))
}

/// GlobalDeclarationInstantiation for a script body.
pub fn global(realm: &mut Realm, program: &Program, env: &EnvRef) -> Result<(), JsValue> {
    let info = program.scope();
    let Some(global) = env.global() else {
        return Err(realm.type_error("script evaluated outside the global scope"));
    };
    for decl in &info.lexical {
        let name = decl.name();
        if global.has_var_declaration(&name)
            || global.has_lexical_declaration(&name)
            || global.has_restricted_global_property(realm, &name)
        {
            return Err(realm.syntax_error(format!("Identifier '{name}' has already been declared")));
        }
    }
    let var_like = info
        .var_names
        .iter()
        .chain(info.functions.iter().map(|(name, _)| name));
    for name in var_like {
        if global.has_lexical_declaration(name) {
            return Err(realm.syntax_error(format!("Identifier '{name}' has already been declared")));
        }
    }
    for (name, _) in &info.functions {
        if !global.can_declare_global_function(realm, name) {
            return Err(realm.type_error(format!("Cannot redefine global function '{name}'")));
        }
    }
    for name in &info.var_names {
        if !global.can_declare_global_var(realm, name) {
            return Err(realm.type_error(format!("Cannot define global variable '{name}'")));
        }
    }
    for decl in &info.lexical {
        create_lexical(realm, env, decl)?;
    }
    for (name, f) in &info.functions {
        let closure = create_closure(realm, f, env, None);
        global.create_global_function_binding(realm, name, JsValue::Object(closure), false);
    }
    for name in info.var_names.iter().chain(info.block_functions.iter()) {
        if global.has_lexical_declaration(name) {
            continue;
        }
        if global.can_declare_global_var(realm, name) {
            global.create_global_var_binding(realm, name, false);
        }
    }
    Ok(())
}

/// Declarations of a module body, created in its module environment at link time.
pub fn module_body(realm: &mut Realm, program: &Program, env: &EnvRef) -> Result<(), JsValue> {
    let info = program.scope();
    for name in &info.var_names {
        if !env.has_binding(realm, name) {
            bind_var(realm, env, name, JsValue::Undefined)?;
        }
    }
    for decl in &info.lexical {
        create_lexical(realm, env, decl)?;
    }
    for (name, f) in &info.functions {
        let closure = create_closure(realm, f, env, None);
        if f.name.is_none() {
            realm.set_function_name(closure, &crate::types::PropertyKey::from("default"), None);
        }
        bind_var(realm, env, name, JsValue::Object(closure))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;
    use crate::parser::Parser;

    #[test]
    fn scope_analysis_is_cached_on_the_program_it_describes() {
        let mut realm = Realm::new(RealmConfig::default());
        let program = Rc::new(Parser::parse_script("var v; let l = 1; function f() {}", false).unwrap());
        assert!(program.scope.get().is_none());
        let env = realm.global_env.clone();
        global(&mut realm, &program, &env).unwrap();

        let info = program.scope.get().expect("analysis cached after instantiation");
        assert_eq!(info.var_names.len(), 1);
        assert_eq!(info.lexical.len(), 1);
        assert_eq!(info.functions.len(), 1);
        assert!(std::ptr::eq(info, program.scope()));

        let weak = Rc::downgrade(&program);
        drop(program);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn block_scopes_are_analysed_once_per_node() {
        let mut realm = Realm::new(RealmConfig::default());
        let program = Parser::parse_script("{ let a = 1; }", false).unwrap();
        let stmt = program.body[0].clone();
        assert!(stmt.scope.get().is_none());
        let context = EvaluationContext::new(realm.id(), realm.global_env.clone(), false);

        let first = block(&mut realm, &stmt, &context).unwrap().expect("the block declares a name");
        let cached: *const _ = stmt.block_scope();
        let second = block(&mut realm, &stmt, &context).unwrap().expect("the block declares a name");
        assert!(!Rc::ptr_eq(&first.lexical, &second.lexical));
        assert!(std::ptr::eq(cached, stmt.block_scope()));
        assert_eq!(stmt.block_scope().lexical.len(), 1);
    }
}
