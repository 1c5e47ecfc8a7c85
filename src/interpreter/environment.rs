//! Environment Records.
//!
//! An environment is an immutable link in a scope chain holding one record.
//! Records use interior mutability so closures, suspended coroutines and the
//! running frame can all share them through `Rc`.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::Realm;
use super::gc::{Trace, Tracer};
use super::reference::Reference;
use crate::error::BindingError;
use crate::types::{JsObject, JsValue, PropertyKey};

pub type EnvRef = Rc<LexicalEnvironment>;

#[derive(Debug)]
pub struct LexicalEnvironment {
    pub record: EnvironmentRecord,
    pub outer: Option<EnvRef>,
}

#[derive(Debug)]
pub enum EnvironmentRecord {
    Declarative(DeclarativeRecord),
    Object(ObjectRecord),
    Global(GlobalRecord),
    Module(ModuleRecord),
}

#[derive(Debug, Clone)]
struct Binding {
    /// `None` while in the temporal dead zone.
    value: Option<JsValue>,
    mutable: bool,
    /// Immutable bindings created strict always throw on assignment.
    strict: bool,
    deletable: bool,
}

#[derive(Debug, Default)]
pub struct DeclarativeRecord {
    bindings: RefCell<FxHashMap<Rc<str>, Binding>>,
    /// Present for the top-level record of a non-arrow function call.
    pub function: Option<FunctionScope>,
}

/// The `this`, `super` and `new.target` state of a function invocation.
#[derive(Debug)]
pub struct FunctionScope {
    /// `None` until `super()` returns in a derived constructor.
    pub this: RefCell<Option<JsValue>>,
    pub function: JsObject,
    pub home_object: Option<JsObject>,
    pub new_target: JsValue,
}

#[derive(Debug)]
pub struct ObjectRecord {
    pub object: JsObject,
    /// Set for `with` statement records: references resolved through it carry
    /// the object as their `this`.
    pub with_environment: bool,
}

#[derive(Debug)]
pub struct GlobalRecord {
    pub object: ObjectRecord,
    pub declarative: DeclarativeRecord,
    pub this: JsValue,
    var_names: RefCell<FxHashSet<Rc<str>>>,
}

/// Module scope: ordinary declarative bindings plus live import bindings
/// that forward to another module's environment.
#[derive(Debug, Default)]
pub struct ModuleRecord {
    pub declarative: DeclarativeRecord,
    imports: RefCell<FxHashMap<Rc<str>, (EnvRef, Rc<str>)>>,
}

impl DeclarativeRecord {
    pub fn for_function(scope: FunctionScope) -> Self {
        Self {
            bindings: RefCell::default(),
            function: Some(scope),
        }
    }

    fn has(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    fn create(&self, name: &Rc<str>, binding: Binding) -> Result<(), BindingError> {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(name) {
            return Err(BindingError::AlreadyDeclared(name.clone()));
        }
        bindings.insert(name.clone(), binding);
        Ok(())
    }

    fn create_mutable(&self, name: &Rc<str>, deletable: bool) -> Result<(), BindingError> {
        self.create(
            name,
            Binding {
                value: None,
                mutable: true,
                strict: false,
                deletable,
            },
        )
    }

    fn create_immutable(&self, name: &Rc<str>, strict: bool) -> Result<(), BindingError> {
        self.create(
            name,
            Binding {
                value: None,
                mutable: false,
                strict,
                deletable: false,
            },
        )
    }

    fn initialize(&self, name: &Rc<str>, value: JsValue) -> Result<(), BindingError> {
        let mut bindings = self.bindings.borrow_mut();
        let binding = bindings
            .get_mut(name)
            .ok_or_else(|| BindingError::NotDefined(name.clone()))?;
        if binding.value.is_some() {
            return Err(BindingError::AlreadyInitialized(name.clone()));
        }
        binding.value = Some(value);
        Ok(())
    }

    fn set(&self, name: &Rc<str>, value: JsValue, strict: bool) -> Result<(), BindingError> {
        let mut bindings = self.bindings.borrow_mut();
        let Some(binding) = bindings.get_mut(name) else {
            if strict {
                return Err(BindingError::NotDefined(name.clone()));
            }
            drop(bindings);
            self.create_mutable(name, true)?;
            return self.initialize(name, value);
        };
        if binding.value.is_none() {
            return Err(BindingError::Uninitialized(name.clone()));
        }
        if binding.mutable {
            binding.value = Some(value);
            Ok(())
        } else if binding.strict || strict {
            Err(BindingError::Immutable(name.clone()))
        } else {
            Ok(())
        }
    }

    fn get(&self, name: &Rc<str>) -> Result<JsValue, BindingError> {
        let bindings = self.bindings.borrow();
        match bindings.get(name) {
            Some(Binding { value: Some(v), .. }) => Ok(v.clone()),
            Some(_) => Err(BindingError::Uninitialized(name.clone())),
            None => Err(BindingError::NotDefined(name.clone())),
        }
    }

    fn delete(&self, name: &str) -> bool {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get(name) {
            Some(b) if b.deletable => {
                bindings.remove(name);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn names(&self) -> Vec<Rc<str>> {
        self.bindings.borrow().keys().cloned().collect()
    }
}

impl ObjectRecord {
    fn key(name: &Rc<str>) -> PropertyKey {
        PropertyKey::String(name.clone())
    }

    fn has(&self, realm: &Realm, name: &Rc<str>) -> bool {
        realm.has_property(self.object, &Self::key(name))
    }

    fn set(&self, realm: &mut Realm, name: &Rc<str>, value: JsValue, strict: bool) -> Result<(), BindingError> {
        let key = Self::key(name);
        let still_exists = realm.has_property(self.object, &key);
        if !still_exists && strict {
            return Err(BindingError::NotDefined(name.clone()));
        }
        if !realm.set_data(self.object, key, value) && strict {
            return Err(BindingError::Immutable(name.clone()));
        }
        Ok(())
    }

    fn get(&self, realm: &Realm, name: &Rc<str>, strict: bool) -> Result<JsValue, BindingError> {
        let key = Self::key(name);
        if !realm.has_property(self.object, &key) {
            return if strict {
                Err(BindingError::NotDefined(name.clone()))
            } else {
                Ok(JsValue::Undefined)
            };
        }
        Ok(realm.get_data(self.object, &key))
    }
}

impl GlobalRecord {
    pub fn new(global_object: JsObject) -> Self {
        Self {
            object: ObjectRecord {
                object: global_object,
                with_environment: false,
            },
            declarative: DeclarativeRecord::default(),
            this: JsValue::Object(global_object),
            var_names: RefCell::default(),
        }
    }

    pub fn has_var_declaration(&self, name: &str) -> bool {
        self.var_names.borrow().contains(name)
    }

    pub fn has_lexical_declaration(&self, name: &str) -> bool {
        self.declarative.has(name)
    }

    /// A non-configurable own property of the global object.
    pub fn has_restricted_global_property(&self, realm: &Realm, name: &Rc<str>) -> bool {
        realm
            .get_own_property(self.object.object, &ObjectRecord::key(name))
            .is_some_and(|d| d.configurable == Some(false))
    }

    pub fn can_declare_global_var(&self, realm: &Realm, name: &Rc<str>) -> bool {
        realm.has_own_property(self.object.object, &ObjectRecord::key(name)) || realm.is_extensible(self.object.object)
    }

    pub fn can_declare_global_function(&self, realm: &Realm, name: &Rc<str>) -> bool {
        match realm.get_own_property(self.object.object, &ObjectRecord::key(name)) {
            None => realm.is_extensible(self.object.object),
            Some(desc) => {
                desc.configurable == Some(true)
                    || (desc.is_data_descriptor() && desc.writable == Some(true) && desc.enumerable == Some(true))
            }
        }
    }

    pub fn create_global_var_binding(&self, realm: &mut Realm, name: &Rc<str>, deletable: bool) {
        let key = ObjectRecord::key(name);
        if !realm.has_own_property(self.object.object, &key) && realm.is_extensible(self.object.object) {
            realm.define_own_property(
                self.object.object,
                key,
                super::PropertyDescriptor::data(JsValue::Undefined, true, true, deletable),
            );
        }
        self.var_names.borrow_mut().insert(name.clone());
    }

    pub fn create_global_function_binding(&self, realm: &mut Realm, name: &Rc<str>, value: JsValue, deletable: bool) {
        let key = ObjectRecord::key(name);
        let desc = match realm.get_own_property(self.object.object, &key) {
            Some(existing) if existing.configurable != Some(true) => super::PropertyDescriptor {
                value: Some(value),
                ..Default::default()
            },
            _ => super::PropertyDescriptor::data(value, true, true, deletable),
        };
        realm.define_own_property(self.object.object, key, desc);
        self.var_names.borrow_mut().insert(name.clone());
    }
}

impl ModuleRecord {
    /// Creates an import binding that reads `target_name` in `target` at access time.
    pub fn create_import_binding(&self, name: &Rc<str>, target: EnvRef, target_name: Rc<str>) -> Result<(), BindingError> {
        if self.declarative.has(name) || self.imports.borrow().contains_key(name) {
            return Err(BindingError::AlreadyDeclared(name.clone()));
        }
        self.imports.borrow_mut().insert(name.clone(), (target, target_name));
        Ok(())
    }

    fn import(&self, name: &str) -> Option<(EnvRef, Rc<str>)> {
        self.imports.borrow().get(name).cloned()
    }
}

impl LexicalEnvironment {
    pub fn new(record: EnvironmentRecord, outer: Option<EnvRef>) -> EnvRef {
        Rc::new(Self { record, outer })
    }

    pub fn declarative(outer: &EnvRef) -> EnvRef {
        Self::new(EnvironmentRecord::Declarative(DeclarativeRecord::default()), Some(outer.clone()))
    }

    pub fn has_binding(&self, realm: &Realm, name: &Rc<str>) -> bool {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.has(name),
            EnvironmentRecord::Object(o) => o.has(realm, name),
            EnvironmentRecord::Global(g) => g.declarative.has(name) || g.object.has(realm, name),
            EnvironmentRecord::Module(m) => m.declarative.has(name) || m.imports.borrow().contains_key(name),
        }
    }

    pub fn create_mutable_binding(&self, realm: &mut Realm, name: &Rc<str>, deletable: bool) -> Result<(), BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.create_mutable(name, deletable),
            EnvironmentRecord::Module(m) => m.declarative.create_mutable(name, deletable),
            EnvironmentRecord::Global(g) => g.declarative.create_mutable(name, deletable),
            EnvironmentRecord::Object(o) => {
                realm.define_own_property(
                    o.object,
                    ObjectRecord::key(name),
                    super::PropertyDescriptor::data(JsValue::Undefined, true, true, deletable),
                );
                Ok(())
            }
        }
    }

    pub fn create_immutable_binding(&self, name: &Rc<str>, strict: bool) -> Result<(), BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.create_immutable(name, strict),
            EnvironmentRecord::Module(m) => m.declarative.create_immutable(name, strict),
            EnvironmentRecord::Global(g) => g.declarative.create_immutable(name, strict),
            EnvironmentRecord::Object(_) => Err(BindingError::AlreadyDeclared(name.clone())),
        }
    }

    pub fn initialize_binding(&self, realm: &mut Realm, name: &Rc<str>, value: JsValue) -> Result<(), BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.initialize(name, value),
            EnvironmentRecord::Module(m) => m.declarative.initialize(name, value),
            EnvironmentRecord::Global(g) if g.declarative.has(name) => g.declarative.initialize(name, value),
            EnvironmentRecord::Global(g) => {
                g.object.set(realm, name, value, false)?;
                g.var_names.borrow_mut().insert(name.clone());
                Ok(())
            }
            EnvironmentRecord::Object(o) => o.set(realm, name, value, false),
        }
    }

    pub fn set_mutable_binding(
        &self,
        realm: &mut Realm,
        name: &Rc<str>,
        value: JsValue,
        strict: bool,
    ) -> Result<(), BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.set(name, value, strict),
            EnvironmentRecord::Module(m) => {
                if m.import(name).is_some() {
                    return Err(BindingError::Immutable(name.clone()));
                }
                m.declarative.set(name, value, strict)
            }
            EnvironmentRecord::Global(g) if g.declarative.has(name) => g.declarative.set(name, value, strict),
            EnvironmentRecord::Global(g) => g.object.set(realm, name, value, strict),
            EnvironmentRecord::Object(o) => o.set(realm, name, value, strict),
        }
    }

    pub fn get_binding_value(&self, realm: &Realm, name: &Rc<str>, strict: bool) -> Result<JsValue, BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.get(name),
            EnvironmentRecord::Module(m) => match m.import(name) {
                Some((target, target_name)) => target.get_binding_value(realm, &target_name, true),
                None => m.declarative.get(name),
            },
            EnvironmentRecord::Global(g) if g.declarative.has(name) => g.declarative.get(name),
            EnvironmentRecord::Global(g) => g.object.get(realm, name, strict),
            EnvironmentRecord::Object(o) => o.get(realm, name, strict),
        }
    }

    pub fn delete_binding(&self, realm: &mut Realm, name: &Rc<str>) -> bool {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.delete(name),
            EnvironmentRecord::Module(m) => m.import(name).is_none() && m.declarative.delete(name),
            EnvironmentRecord::Global(g) if g.declarative.has(name) => g.declarative.delete(name),
            EnvironmentRecord::Global(g) => {
                let key = ObjectRecord::key(name);
                if !realm.has_own_property(g.object.object, &key) {
                    return true;
                }
                let deleted = realm.delete_property(g.object.object, &key);
                if deleted {
                    g.var_names.borrow_mut().remove(name);
                }
                deleted
            }
            EnvironmentRecord::Object(o) => realm.delete_property(o.object, &ObjectRecord::key(name)),
        }
    }

    pub fn has_this_binding(&self) -> bool {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.function.is_some(),
            EnvironmentRecord::Global(_) | EnvironmentRecord::Module(_) => true,
            EnvironmentRecord::Object(_) => false,
        }
    }

    pub fn function_scope(&self) -> Option<&FunctionScope> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => d.function.as_ref(),
            _ => None,
        }
    }

    pub fn with_base_object(&self) -> Option<JsObject> {
        match &self.record {
            EnvironmentRecord::Object(o) if o.with_environment => Some(o.object),
            _ => None,
        }
    }

    pub fn global(&self) -> Option<&GlobalRecord> {
        match &self.record {
            EnvironmentRecord::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn module(&self) -> Option<&ModuleRecord> {
        match &self.record {
            EnvironmentRecord::Module(m) => Some(m),
            _ => None,
        }
    }

    /// Value of `this` in this environment, which must have a this binding.
    pub fn get_this_binding(&self) -> Result<JsValue, BindingError> {
        match &self.record {
            EnvironmentRecord::Declarative(d) => match &d.function {
                Some(scope) => scope
                    .this
                    .borrow()
                    .clone()
                    .ok_or_else(|| BindingError::Uninitialized(Rc::from("this"))),
                None => Ok(JsValue::Undefined),
            },
            EnvironmentRecord::Global(g) => Ok(g.this.clone()),
            EnvironmentRecord::Module(_) | EnvironmentRecord::Object(_) => Ok(JsValue::Undefined),
        }
    }

    /// Binds `this` once `super()` has produced it.
    pub fn bind_this_value(&self, value: JsValue) -> Result<(), BindingError> {
        let Some(scope) = self.function_scope() else {
            return Err(BindingError::NotDefined(Rc::from("this")));
        };
        let mut this = scope.this.borrow_mut();
        if this.is_some() {
            return Err(BindingError::AlreadyInitialized(Rc::from("this")));
        }
        *this = Some(value);
        Ok(())
    }
}

/// The nearest environment providing `this`.
pub fn this_environment(env: &EnvRef) -> EnvRef {
    let mut current = env.clone();
    loop {
        if current.has_this_binding() {
            return current;
        }
        match &current.outer {
            Some(outer) => current = outer.clone(),
            None => return current,
        }
    }
}

/// Resolves an identifier along the scope chain.
pub fn resolve_binding(realm: &Realm, env: &EnvRef, name: &Rc<str>, strict: bool) -> Reference {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        if e.has_binding(realm, name) {
            return Reference::Binding {
                env: e,
                name: name.clone(),
                strict,
            };
        }
        current = e.outer.clone();
    }
    Reference::Unresolvable {
        name: name.clone(),
        strict,
    }
}

impl Trace for DeclarativeRecord {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Ok(bindings) = self.bindings.try_borrow() {
            for binding in bindings.values() {
                binding.value.trace(tracer);
            }
        }
        if let Some(scope) = &self.function {
            scope.this.trace(tracer);
            tracer.object(scope.function);
            scope.home_object.trace(tracer);
            scope.new_target.trace(tracer);
        }
    }
}

impl Trace for EnvironmentRecord {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            EnvironmentRecord::Declarative(record) => record.trace(tracer),
            EnvironmentRecord::Object(record) => tracer.object(record.object),
            EnvironmentRecord::Global(record) => {
                tracer.object(record.object.object);
                record.declarative.trace(tracer);
                record.this.trace(tracer);
            }
            EnvironmentRecord::Module(record) => {
                record.declarative.trace(tracer);
                if let Ok(imports) = record.imports.try_borrow() {
                    for (env, _) in imports.values() {
                        env.trace(tracer);
                    }
                }
            }
        }
    }
}

/// Walks the scope chain outward, stopping at the first environment
/// already visited.
impl Trace for LexicalEnvironment {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        let mut next = Some(self);
        while let Some(env) = next
            && tracer.first_visit(env)
        {
            env.record.trace(tracer);
            next = env.outer.as_deref();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    #[test]
    fn declarative_tdz_and_initialization() {
        let record = DeclarativeRecord::default();
        record.create_mutable(&name("x"), false).unwrap();
        assert!(matches!(record.get(&name("x")), Err(BindingError::Uninitialized(n)) if &*n == "x"));
        assert_eq!(
            record.set(&name("x"), JsValue::Number(1.0), true),
            Err(BindingError::Uninitialized(name("x")))
        );
        record.initialize(&name("x"), JsValue::Number(1.0)).unwrap();
        record.set(&name("x"), JsValue::Number(2.0), true).unwrap();
        assert!(matches!(record.get(&name("x")), Ok(JsValue::Number(n)) if n == 2.0));
    }

    #[test]
    fn immutable_assignment_rules() {
        let record = DeclarativeRecord::default();
        record.create_immutable(&name("c"), true).unwrap();
        record.initialize(&name("c"), JsValue::Null).unwrap();
        assert_eq!(
            record.set(&name("c"), JsValue::Undefined, false),
            Err(BindingError::Immutable(name("c")))
        );

        // Sloppy non-strict immutable bindings (named function expressions) ignore writes.
        record.create_immutable(&name("f"), false).unwrap();
        record.initialize(&name("f"), JsValue::Null).unwrap();
        assert_eq!(record.set(&name("f"), JsValue::Undefined, false), Ok(()));
        assert!(matches!(record.get(&name("f")), Ok(JsValue::Null)));
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let record = DeclarativeRecord::default();
        record.create_mutable(&name("a"), false).unwrap();
        assert_eq!(
            record.create_mutable(&name("a"), false),
            Err(BindingError::AlreadyDeclared(name("a")))
        );
    }

    #[test]
    fn only_deletable_bindings_are_removed() {
        let record = DeclarativeRecord::default();
        record.create_mutable(&name("kept"), false).unwrap();
        record.create_mutable(&name("gone"), true).unwrap();
        assert!(!record.delete("kept"));
        assert!(record.delete("gone"));
        assert!(!record.has("gone"));
        assert!(record.delete("never-declared"));
    }
}
