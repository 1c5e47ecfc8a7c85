//! Source text modules: loading, linking and graph evaluation.
//!
//! Loading happens on the host side before any guest code runs: the
//! resolver supplies source text, every module is parsed once and its
//! import and export entries are recorded. Linking walks the graph depth
//! first and wires import bindings to the exporting environments. The
//! whole graph is then evaluated by a single [`ModuleGraphFrame`].

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::Realm;
use super::command::{Command, EvalOptions, Resumption, Step};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::environment::{EnvRef, EnvironmentRecord, LexicalEnvironment, ModuleRecord};
use super::exec::StatementListFrame;
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::trace_fields;
use super::instantiate;
use super::object::{NamespaceEntry, ObjectData, ObjectKind, PropertyDescriptor};
use crate::ast::{
    ExportDeclaration, ImportSpecifier, LexicalDeclaration, Program, Statement, StatementKind, lexical_declarations,
    var_declared_names,
};
use crate::error::EngineError;
use crate::parser::Parser;
use crate::types::{JsObject, JsValue, WellKnownSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleStatus {
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    Evaluated,
}

#[derive(Debug, Clone, PartialEq)]
enum ImportName {
    Name(Rc<str>),
    Namespace,
}

#[derive(Debug, Clone)]
struct ImportEntry {
    request: Rc<str>,
    import: ImportName,
    local: Rc<str>,
}

/// `export {x as y} from 'm'` and `export * as y from 'm'`.
#[derive(Debug, Clone)]
struct IndirectExport {
    exported: Rc<str>,
    request: Rc<str>,
    import: ImportName,
}

/// Static import and export entries of one module body.
#[derive(Debug, Default)]
struct ModuleEntries {
    requests: Vec<Rc<str>>,
    imports: Vec<ImportEntry>,
    /// `(exported, local)` pairs.
    local_exports: Vec<(Rc<str>, Rc<str>)>,
    indirect_exports: Vec<IndirectExport>,
    star_exports: Vec<Rc<str>>,
}

impl ModuleEntries {
    fn from_program(program: &Program) -> Self {
        let mut entries = ModuleEntries::default();
        for stmt in program.body.iter() {
            match &stmt.kind {
                StatementKind::Import(decl) => {
                    entries.request(&decl.source);
                    for specifier in decl.specifiers.iter() {
                        let (import, local) = match specifier {
                            ImportSpecifier::Named { imported, local } => (ImportName::Name(imported.clone()), local),
                            ImportSpecifier::Default(local) => (ImportName::Name(Rc::from("default")), local),
                            ImportSpecifier::Namespace(local) => (ImportName::Namespace, local),
                        };
                        entries.imports.push(ImportEntry {
                            request: decl.source.clone(),
                            import,
                            local: local.clone(),
                        });
                    }
                }
                StatementKind::Export(export) => entries.add_export(export),
                _ => {}
            }
        }
        // A re-exported import forwards to the module it came from.
        let imports = &entries.imports;
        let mut forwarded = Vec::new();
        entries.local_exports.retain(|(exported, local)| {
            match imports.iter().find(|i| &i.local == local) {
                Some(import) if import.import != ImportName::Namespace => {
                    forwarded.push(IndirectExport {
                        exported: exported.clone(),
                        request: import.request.clone(),
                        import: import.import.clone(),
                    });
                    false
                }
                _ => true,
            }
        });
        entries.indirect_exports.extend(forwarded);
        entries
    }

    fn request(&mut self, source: &Rc<str>) {
        if !self.requests.contains(source) {
            self.requests.push(source.clone());
        }
    }

    fn add_export(&mut self, export: &ExportDeclaration) {
        let default: Rc<str> = Rc::from("default");
        let anonymous = || Rc::from("*default*");
        match export {
            ExportDeclaration::Declaration(inner) => {
                for name in declared_names(inner) {
                    self.local_exports.push((name.clone(), name));
                }
            }
            ExportDeclaration::Named { specifiers, source: None } => {
                for s in specifiers.iter() {
                    self.local_exports.push((s.exported.clone(), s.local.clone()));
                }
            }
            ExportDeclaration::Named {
                specifiers,
                source: Some(source),
            } => {
                self.request(source);
                for s in specifiers.iter() {
                    self.indirect_exports.push(IndirectExport {
                        exported: s.exported.clone(),
                        request: source.clone(),
                        import: ImportName::Name(s.local.clone()),
                    });
                }
            }
            ExportDeclaration::DefaultExpression(_) => self.local_exports.push((default, anonymous())),
            ExportDeclaration::DefaultFunction(f) => {
                self.local_exports.push((default, f.name.clone().unwrap_or_else(anonymous)));
            }
            ExportDeclaration::DefaultClass(c) => {
                self.local_exports.push((default, c.name.clone().unwrap_or_else(anonymous)));
            }
            ExportDeclaration::All { exported: None, source } => {
                self.request(source);
                self.star_exports.push(source.clone());
            }
            ExportDeclaration::All {
                exported: Some(exported),
                source,
            } => {
                self.request(source);
                self.indirect_exports.push(IndirectExport {
                    exported: exported.clone(),
                    request: source.clone(),
                    import: ImportName::Namespace,
                });
            }
        }
    }
}

/// Names bound by an exported declaration.
fn declared_names(stmt: &Rc<Statement>) -> Vec<Rc<str>> {
    let body = [stmt.clone()];
    let mut names: Vec<Rc<str>> = lexical_declarations(&body, true)
        .iter()
        .map(LexicalDeclaration::name)
        .collect();
    names.extend(var_declared_names(&body));
    names
}

#[derive(Debug)]
pub(crate) struct SourceModule {
    specifier: Rc<str>,
    program: Rc<Program>,
    env: EnvRef,
    entries: ModuleEntries,
    /// Loaded module for each entry of `entries.requests`.
    resolved: Vec<ModuleId>,
    status: ModuleStatus,
    namespace: Option<JsObject>,
    /// The exception its evaluation (or linking) ended with.
    error: Option<JsValue>,
}

/// Every module loaded into a realm, keyed by specifier.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: Vec<SourceModule>,
    by_specifier: FxHashMap<Rc<str>, ModuleId>,
}

impl ModuleRegistry {
    fn get(&self, id: ModuleId) -> &SourceModule {
        &self.modules[id.0]
    }

    fn get_mut(&mut self, id: ModuleId) -> &mut SourceModule {
        &mut self.modules[id.0]
    }

    /// The module `id` imports as `request`.
    fn requested(&self, id: ModuleId, request: &str) -> Option<ModuleId> {
        let module = self.get(id);
        let index = module.entries.requests.iter().position(|r| &**r == request)?;
        module.resolved.get(index).copied()
    }

    /// Forgets every module registered at or after `first`.
    fn truncate(&mut self, first: ModuleId) {
        self.modules.truncate(first.0);
        self.by_specifier.retain(|_, id| id.0 < first.0);
    }
}

/// Outcome of resolving an export name through a module's export entries.
#[derive(Debug, Clone, PartialEq)]
enum ResolvedExport {
    Binding(ModuleId, Rc<str>),
    Namespace(ModuleId),
    NotFound,
    Ambiguous,
}

impl Realm {
    /// Loads `specifier` and, recursively, every module it requests.
    pub(crate) fn load_module(&mut self, specifier: &str, referrer: Option<&str>) -> Result<ModuleId, EngineError> {
        if let Some(id) = self.modules.by_specifier.get(specifier) {
            return Ok(*id);
        }
        let failure = |message: String| EngineError::Module {
            specifier: specifier.to_string(),
            message,
        };
        let resolver = self
            .resolver
            .clone()
            .ok_or_else(|| failure("no module resolver is configured".to_string()))?;
        let source = resolver.resolve(specifier, referrer).map_err(failure)?;
        let program = Rc::new(Parser::parse_module(&source)?);
        let entries = ModuleEntries::from_program(&program);
        let requests = entries.requests.clone();
        let env = LexicalEnvironment::new(
            EnvironmentRecord::Module(ModuleRecord::default()),
            Some(self.global_env.clone()),
        );
        let id = ModuleId(self.modules.modules.len());
        let specifier: Rc<str> = Rc::from(specifier);
        debug!(module = %specifier, requests = requests.len(), "module loaded");
        self.modules.by_specifier.insert(specifier.clone(), id);
        self.modules.modules.push(SourceModule {
            specifier: specifier.clone(),
            program,
            env,
            entries,
            resolved: Vec::new(),
            status: ModuleStatus::Unlinked,
            namespace: None,
            error: None,
        });
        let mut resolved = Vec::with_capacity(requests.len());
        for request in &requests {
            match self.load_module(request, Some(&specifier)) {
                Ok(dependency) => resolved.push(dependency),
                Err(e) => {
                    self.modules.truncate(id);
                    return Err(e);
                }
            }
        }
        self.modules.get_mut(id).resolved = resolved;
        Ok(id)
    }

    fn resolve_export(&self, id: ModuleId, name: &str, visited: &mut Vec<(ModuleId, Rc<str>)>) -> ResolvedExport {
        if visited.iter().any(|(m, n)| *m == id && &**n == name) {
            // Circular re-export.
            return ResolvedExport::NotFound;
        }
        visited.push((id, Rc::from(name)));
        let entries = &self.modules.get(id).entries;
        if let Some((_, local)) = entries.local_exports.iter().find(|(exported, _)| &**exported == name) {
            return ResolvedExport::Binding(id, local.clone());
        }
        if let Some(indirect) = entries.indirect_exports.iter().find(|e| &*e.exported == name) {
            let Some(target) = self.modules.requested(id, &indirect.request) else {
                return ResolvedExport::NotFound;
            };
            return match &indirect.import {
                ImportName::Namespace => ResolvedExport::Namespace(target),
                ImportName::Name(imported) => self.resolve_export(target, imported, visited),
            };
        }
        if name == "default" {
            return ResolvedExport::NotFound;
        }
        let mut found = ResolvedExport::NotFound;
        for request in &entries.star_exports {
            let Some(target) = self.modules.requested(id, request) else {
                continue;
            };
            match self.resolve_export(target, name, visited) {
                ResolvedExport::NotFound => {}
                ResolvedExport::Ambiguous => return ResolvedExport::Ambiguous,
                resolution if found == ResolvedExport::NotFound => found = resolution,
                resolution if resolution != found => return ResolvedExport::Ambiguous,
                _ => {}
            }
        }
        found
    }

    fn exported_names(&self, id: ModuleId, visited: &mut Vec<ModuleId>) -> Vec<Rc<str>> {
        if visited.contains(&id) {
            return Vec::new();
        }
        visited.push(id);
        let entries = &self.modules.get(id).entries;
        let mut names: Vec<Rc<str>> = entries.local_exports.iter().map(|(exported, _)| exported.clone()).collect();
        names.extend(entries.indirect_exports.iter().map(|e| e.exported.clone()));
        for request in &entries.star_exports {
            let Some(target) = self.modules.requested(id, request) else {
                continue;
            };
            for name in self.exported_names(target, visited) {
                if &*name != "default" && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// The namespace object of a module, created on first request.
    pub(crate) fn module_namespace(&mut self, id: ModuleId) -> JsObject {
        if let Some(namespace) = self.modules.get(id).namespace {
            return namespace;
        }
        let namespace = self.alloc(ObjectData::new(
            ObjectKind::Namespace {
                module: id,
                exports: Vec::new(),
            },
            None,
        ));
        let data = self.object_mut(namespace);
        data.extensible = false;
        data.insert_property(
            WellKnownSymbol::ToStringTag.key(),
            PropertyDescriptor::data(JsValue::string("Module"), false, false, false),
        );
        self.modules.get_mut(id).namespace = Some(namespace);

        let mut names = self.exported_names(id, &mut Vec::new());
        names.sort();
        let mut exports = Vec::with_capacity(names.len());
        for name in names {
            match self.resolve_export(id, &name, &mut Vec::new()) {
                ResolvedExport::Binding(module, local) => {
                    let env = self.modules.get(module).env.clone();
                    exports.push((name, NamespaceEntry::Binding(env, local)));
                }
                ResolvedExport::Namespace(module) => {
                    let inner = self.module_namespace(module);
                    exports.push((name, NamespaceEntry::Namespace(inner)));
                }
                // Ambiguous star exports are left out of the namespace.
                ResolvedExport::NotFound | ResolvedExport::Ambiguous => {}
            }
        }
        if let ObjectKind::Namespace { exports: slot, .. } = &mut self.object_mut(namespace).kind {
            *slot = exports;
        }
        namespace
    }

    /// Links `id` and everything it depends on.
    pub(crate) fn link_module(&mut self, id: ModuleId) -> Result<(), JsValue> {
        let module = self.modules.get(id);
        if let Some(error) = &module.error {
            return Err(error.clone());
        }
        if module.status != ModuleStatus::Unlinked {
            return Ok(());
        }
        self.modules.get_mut(id).status = ModuleStatus::Linking;
        let result = self.link_declarations(id);
        let module = self.modules.get_mut(id);
        match result {
            Ok(()) => {
                module.status = ModuleStatus::Linked;
                debug!(module = %module.specifier, "module linked");
                Ok(())
            }
            Err(error) => {
                module.status = ModuleStatus::Evaluated;
                module.error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn link_declarations(&mut self, id: ModuleId) -> Result<(), JsValue> {
        for dependency in self.modules.get(id).resolved.clone() {
            self.link_module(dependency)?;
        }
        let module = self.modules.get(id);
        let program = module.program.clone();
        let env = module.env.clone();
        let imports = module.entries.imports.clone();
        let indirect: Vec<(Rc<str>, Rc<str>)> = module
            .entries
            .indirect_exports
            .iter()
            .map(|e| (e.exported.clone(), e.request.clone()))
            .collect();
        for (exported, request) in indirect {
            let resolution = self.resolve_export(id, &exported, &mut Vec::new());
            self.check_resolution(&resolution, &request, &exported)?;
        }

        instantiate::module_body(self, &program, &env)?;

        for import in imports {
            let Some(target) = self.modules.requested(id, &import.request) else {
                return Err(self.create_error("SyntaxError", &format!("Cannot find module '{}'", import.request)));
            };
            let resolution = match &import.import {
                ImportName::Namespace => ResolvedExport::Namespace(target),
                ImportName::Name(name) => {
                    let resolution = self.resolve_export(target, name, &mut Vec::new());
                    self.check_resolution(&resolution, &import.request, name)?;
                    resolution
                }
            };
            let bound = match resolution {
                ResolvedExport::Binding(module, local) => {
                    let target_env = self.modules.get(module).env.clone();
                    match env.module() {
                        Some(record) => record.create_import_binding(&import.local, target_env, local),
                        None => return Err(self.type_error("module environment expected")),
                    }
                }
                ResolvedExport::Namespace(module) => {
                    let namespace = self.module_namespace(module);
                    env.create_immutable_binding(&import.local, true).and_then(|()| {
                        env.initialize_binding(self, &import.local, JsValue::Object(namespace))
                    })
                }
                ResolvedExport::NotFound | ResolvedExport::Ambiguous => Ok(()),
            };
            if let Err(e) = bound {
                return Err(self.throw_fault(e.into()));
            }
        }
        Ok(())
    }

    fn check_resolution(&mut self, resolution: &ResolvedExport, request: &str, name: &str) -> Result<(), JsValue> {
        let message = match resolution {
            ResolvedExport::NotFound => {
                format!("The requested module '{request}' does not provide an export named '{name}'")
            }
            ResolvedExport::Ambiguous => {
                format!("The requested module '{request}' contains conflicting star exports for name '{name}'")
            }
            ResolvedExport::Binding(..) | ResolvedExport::Namespace(_) => return Ok(()),
        };
        Err(self.create_error("SyntaxError", &message))
    }

    /// Modules reachable from `root`, dependencies before dependents.
    fn evaluation_order(&self, root: ModuleId) -> Vec<ModuleId> {
        fn visit(realm: &Realm, id: ModuleId, seen: &mut FxHashSet<ModuleId>, order: &mut Vec<ModuleId>) {
            if !seen.insert(id) {
                return;
            }
            for dependency in &realm.modules.get(id).resolved {
                visit(realm, *dependency, seen, order);
            }
            order.push(id);
        }
        let mut order = Vec::new();
        visit(self, root, &mut FxHashSet::default(), &mut order);
        order
    }
}

/// Root frame of a module task: links the graph, evaluates every module
/// once in post-order and completes with the root's namespace.
#[derive(Debug)]
pub struct ModuleGraphFrame {
    root: ModuleId,
    order: Vec<ModuleId>,
    next: usize,
}

impl ModuleGraphFrame {
    pub fn new(root: ModuleId) -> Self {
        Self {
            root,
            order: Vec::new(),
            next: 0,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                if let Err(error) = realm.link_module(self.root) {
                    return Ok(Step::throw(error));
                }
                self.order = realm.evaluation_order(self.root);
                self.evaluate_next(realm)
            }
            Resumption::Completion(completion) => {
                let Some(&id) = self.next.checked_sub(1).and_then(|i| self.order.get(i)) else {
                    return Err(EngineError::defect("module completion without a running module"));
                };
                let module = realm.modules.get_mut(id);
                module.status = ModuleStatus::Evaluated;
                match completion {
                    Completion::Throw(error) => {
                        module.error = Some(error.clone());
                        Ok(Step::throw(error))
                    }
                    _ => {
                        debug!(module = %module.specifier, "module evaluated");
                        self.evaluate_next(realm)
                    }
                }
            }
            other => Err(unexpected("module-graph", &other)),
        }
    }

    fn evaluate_next(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        while let Some(&id) = self.order.get(self.next) {
            self.next += 1;
            let module = realm.modules.get(id);
            if let Some(error) = &module.error {
                return Ok(Step::throw(error.clone()));
            }
            if module.status != ModuleStatus::Linked {
                continue;
            }
            let context = EvaluationContext::new(realm.id(), module.env.clone(), true);
            let frame = StatementListFrame::new(module.program.body.clone(), context);
            realm.modules.get_mut(id).status = ModuleStatus::Evaluating;
            return Ok(Step::Command(Command::enter(
                Frame::internal(FrameKind::StatementList(frame)),
                EvalOptions::COMPLETION,
            )));
        }
        let namespace = realm.module_namespace(self.root);
        Ok(Step::value(JsValue::Object(namespace)))
    }
}

trace_fields! {
    SourceModule => env, namespace, error;
    ModuleRegistry => modules;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(source: &str) -> ModuleEntries {
        let program = Parser::parse_module(source).unwrap();
        ModuleEntries::from_program(&program)
    }

    #[test]
    fn export_forms_become_entries() {
        let e = entries(
            "import d, { a as b } from './dep';\n\
             import * as ns from './other';\n\
             export let x = 1, y = 2;\n\
             export { b as c, ns };\n\
             export default function () {}\n\
             export * from './star';\n\
             export * as all from './star';",
        );
        let requests: Vec<&str> = e.requests.iter().map(|r| &**r).collect();
        assert_eq!(requests, ["./dep", "./other", "./star"]);
        let local: Vec<(&str, &str)> = e.local_exports.iter().map(|(a, b)| (&**a, &**b)).collect();
        assert_eq!(local, [("x", "x"), ("y", "y"), ("ns", "ns"), ("default", "*default*")]);
        assert_eq!(e.star_exports.len(), 1);
        let indirect: Vec<(&str, &str)> = e.indirect_exports.iter().map(|i| (&*i.exported, &*i.request)).collect();
        assert_eq!(indirect, [("all", "./star"), ("c", "./dep")]);
        assert_eq!(e.imports.len(), 3);
    }
}
