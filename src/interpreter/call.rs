//! Function objects and invocation.
//!
//! Calling a guest function never recurses on the host stack: [`begin_call`]
//! returns a [`FunctionFrame`] for the driver to push, and the frame runs
//! parameter binding, body instantiation and the body itself as ordinary
//! coroutine steps.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::Realm;
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step, Syntax};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::driver::FrameSlot;
use super::environment::{DeclarativeRecord, EnvRef, EnvironmentRecord, FunctionScope, LexicalEnvironment};
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::{Trace, Tracer};
use super::instantiate;
use super::object::{
    Fault, FunctionData, GeneratorData, GeneratorStatus, ObjectData, ObjectKind, PropertyDescriptor,
};
use super::pattern::{BindFrame, BindMode};
use crate::ast::{FunctionBody, FunctionKind, FunctionNode, Pattern, bound_names};
use crate::error::EngineError;
use crate::types::{JsObject, JsValue, PropertyKey};

/// A guest function: its code plus the environment it closes over.
#[derive(Debug)]
pub struct Closure {
    pub node: Rc<FunctionNode>,
    pub env: EnvRef,
    pub home_object: Option<JsObject>,
}

impl Closure {
    pub fn is_constructor(&self) -> bool {
        match self.node.kind {
            FunctionKind::Normal => !self.node.is_async && !self.node.is_generator,
            FunctionKind::ClassConstructor { .. } => true,
            FunctionKind::Arrow | FunctionKind::Method => false,
        }
    }

    pub fn is_class_constructor(&self) -> bool {
        matches!(self.node.kind, FunctionKind::ClassConstructor { .. })
    }

    fn is_derived(&self) -> bool {
        matches!(self.node.kind, FunctionKind::ClassConstructor { derived: true })
    }
}

/// Arguments of a native function call.
#[derive(Debug)]
pub struct NativeCall {
    pub this: JsValue,
    pub args: Vec<JsValue>,
    pub function: JsObject,
    /// `Some` when invoked through `new`.
    pub new_target: Option<JsValue>,
}

impl NativeCall {
    pub fn arg(&self, index: usize) -> JsValue {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// A built-in function. `Err` is a guest throw.
pub type NativeFn = fn(&mut Realm, &mut NativeCall) -> Result<CallOutcome, JsValue>;

/// What starting a call produced.
#[derive(Debug)]
pub enum CallOutcome {
    /// The call finished without running guest code.
    Complete(Completion),
    /// A frame must run to produce the result.
    Enter(Frame),
    /// Previously suspended frames continue with `input` (generator resumption).
    Resume { frames: Vec<FrameSlot>, input: Resumption },
}

impl CallOutcome {
    pub fn value(value: JsValue) -> Self {
        CallOutcome::Complete(Completion::normal(value))
    }

    pub fn throw(value: JsValue) -> Self {
        CallOutcome::Complete(Completion::Throw(value))
    }

    pub fn undefined() -> Self {
        Self::value(JsValue::Undefined)
    }
}

impl From<Result<CallOutcome, JsValue>> for CallOutcome {
    fn from(result: Result<CallOutcome, JsValue>) -> Self {
        result.unwrap_or_else(CallOutcome::throw)
    }
}

/// Allocates a function object for `node` closing over `env`.
pub fn create_closure(realm: &mut Realm, node: &Rc<FunctionNode>, env: &EnvRef, home_object: Option<JsObject>) -> JsObject {
    let closure = Rc::new(Closure {
        node: node.clone(),
        env: env.clone(),
        home_object,
    });
    let constructor = closure.is_constructor() && !closure.is_class_constructor();
    let proto = realm.intrinsics.function_prototype;
    let mut data = ObjectData::new(ObjectKind::Function(FunctionData::Closure(closure)), Some(proto));
    data.insert_property(
        PropertyKey::from("length"),
        PropertyDescriptor::data(JsValue::Number(node.expected_arguments() as f64), false, false, true),
    );
    let name = node.name.clone().unwrap_or_else(|| Rc::from(""));
    data.insert_property(
        PropertyKey::from("name"),
        PropertyDescriptor::data(JsValue::String(name), false, false, true),
    );
    let f = realm.alloc(data);
    if node.is_generator {
        let generator_proto = realm.intrinsics.generator_prototype;
        let prototype = realm.create_object_with_proto(Some(generator_proto));
        realm.object_mut(f).insert_property(
            PropertyKey::from("prototype"),
            PropertyDescriptor::data(JsValue::Object(prototype), true, false, false),
        );
    } else if constructor {
        let prototype = realm.create_object();
        realm.object_mut(prototype).insert_builtin("constructor", JsValue::Object(f));
        realm.object_mut(f).insert_property(
            PropertyKey::from("prototype"),
            PropertyDescriptor::data(JsValue::Object(prototype), true, false, false),
        );
    }
    f
}

fn not_a_function(realm: &mut Realm, callee: &JsValue) -> CallOutcome {
    let message = format!("{} is not a function", realm.describe(callee));
    CallOutcome::throw(realm.type_error(message))
}

/// `this` as seen by a non-arrow function body.
fn bind_this(realm: &mut Realm, closure: &Closure, this: JsValue) -> Result<JsValue, JsValue> {
    if closure.node.strict {
        return Ok(this);
    }
    match this {
        JsValue::Undefined | JsValue::Null => Ok(JsValue::Object(realm.global_object())),
        JsValue::Object(_) => Ok(this),
        primitive => realm.to_object(&primitive).map(JsValue::Object),
    }
}

/// Starts `[[Call]]` of `callee`.
pub fn begin_call(realm: &mut Realm, callee: &JsValue, this: JsValue, args: Vec<JsValue>) -> CallOutcome {
    let Some(function) = callee.as_object().filter(|o| realm.object(*o).is_callable()) else {
        return not_a_function(realm, callee);
    };
    let data = match realm.object(function).function() {
        Some(FunctionData::Closure(c)) => Invocable::Closure(c.clone()),
        Some(FunctionData::Native { func, .. }) => Invocable::Native(*func),
        Some(FunctionData::DefaultConstructor { .. }) => Invocable::ClassConstructor,
        Some(FunctionData::Bound { target, this, args }) => Invocable::Bound(*target, this.clone(), args.clone()),
        Some(FunctionData::PromiseResolver {
            promise,
            reject,
            already_resolved,
        }) => Invocable::Resolver(*promise, *reject, already_resolved.clone()),
        None => return not_a_function(realm, callee),
    };
    match data {
        Invocable::Closure(closure) => {
            if closure.is_class_constructor() {
                return class_without_new(realm, function);
            }
            let this = if closure.node.kind == FunctionKind::Arrow {
                None
            } else {
                match bind_this(realm, &closure, this) {
                    Ok(this) => Some(this),
                    Err(e) => return CallOutcome::throw(e),
                }
            };
            let kind = if closure.node.is_generator {
                let proto = realm.prototype_from_constructor(function, realm.intrinsics.generator_prototype);
                let generator = realm.alloc(ObjectData::new(
                    ObjectKind::Generator(GeneratorData {
                        status: GeneratorStatus::SuspendedStart,
                        frames: Vec::new(),
                    }),
                    Some(proto),
                ));
                InvocationKind::Generator(generator)
            } else if closure.node.is_async {
                InvocationKind::Async(realm.create_promise())
            } else {
                InvocationKind::Normal
            };
            CallOutcome::Enter(FunctionFrame::enter(realm, closure, function, this, JsValue::Undefined, args, kind))
        }
        Invocable::Native(func) => {
            let mut call = NativeCall {
                this,
                args,
                function,
                new_target: None,
            };
            func(realm, &mut call).into()
        }
        Invocable::ClassConstructor => class_without_new(realm, function),
        Invocable::Resolver(promise, reject, already_resolved) => {
            if already_resolved.replace(true) {
                return CallOutcome::undefined();
            }
            let resolution = args.into_iter().next().unwrap_or_default();
            if reject {
                realm.reject_promise(promise, resolution);
            } else {
                realm.resolve_promise(promise, resolution);
            }
            CallOutcome::undefined()
        }
        Invocable::Bound(target, bound_this, mut bound_args) => {
            bound_args.extend(args);
            begin_call(realm, &JsValue::Object(target), bound_this, bound_args)
        }
    }
}

enum Invocable {
    Closure(Rc<Closure>),
    Native(NativeFn),
    ClassConstructor,
    Bound(JsObject, JsValue, Vec<JsValue>),
    Resolver(JsObject, bool, Rc<std::cell::Cell<bool>>),
}

fn class_without_new(realm: &mut Realm, function: JsObject) -> CallOutcome {
    let name = realm.get_data_str(function, "name");
    let message = format!("Class constructor {} cannot be invoked without 'new'", name);
    CallOutcome::throw(realm.type_error(message))
}

/// Starts `[[Construct]]` of `callee` with the given `new.target`.
pub fn begin_construct(realm: &mut Realm, callee: &JsValue, args: Vec<JsValue>, new_target: &JsValue) -> CallOutcome {
    let Some(function) = callee.as_object().filter(|_| realm.is_constructor(callee)) else {
        let message = format!("{} is not a constructor", realm.describe(callee));
        return CallOutcome::throw(realm.type_error(message));
    };
    let target_obj = new_target.as_object().unwrap_or(function);
    let data = match realm.object(function).function() {
        Some(FunctionData::Closure(c)) => Invocable::Closure(c.clone()),
        Some(FunctionData::Native { func, .. }) => Invocable::Native(*func),
        Some(FunctionData::DefaultConstructor { derived, .. }) => {
            if *derived {
                // The parent constructor is the prototype of the class itself.
                let parent = realm.object(function).prototype.map(JsValue::Object).unwrap_or_default();
                return begin_construct(realm, &parent, args, new_target);
            }
            let proto = realm.prototype_from_constructor(target_obj, realm.intrinsics.object_prototype);
            let this = realm.create_object_with_proto(Some(proto));
            return CallOutcome::value(JsValue::Object(this));
        }
        Some(FunctionData::Bound { target, args: bound, .. }) => {
            let target = JsValue::Object(*target);
            let mut all = bound.clone();
            all.extend(args);
            let new_target = if new_target.as_object() == Some(function) {
                target.clone()
            } else {
                new_target.clone()
            };
            return begin_construct(realm, &target, all, &new_target);
        }
        Some(FunctionData::PromiseResolver { .. }) | None => return not_a_function(realm, callee),
    };
    match data {
        Invocable::Closure(closure) => {
            let this = if closure.is_derived() {
                None
            } else {
                let proto = realm.prototype_from_constructor(target_obj, realm.intrinsics.object_prototype);
                Some(realm.create_object_with_proto(Some(proto)))
            };
            let this_value = this.map(JsValue::Object);
            CallOutcome::Enter(FunctionFrame::enter(
                realm,
                closure,
                function,
                this_value,
                new_target.clone(),
                args,
                InvocationKind::Construct(this),
            ))
        }
        Invocable::Native(func) => {
            let mut call = NativeCall {
                this: JsValue::Undefined,
                args,
                function,
                new_target: Some(new_target.clone()),
            };
            func(realm, &mut call).into()
        }
        Invocable::ClassConstructor | Invocable::Bound(..) | Invocable::Resolver(..) => {
            not_a_function(realm, callee)
        }
    }
}

/// How the result of a function body is turned into the call's result.
#[derive(Debug, Clone)]
pub enum InvocationKind {
    Normal,
    /// `Some(this)` for base constructors; derived constructors get `this`
    /// from `super()`.
    Construct(Option<JsObject>),
    Generator(JsObject),
    Async(JsObject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionPhase {
    /// Binding parameter `n` (or the rest parameter when `n == params.len()`).
    Parameter(usize),
    /// Waiting for the default initializer of parameter `n`.
    Default(usize),
    /// Waiting for a destructuring parameter to bind.
    Binding(usize),
    /// Suspended at generator start.
    Started,
    Statement(usize),
    ExpressionBody,
}

/// The boundary frame of one function invocation.
#[derive(Debug)]
pub struct FunctionFrame {
    closure: Rc<Closure>,
    kind: InvocationKind,
    env: EnvRef,
    context: Rc<EvaluationContext>,
    args: Vec<JsValue>,
    phase: FunctionPhase,
}

impl FunctionFrame {
    /// Builds the invocation's function environment and returns the frame.
    pub fn enter(
        realm: &mut Realm,
        closure: Rc<Closure>,
        function: JsObject,
        this: Option<JsValue>,
        new_target: JsValue,
        args: Vec<JsValue>,
        kind: InvocationKind,
    ) -> Frame {
        let record = if closure.node.kind == FunctionKind::Arrow {
            DeclarativeRecord::default()
        } else {
            DeclarativeRecord::for_function(FunctionScope {
                this: RefCell::new(this),
                function,
                home_object: closure.home_object,
                new_target,
            })
        };
        let env = LexicalEnvironment::new(EnvironmentRecord::Declarative(record), Some(closure.env.clone()));
        let mut names = Vec::new();
        for param in closure.node.params.iter() {
            bound_names(&param.target, &mut names);
        }
        if let Some(rest) = &closure.node.rest {
            bound_names(rest, &mut names);
        }
        for name in &names {
            if !env.has_binding(realm, name) {
                // Fresh declarative record: creation cannot collide.
                let _ = env.create_mutable_binding(realm, name, false);
            }
        }
        let context = EvaluationContext::new(realm.id(), env.clone(), closure.node.strict);
        trace!(function = ?closure.node.name, "invocation entered");
        let location = closure.node.location;
        Frame::at(
            FrameKind::Function(FunctionFrame {
                closure,
                kind,
                env,
                context,
                args,
                phase: FunctionPhase::Parameter(0),
            }),
            location,
        )
    }

    pub fn kind(&self) -> &InvocationKind {
        &self.kind
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (FunctionPhase::Parameter(_), Resumption::Start) => self.parameters(realm),
            (FunctionPhase::Default(n), Resumption::Value(value)) => {
                if let Some(default) = &self.closure.node.params[n].default {
                    let target = self.closure.node.params[n].target.clone();
                    realm.name_anonymous_function(default, &target, &value);
                }
                self.bind_parameter(realm, n, value)
            }
            (FunctionPhase::Binding(n), Resumption::Value(_)) => {
                self.phase = FunctionPhase::Parameter(n + 1);
                self.parameters(realm)
            }
            (FunctionPhase::Started, Resumption::Value(_)) => {
                self.phase = FunctionPhase::Statement(0);
                self.body(realm)
            }
            (FunctionPhase::Statement(n), Resumption::Completion(completion)) => match completion {
                Completion::Normal(_) => {
                    self.phase = FunctionPhase::Statement(n + 1);
                    self.body(realm)
                }
                Completion::Return(_) | Completion::Throw(_) => self.finish(realm, completion),
                Completion::Break(..) | Completion::Continue(..) => Err(EngineError::defect(format!(
                    "{completion:?} escaped a function body"
                ))),
            },
            (FunctionPhase::ExpressionBody, Resumption::Value(value)) => self.finish(realm, Completion::Return(value)),
            (_, Resumption::Completion(completion @ Completion::Throw(_))) => self.finish(realm, completion),
            (_, input) => Err(unexpected("function", &input)),
        }
    }

    fn parameters(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        let node = self.closure.node.clone();
        loop {
            let FunctionPhase::Parameter(n) = self.phase else {
                return Err(EngineError::defect("parameter binding out of phase"));
            };
            if n < node.params.len() {
                let value = self.args.get(n).cloned().unwrap_or_default();
                if value.is_undefined()
                    && let Some(default) = &node.params[n].default
                {
                    self.phase = FunctionPhase::Default(n);
                    return Ok(Command::evaluate(Syntax::Expression(default.clone()), &self.context, EvalOptions::CATCH).into());
                }
                if let Some(step) = self.bind(realm, n, &node.params[n].target, value)? {
                    return Ok(step);
                }
            } else if n == node.params.len()
                && let Some(rest) = &node.rest
            {
                let rest_values = self.args.get(node.params.len()..).map(<[JsValue]>::to_vec).unwrap_or_default();
                let array = JsValue::Object(realm.create_array(rest_values));
                if let Some(step) = self.bind(realm, n, rest, array)? {
                    return Ok(step);
                }
            } else {
                return self.instantiate(realm);
            }
            self.phase = FunctionPhase::Parameter(n + 1);
        }
    }

    fn bind_parameter(&mut self, realm: &mut Realm, n: usize, value: JsValue) -> Result<Step, EngineError> {
        let target = self.closure.node.params[n].target.clone();
        if let Some(step) = self.bind(realm, n, &target, value)? {
            return Ok(step);
        }
        self.phase = FunctionPhase::Parameter(n + 1);
        self.parameters(realm)
    }

    /// Binds one parameter; returns a step when a destructuring frame must run.
    fn bind(&mut self, realm: &mut Realm, n: usize, target: &Rc<Pattern>, value: JsValue) -> Result<Option<Step>, EngineError> {
        if let Pattern::Identifier(name) = &**target {
            let result = match self.env.initialize_binding(realm, name, value.clone()) {
                // Duplicate sloppy-mode parameter names: the last one wins.
                Err(crate::error::BindingError::AlreadyInitialized(_)) => {
                    self.env.set_mutable_binding(realm, name, value, false)
                }
                other => other,
            };
            return match result {
                Ok(()) => Ok(None),
                Err(e) => {
                    let error = realm.throw_fault(Fault::from(e));
                    self.finish(realm, Completion::Throw(error)).map(Some)
                }
            };
        }
        self.phase = FunctionPhase::Binding(n);
        let frame = BindFrame::new(target.clone(), value, BindMode::Initialize(self.env.clone()), self.context.clone());
        Ok(Some(Command::enter(Frame::internal(FrameKind::Bind(frame)), EvalOptions::CATCH).into()))
    }

    fn instantiate(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        match instantiate::function_body(realm, &self.closure.node, &self.env) {
            Ok(context) => self.context = context,
            Err(error) => return self.finish(realm, Completion::Throw(error)),
        }
        if let InvocationKind::Generator(generator) = self.kind {
            self.phase = FunctionPhase::Started;
            return Ok(Command::Host(HostOperation::GeneratorStart(generator), EvalOptions::CATCH).into());
        }
        self.phase = FunctionPhase::Statement(0);
        self.body(realm)
    }

    fn body(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        match &self.closure.node.body {
            FunctionBody::Expression(expr) => {
                self.phase = FunctionPhase::ExpressionBody;
                Ok(Command::evaluate(Syntax::Expression(expr.clone()), &self.context, EvalOptions::CATCH).into())
            }
            FunctionBody::Statements(statements) => {
                let n = match self.phase {
                    FunctionPhase::Statement(n) => n,
                    _ => 0,
                };
                self.phase = FunctionPhase::Statement(n);
                match statements.get(n) {
                    Some(stmt) => Ok(Step::statement(stmt, &self.context)),
                    None => self.finish(realm, Completion::empty()),
                }
            }
        }
    }

    fn finish(&mut self, realm: &mut Realm, completion: Completion) -> Result<Step, EngineError> {
        let outcome = match completion {
            Completion::Return(v) => Ok(v),
            Completion::Normal(_) => Ok(JsValue::Undefined),
            Completion::Throw(e) => Err(e),
            other => return Err(EngineError::defect(format!("{other:?} escaped a function body"))),
        };
        let result = match &self.kind {
            InvocationKind::Normal => Completion::from(outcome),
            InvocationKind::Construct(this) => match outcome {
                Err(e) => Completion::Throw(e),
                Ok(v @ JsValue::Object(_)) => Completion::normal(v),
                Ok(_) if this.is_some() => Completion::normal(this.map(JsValue::Object).unwrap_or_default()),
                Ok(JsValue::Undefined) => match self.env.get_this_binding() {
                    Ok(this) => Completion::normal(this),
                    Err(_) => Completion::Throw(realm.reference_error(
                        "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
                    )),
                },
                Ok(_) => Completion::Throw(realm.type_error("Derived constructors may only return object or undefined")),
            },
            InvocationKind::Generator(generator) => {
                realm.set_generator_status(*generator, GeneratorStatus::Completed);
                match outcome {
                    Ok(v) => Completion::normal(realm.create_iter_result_object(v, true)),
                    Err(e) => Completion::Throw(e),
                }
            }
            InvocationKind::Async(promise) => {
                match outcome {
                    Ok(v) => realm.resolve_promise(*promise, v),
                    Err(e) => realm.reject_promise(*promise, e),
                }
                Completion::normal(JsValue::Object(*promise))
            }
        };
        Ok(Step::Done(result))
    }
}

/// Root frame of a job that calls one function, such as a timer callback.
#[derive(Debug)]
pub struct InvokeFrame {
    callee: JsValue,
    this: JsValue,
    args: Option<Vec<JsValue>>,
}

impl InvokeFrame {
    pub fn new(callee: JsValue, this: JsValue, args: Vec<JsValue>) -> Self {
        Self {
            callee,
            this,
            args: Some(args),
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => {
                let args = self.args.take().unwrap_or_default();
                Ok(Command::call_catching(self.callee.clone(), self.this.clone(), args).into())
            }
            Resumption::Value(v) => Ok(Step::value(v)),
            Resumption::Completion(c) => Ok(Step::Done(c)),
            other => Err(unexpected("invoke", &other)),
        }
    }
}

impl Realm {
    /// Prototype for objects created by `constructor`, falling back to `default`.
    pub fn prototype_from_constructor(&self, constructor: JsObject, default: JsObject) -> JsObject {
        self.get_data_str(constructor, "prototype").as_object().unwrap_or(default)
    }

    /// SetFunctionName with an optional `get`/`set` prefix.
    pub fn set_function_name(&mut self, function: JsObject, key: &PropertyKey, prefix: Option<&str>) {
        let base = match key {
            PropertyKey::String(s) => s.to_string(),
            PropertyKey::Symbol(sym) => sym
                .description
                .as_ref()
                .map(|d| format!("[{d}]"))
                .unwrap_or_default(),
        };
        let name = match prefix {
            Some(p) => format!("{p} {base}"),
            None => base,
        };
        self.define_own_property(
            function,
            PropertyKey::from("name"),
            PropertyDescriptor::data(JsValue::String(Rc::from(name)), false, false, true),
        );
    }

    /// Names the function an anonymous function definition evaluated to
    /// after the identifier it is bound to.
    pub fn name_anonymous_function(&mut self, expr: &crate::ast::Expression, target: &Pattern, value: &JsValue) {
        if let Pattern::Identifier(name) = target {
            self.name_if_anonymous(expr, name, value);
        }
    }

    pub fn name_if_anonymous(&mut self, expr: &crate::ast::Expression, name: &Rc<str>, value: &JsValue) {
        if !crate::ast::is_anonymous_function_definition(expr) {
            return;
        }
        if let Some(f) = value.as_object()
            && self.object(f).is_callable()
        {
            let current = self.get_own_property(f, &PropertyKey::from("name"));
            let unnamed = current.and_then(|d| d.value).is_none_or(|v| v.as_str() == Some(""));
            if unnamed {
                self.set_function_name(f, &PropertyKey::String(name.clone()), None);
            }
        }
    }

    pub fn set_generator_status(&mut self, generator: JsObject, status: GeneratorStatus) {
        if let ObjectKind::Generator(data) = &mut self.object_mut(generator).kind {
            data.status = status;
            if status == GeneratorStatus::Completed {
                data.frames.clear();
            }
        }
    }
}

impl Trace for Closure {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.env.trace(tracer);
        self.home_object.trace(tracer);
    }
}

impl Trace for InvocationKind {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            InvocationKind::Normal => {}
            InvocationKind::Construct(this) => this.trace(tracer),
            InvocationKind::Generator(o) | InvocationKind::Async(o) => tracer.object(*o),
        }
    }
}

impl Trace for FunctionFrame {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.closure.trace(tracer);
        self.kind.trace(tracer);
        self.env.trace(tracer);
        self.context.trace(tracer);
        self.args.trace(tracer);
    }
}

impl Trace for InvokeFrame {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.callee.trace(tracer);
        self.this.trace(tracer);
        self.args.trace(tracer);
    }
}
