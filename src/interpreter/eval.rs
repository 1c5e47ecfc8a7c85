//! Expression evaluation frames.

use std::rc::Rc;

use super::Realm;
use super::call::create_closure;
use super::command::{Command, EvalOptions, HostOperation, Resumption, Step};
use super::completion::Completion;
use super::context::EvaluationContext;
use super::environment::{LexicalEnvironment, resolve_binding, this_environment};
use super::frame::{Frame, FrameKind, unexpected};
use super::gc::trace_fields;
use super::iteration::iterate;
use super::object::{FunctionData, ObjectData, ObjectKind, PropertyDescriptor};
use super::operations::to_boolean;
use super::pattern::{BindFrame, BindMode};
use super::reference::Reference;
use crate::ast::{
    Argument, AssignOperator, BinaryOperator, ClassNode, Expression, FunctionKind, FunctionNode,
    Literal, LogicalOperator, MemberProperty, MethodKind, ObjectProperty, Pattern, PropertyName, UnaryOperator,
    is_anonymous_function_definition,
};
use crate::error::EngineError;
use crate::types::{JsObject, JsValue, PropertyKey};

pub fn literal_value(lit: &Literal) -> JsValue {
    match lit {
        Literal::Number(n) => JsValue::Number(*n),
        Literal::String(s) => JsValue::String(s.clone()),
        Literal::Boolean(b) => JsValue::Boolean(*b),
        Literal::Null => JsValue::Null,
        Literal::BigInt(b) => JsValue::BigInt(b.clone()),
    }
}

fn result_step(result: Result<JsValue, JsValue>) -> Step {
    match result {
        Ok(v) => Step::value(v),
        Err(e) => Step::throw(e),
    }
}

/// Names an anonymous function after a property key.
fn name_by_key(realm: &mut Realm, expr: &Expression, key: &PropertyKey, value: &JsValue) {
    match key {
        PropertyKey::String(name) => realm.name_if_anonymous(expr, name, value),
        PropertyKey::Symbol(_) => {
            if is_anonymous_function_definition(expr)
                && let Some(f) = value.as_object()
            {
                realm.set_function_name(f, key, None);
            }
        }
    }
}

#[derive(Debug)]
enum Elements {
    Arguments(Rc<[Argument]>),
    Array(Rc<[Option<Argument>]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpreadStage {
    Expression,
    Spread,
    Iterated,
}

enum Collected {
    Pending(Step),
    Ready(Vec<JsValue>),
}

/// Evaluates an argument list or array literal left to right, expanding
/// spread elements through the iterator protocol.
#[derive(Debug)]
struct ArgumentList {
    elements: Elements,
    index: usize,
    values: Vec<JsValue>,
    stage: SpreadStage,
}

impl ArgumentList {
    fn new(elements: Elements) -> Self {
        Self {
            elements,
            index: 0,
            values: Vec::new(),
            stage: SpreadStage::Expression,
        }
    }

    fn element(&self, index: usize) -> Option<Option<&Argument>> {
        match &self.elements {
            Elements::Arguments(args) => args.get(index).map(Some),
            Elements::Array(elements) => elements.get(index).map(Option::as_ref),
        }
    }

    fn next(&mut self, context: &Rc<EvaluationContext>) -> Collected {
        loop {
            let index = self.index;
            let Some(element) = self.element(index) else {
                return Collected::Ready(std::mem::take(&mut self.values));
            };
            let step = match element {
                // Holes read as undefined.
                None => None,
                Some(Argument::Expression(expr)) => Some((SpreadStage::Expression, Step::evaluate(expr, context))),
                Some(Argument::Spread(expr)) => Some((SpreadStage::Spread, Step::evaluate(expr, context))),
            };
            self.index += 1;
            match step {
                Some((stage, step)) => {
                    self.stage = stage;
                    return Collected::Pending(step);
                }
                None => self.values.push(JsValue::Undefined),
            }
        }
    }

    fn feed(&mut self, realm: &Realm, value: JsValue, context: &Rc<EvaluationContext>) -> Collected {
        match self.stage {
            SpreadStage::Expression => {
                self.values.push(value);
                self.next(context)
            }
            SpreadStage::Spread => {
                self.stage = SpreadStage::Iterated;
                Collected::Pending(iterate(value).into())
            }
            SpreadStage::Iterated => {
                if let Some(items) = realm.array_elements(&value) {
                    self.values.extend_from_slice(items);
                }
                self.next(context)
            }
        }
    }
}

#[derive(Debug)]
pub struct IdentifierFrame {
    name: Rc<str>,
    context: Rc<EvaluationContext>,
}

impl IdentifierFrame {
    pub fn new(name: Rc<str>, context: Rc<EvaluationContext>) -> Self {
        Self { name, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::Reference(resolve_binding(
                realm,
                &self.context.lexical,
                &self.name,
                self.context.strict,
            ))),
            other => Err(unexpected("identifier", &other)),
        }
    }
}

#[derive(Debug)]
pub struct ThisFrame {
    context: Rc<EvaluationContext>,
}

impl ThisFrame {
    pub fn new(context: Rc<EvaluationContext>) -> Self {
        Self { context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        if !matches!(input, Resumption::Start) {
            return Err(unexpected("this", &input));
        }
        match this_environment(&self.context.lexical).get_this_binding() {
            Ok(this) => Ok(Step::value(this)),
            Err(_) => Ok(Step::throw(realm.reference_error(
                "Must call super constructor in derived class before accessing 'this'",
            ))),
        }
    }
}

#[derive(Debug)]
pub struct NewTargetFrame {
    context: Rc<EvaluationContext>,
}

impl NewTargetFrame {
    pub fn new(context: Rc<EvaluationContext>) -> Self {
        Self { context }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        if !matches!(input, Resumption::Start) {
            return Err(unexpected("new.target", &input));
        }
        let env = this_environment(&self.context.lexical);
        let target = env.function_scope().map(|s| s.new_target.clone()).unwrap_or_default();
        Ok(Step::value(target))
    }
}

/// Function and arrow expressions.
#[derive(Debug)]
pub struct ClosureFrame {
    function: Rc<FunctionNode>,
    context: Rc<EvaluationContext>,
}

impl ClosureFrame {
    pub fn new(function: Rc<FunctionNode>, context: Rc<EvaluationContext>) -> Self {
        Self { function, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        if !matches!(input, Resumption::Start) {
            return Err(unexpected("closure", &input));
        }
        let node = &self.function;
        let closure = match (&node.name, node.kind) {
            // A named function expression sees its own name in a scope of its own.
            (Some(name), FunctionKind::Normal) => {
                let env = LexicalEnvironment::declarative(&self.context.lexical);
                env.create_immutable_binding(name, false)
                    .map_err(|e| EngineError::defect(e.to_string()))?;
                let f = create_closure(realm, node, &env, None);
                env.initialize_binding(realm, name, JsValue::Object(f))
                    .map_err(|e| EngineError::defect(e.to_string()))?;
                f
            }
            _ => create_closure(realm, node, &self.context.lexical, None),
        };
        Ok(Step::value(JsValue::Object(closure)))
    }
}

/// How a class definition binds its constructor in the enclosing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassBinding {
    /// Class declarations (and `export default class`) initialize a lexical binding.
    Declaration,
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassPhase {
    Heritage,
    ParentPrototype,
    Key(usize),
}

#[derive(Debug)]
pub struct ClassFrame {
    class: Rc<ClassNode>,
    context: Rc<EvaluationContext>,
    class_context: Option<Rc<EvaluationContext>>,
    binding: ClassBinding,
    superclass: JsValue,
    constructor: Option<JsObject>,
    prototype: Option<JsObject>,
    phase: ClassPhase,
}

impl ClassFrame {
    pub fn new(class: Rc<ClassNode>, context: Rc<EvaluationContext>, binding: ClassBinding) -> Self {
        Self {
            class,
            context,
            class_context: None,
            binding,
            superclass: JsValue::Undefined,
            constructor: None,
            prototype: None,
            phase: ClassPhase::Heritage,
        }
    }

    fn class_context(&self) -> Result<Rc<EvaluationContext>, EngineError> {
        self.class_context
            .clone()
            .ok_or_else(|| EngineError::defect("class scope used before creation"))
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (ClassPhase::Heritage, Resumption::Start) => {
                let env = LexicalEnvironment::declarative(&self.context.lexical);
                if let Some(name) = &self.class.name {
                    env.create_immutable_binding(name, true)
                        .map_err(|e| EngineError::defect(e.to_string()))?;
                }
                let class_context = self.context.with_lexical(env);
                self.class_context = Some(class_context.clone());
                match &self.class.heritage {
                    Some(heritage) => Ok(Step::evaluate(heritage, &class_context)),
                    None => {
                        let parent = realm.intrinsics.function_prototype;
                        let object_prototype = realm.intrinsics.object_prototype;
                        self.define(realm, Some(object_prototype), parent)
                    }
                }
            }
            (ClassPhase::Heritage, Resumption::Value(superclass)) => {
                if matches!(superclass, JsValue::Null) {
                    let parent = realm.intrinsics.function_prototype;
                    return self.define(realm, None, parent);
                }
                if !realm.is_constructor(&superclass) {
                    let message = format!("Class extends value {} is not a constructor or null", realm.describe(&superclass));
                    return Ok(Step::throw(realm.type_error(message)));
                }
                self.superclass = superclass.clone();
                self.phase = ClassPhase::ParentPrototype;
                let reference = Reference::property(superclass, PropertyKey::from("prototype"), true);
                Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
            }
            (ClassPhase::ParentPrototype, Resumption::Value(prototype)) => {
                let parent = match prototype {
                    JsValue::Object(o) => Some(o),
                    JsValue::Null => None,
                    other => {
                        let message = format!("Class extends value does not have valid prototype property {other}");
                        return Ok(Step::throw(realm.type_error(message)));
                    }
                };
                let Some(constructor_parent) = self.superclass.as_object() else {
                    return Err(EngineError::defect("superclass is not an object"));
                };
                self.define(realm, parent, constructor_parent)
            }
            (ClassPhase::Key(n), Resumption::Value(key)) => match realm.to_property_key(&key) {
                Ok(key) => {
                    self.define_member(realm, n, key);
                    self.members(realm, n + 1)
                }
                Err(error) => Ok(Step::throw(error)),
            },
            (_, input) => Err(unexpected("class", &input)),
        }
    }

    /// Creates the prototype and constructor objects.
    fn define(
        &mut self,
        realm: &mut Realm,
        prototype_parent: Option<JsObject>,
        constructor_parent: JsObject,
    ) -> Result<Step, EngineError> {
        let env = self.class_context()?.lexical.clone();
        let prototype = realm.create_object_with_proto(prototype_parent);
        let derived = self.class.heritage.is_some();
        let constructor = match &self.class.constructor {
            Some(node) => create_closure(realm, node, &env, Some(prototype)),
            None => {
                let mut data = ObjectData::new(
                    ObjectKind::Function(FunctionData::DefaultConstructor {
                        derived,
                        home_object: prototype,
                    }),
                    None,
                );
                data.insert_property(
                    PropertyKey::from("length"),
                    PropertyDescriptor::data(JsValue::Number(0.0), false, false, true),
                );
                realm.alloc(data)
            }
        };
        realm.object_mut(constructor).prototype = Some(constructor_parent);
        let name = match (&self.class.name, self.binding) {
            (Some(name), _) => name.clone(),
            (None, ClassBinding::Declaration) => Rc::from("default"),
            (None, ClassBinding::Expression) => Rc::from(""),
        };
        realm.set_function_name(constructor, &PropertyKey::String(name), None);
        realm.define_own_property(
            constructor,
            PropertyKey::from("prototype"),
            PropertyDescriptor::data(JsValue::Object(prototype), false, false, false),
        );
        realm.object_mut(prototype).insert_builtin("constructor", JsValue::Object(constructor));
        self.constructor = Some(constructor);
        self.prototype = Some(prototype);
        self.members(realm, 0)
    }

    fn members(&mut self, realm: &mut Realm, start: usize) -> Result<Step, EngineError> {
        let class = self.class.clone();
        for (n, member) in class.members.iter().enumerate().skip(start) {
            match &member.key {
                PropertyName::Static(name) => self.define_member(realm, n, PropertyKey::String(name.clone())),
                PropertyName::Computed(expr) => {
                    self.phase = ClassPhase::Key(n);
                    return Ok(Step::evaluate(expr, &self.class_context()?));
                }
            }
        }
        self.finish(realm)
    }

    fn define_member(&mut self, realm: &mut Realm, n: usize, key: PropertyKey) {
        let (Some(constructor), Some(prototype), Some(context)) = (self.constructor, self.prototype, &self.class_context)
        else {
            return;
        };
        let member = &self.class.members[n];
        let target = if member.is_static { constructor } else { prototype };
        let method = create_closure(realm, &member.function, &context.lexical, Some(target));
        define_method(realm, target, key, member.kind, method, false);
    }

    fn finish(&mut self, realm: &mut Realm) -> Result<Step, EngineError> {
        let Some(constructor) = self.constructor else {
            return Err(EngineError::defect("class finished without a constructor"));
        };
        let value = JsValue::Object(constructor);
        if let Some(name) = &self.class.name {
            let env = self.class_context()?.lexical.clone();
            env.initialize_binding(realm, name, value.clone())
                .map_err(|e| EngineError::defect(e.to_string()))?;
        }
        match self.binding {
            ClassBinding::Expression => Ok(Step::value(value)),
            ClassBinding::Declaration => {
                let name = self.class.name.clone().unwrap_or_else(|| Rc::from("*default*"));
                match self.context.lexical.initialize_binding(realm, &name, value) {
                    Ok(()) => Ok(Step::Done(Completion::empty())),
                    Err(e) => Ok(Step::throw(realm.throw_fault(e.into()))),
                }
            }
        }
    }
}

/// Defines a method, getter or setter on an object literal or class.
fn define_method(realm: &mut Realm, target: JsObject, key: PropertyKey, kind: MethodKind, method: JsObject, enumerable: bool) {
    let value = JsValue::Object(method);
    let descriptor = match kind {
        MethodKind::Method => {
            realm.set_function_name(method, &key, None);
            PropertyDescriptor::data(value, true, enumerable, true)
        }
        MethodKind::Getter => {
            realm.set_function_name(method, &key, Some("get"));
            PropertyDescriptor::accessor(Some(value), None, enumerable, true)
        }
        MethodKind::Setter => {
            realm.set_function_name(method, &key, Some("set"));
            PropertyDescriptor::accessor(None, Some(value), enumerable, true)
        }
    };
    realm.define_own_property(target, key, descriptor);
}

#[derive(Debug)]
pub struct ArrayLiteralFrame {
    elements: ArgumentList,
    context: Rc<EvaluationContext>,
}

impl ArrayLiteralFrame {
    pub fn new(elements: Rc<[Option<Argument>]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            elements: ArgumentList::new(Elements::Array(elements)),
            context,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let collected = match input {
            Resumption::Start => self.elements.next(&self.context),
            Resumption::Value(v) => self.elements.feed(realm, v, &self.context),
            other => return Err(unexpected("array-literal", &other)),
        };
        Ok(match collected {
            Collected::Pending(step) => step,
            Collected::Ready(values) => Step::value(JsValue::Object(realm.create_array(values))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyPhase {
    Key(usize),
    Value(usize),
    Spread(usize),
}

#[derive(Debug)]
pub struct ObjectLiteralFrame {
    properties: Rc<[ObjectProperty]>,
    context: Rc<EvaluationContext>,
    object: Option<JsObject>,
    key: Option<PropertyKey>,
    phase: PropertyPhase,
}

impl ObjectLiteralFrame {
    pub fn new(properties: Rc<[ObjectProperty]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            properties,
            context,
            object: None,
            key: None,
            phase: PropertyPhase::Key(0),
        }
    }

    fn object(&self) -> Result<JsObject, EngineError> {
        self.object.ok_or_else(|| EngineError::defect("object literal used before allocation"))
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (PropertyPhase::Key(0), Resumption::Start) => {
                self.object = Some(realm.create_object());
                self.property(realm, 0)
            }
            (PropertyPhase::Key(n), Resumption::Value(key)) => match realm.to_property_key(&key) {
                Ok(key) => self.keyed(realm, n, key),
                Err(error) => Ok(Step::throw(error)),
            },
            (PropertyPhase::Value(n), Resumption::Value(value)) => {
                let object = self.object()?;
                let key = self
                    .key
                    .take()
                    .ok_or_else(|| EngineError::defect("property value without a key"))?;
                let properties = self.properties.clone();
                if let ObjectProperty::Init(name, expr) = &properties[n] {
                    if matches!(name, PropertyName::Static(s) if &**s == "__proto__") {
                        match value {
                            JsValue::Object(proto) => realm.object_mut(object).prototype = Some(proto),
                            JsValue::Null => realm.object_mut(object).prototype = None,
                            _ => {}
                        }
                        return self.property(realm, n + 1);
                    }
                    name_by_key(realm, expr, &key, &value);
                }
                realm.define_own_property(object, key, PropertyDescriptor::data_default(value));
                self.property(realm, n + 1)
            }
            (PropertyPhase::Spread(n), Resumption::Value(source)) => {
                let object = self.object()?;
                if let Err(error) = realm.copy_data_properties(object, &source, &[]) {
                    return Ok(Step::throw(error));
                }
                self.property(realm, n + 1)
            }
            (_, input) => Err(unexpected("object-literal", &input)),
        }
    }

    fn property(&mut self, realm: &mut Realm, n: usize) -> Result<Step, EngineError> {
        let Some(property) = self.properties.get(n) else {
            return Ok(Step::value(JsValue::Object(self.object()?)));
        };
        match property {
            ObjectProperty::Spread(expr) => {
                self.phase = PropertyPhase::Spread(n);
                Ok(Step::evaluate(expr, &self.context))
            }
            ObjectProperty::Init(PropertyName::Static(name), _)
            | ObjectProperty::Method(PropertyName::Static(name), _, _) => {
                self.keyed(realm, n, PropertyKey::String(name.clone()))
            }
            ObjectProperty::Init(PropertyName::Computed(expr), _)
            | ObjectProperty::Method(PropertyName::Computed(expr), _, _) => {
                self.phase = PropertyPhase::Key(n);
                Ok(Step::evaluate(expr, &self.context))
            }
        }
    }

    fn keyed(&mut self, realm: &mut Realm, n: usize, key: PropertyKey) -> Result<Step, EngineError> {
        let properties = self.properties.clone();
        match &properties[n] {
            ObjectProperty::Init(_, expr) => {
                self.key = Some(key);
                self.phase = PropertyPhase::Value(n);
                Ok(Step::evaluate(expr, &self.context))
            }
            ObjectProperty::Method(_, kind, function) => {
                let object = self.object()?;
                let method = create_closure(realm, function, &self.context.lexical, Some(object));
                define_method(realm, object, key, *kind, method, true);
                self.property(realm, n + 1)
            }
            ObjectProperty::Spread(_) => Err(EngineError::defect("spread property has no key")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryPhase {
    Operand,
    /// `typeof` read a resolvable reference and waits for its value.
    Read,
}

#[derive(Debug)]
pub struct UnaryFrame {
    operator: UnaryOperator,
    argument: Rc<Expression>,
    context: Rc<EvaluationContext>,
    phase: UnaryPhase,
}

impl UnaryFrame {
    pub fn new(operator: UnaryOperator, argument: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            operator,
            argument,
            context,
            phase: UnaryPhase::Operand,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (UnaryPhase::Operand, Resumption::Start) => Ok(match self.operator {
                UnaryOperator::Delete | UnaryOperator::Typeof => Step::reference(&self.argument, &self.context),
                _ => Step::evaluate(&self.argument, &self.context),
            }),
            (UnaryPhase::Operand, Resumption::Reference(reference)) => match self.operator {
                UnaryOperator::Delete => Ok(result_step(realm.delete_reference(&reference).map(JsValue::Boolean))),
                _ if matches!(reference, Reference::Unresolvable { .. }) => Ok(Step::value(JsValue::string("undefined"))),
                _ => {
                    self.phase = UnaryPhase::Read;
                    Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
                }
            },
            (UnaryPhase::Operand | UnaryPhase::Read, Resumption::Value(value)) => Ok(self.apply(realm, value)),
            (_, input) => Err(unexpected("unary", &input)),
        }
    }

    fn apply(&self, realm: &mut Realm, value: JsValue) -> Step {
        match self.operator {
            UnaryOperator::Delete => Step::value(JsValue::Boolean(true)),
            UnaryOperator::Typeof => Step::value(JsValue::string(realm.typeof_value(&value))),
            UnaryOperator::Void => Step::value(JsValue::Undefined),
            UnaryOperator::Not => Step::value(JsValue::Boolean(!to_boolean(&value))),
            UnaryOperator::Minus => result_step(realm.negate(&value)),
            UnaryOperator::Plus => result_step(realm.to_number(&value).map(JsValue::Number)),
            UnaryOperator::BitNot => result_step(realm.bitwise_not(&value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdatePhase {
    Target,
    Read,
    Write,
}

/// `++` and `--`.
#[derive(Debug)]
pub struct UpdateFrame {
    increment: bool,
    prefix: bool,
    target: Rc<Expression>,
    context: Rc<EvaluationContext>,
    reference: Option<Reference>,
    result: JsValue,
    phase: UpdatePhase,
}

impl UpdateFrame {
    pub fn new(increment: bool, prefix: bool, target: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            increment,
            prefix,
            target,
            context,
            reference: None,
            result: JsValue::Undefined,
            phase: UpdatePhase::Target,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (UpdatePhase::Target, Resumption::Start) => Ok(Step::reference(&self.target, &self.context)),
            (UpdatePhase::Target, Resumption::Reference(reference)) => {
                self.reference = Some(reference.clone());
                self.phase = UpdatePhase::Read;
                Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
            }
            (UpdatePhase::Target, Resumption::Value(_)) => Ok(Step::throw(
                realm.reference_error("Invalid left-hand side expression in update operation"),
            )),
            (UpdatePhase::Read, Resumption::Value(old)) => {
                let old = match realm.to_numeric(&old) {
                    Ok(n) => n,
                    Err(error) => return Ok(Step::throw(error)),
                };
                let new = realm.increment(&old, self.increment);
                self.result = if self.prefix { new.clone() } else { old.into() };
                let reference = self
                    .reference
                    .take()
                    .ok_or_else(|| EngineError::defect("update without a reference"))?;
                self.phase = UpdatePhase::Write;
                Ok(Command::Host(HostOperation::PutValue(reference, new), EvalOptions::VALUE).into())
            }
            (UpdatePhase::Write, Resumption::Value(_)) => Ok(Step::value(std::mem::take(&mut self.result))),
            (_, input) => Err(unexpected("update", &input)),
        }
    }
}

#[derive(Debug)]
pub struct BinaryFrame {
    operator: BinaryOperator,
    left: Rc<Expression>,
    right: Rc<Expression>,
    context: Rc<EvaluationContext>,
    left_value: Option<JsValue>,
}

impl BinaryFrame {
    pub fn new(operator: BinaryOperator, left: Rc<Expression>, right: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            operator,
            left,
            right,
            context,
            left_value: None,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.left, &self.context)),
            Resumption::Value(value) => match self.left_value.take() {
                None => {
                    self.left_value = Some(value);
                    Ok(Step::evaluate(&self.right, &self.context))
                }
                Some(left) => Ok(result_step(realm.apply_binary(self.operator, &left, &value))),
            },
            other => Err(unexpected("binary", &other)),
        }
    }
}

/// Whether a logical operator is decided by its left operand alone.
fn short_circuits(operator: LogicalOperator, left: &JsValue) -> bool {
    match operator {
        LogicalOperator::And => !to_boolean(left),
        LogicalOperator::Or => to_boolean(left),
        LogicalOperator::Nullish => !left.is_nullish(),
    }
}

#[derive(Debug)]
pub struct LogicalFrame {
    operator: LogicalOperator,
    left: Rc<Expression>,
    right: Rc<Expression>,
    context: Rc<EvaluationContext>,
    evaluated_left: bool,
}

impl LogicalFrame {
    pub fn new(operator: LogicalOperator, left: Rc<Expression>, right: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            operator,
            left,
            right,
            context,
            evaluated_left: false,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.left, &self.context)),
            Resumption::Value(left) if !self.evaluated_left => {
                self.evaluated_left = true;
                if short_circuits(self.operator, &left) {
                    return Ok(Step::value(left));
                }
                Ok(Step::evaluate(&self.right, &self.context))
            }
            Resumption::Value(right) => Ok(Step::value(right)),
            other => Err(unexpected("logical", &other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignPhase {
    Target,
    Read,
    Value,
    Write,
    Bind,
}

#[derive(Debug)]
pub struct AssignFrame {
    operator: AssignOperator,
    target: Rc<Pattern>,
    value: Rc<Expression>,
    context: Rc<EvaluationContext>,
    reference: Option<Reference>,
    current: JsValue,
    result: JsValue,
    phase: AssignPhase,
}

impl AssignFrame {
    pub fn new(operator: AssignOperator, target: Rc<Pattern>, value: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            operator,
            target,
            value,
            context,
            reference: None,
            current: JsValue::Undefined,
            result: JsValue::Undefined,
            phase: AssignPhase::Target,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (AssignPhase::Target, Resumption::Start) => match &*self.target {
                Pattern::Identifier(name) => {
                    let reference = resolve_binding(realm, &self.context.lexical, name, self.context.strict);
                    self.with_reference(reference)
                }
                Pattern::Member(expr) => Ok(Step::reference(expr, &self.context)),
                Pattern::Array { .. } | Pattern::Object { .. } => {
                    self.phase = AssignPhase::Bind;
                    Ok(Step::evaluate(&self.value, &self.context))
                }
            },
            (AssignPhase::Target, Resumption::Reference(reference)) => self.with_reference(reference),
            (AssignPhase::Read, Resumption::Value(current)) => {
                if let AssignOperator::Logical(op) = self.operator
                    && short_circuits(op, &current)
                {
                    return Ok(Step::value(current));
                }
                self.current = current;
                self.phase = AssignPhase::Value;
                Ok(Step::evaluate(&self.value, &self.context))
            }
            (AssignPhase::Value, Resumption::Value(value)) => {
                let value = match self.operator {
                    AssignOperator::Compound(op) => match realm.apply_binary(op, &self.current, &value) {
                        Ok(v) => v,
                        Err(error) => return Ok(Step::throw(error)),
                    },
                    AssignOperator::Assign | AssignOperator::Logical(_) => {
                        realm.name_anonymous_function(&self.value, &self.target, &value);
                        value
                    }
                };
                let reference = self
                    .reference
                    .take()
                    .ok_or_else(|| EngineError::defect("assignment without a reference"))?;
                self.result = value.clone();
                self.phase = AssignPhase::Write;
                Ok(Command::Host(HostOperation::PutValue(reference, value), EvalOptions::VALUE).into())
            }
            (AssignPhase::Write, Resumption::Value(_)) => Ok(Step::value(std::mem::take(&mut self.result))),
            (AssignPhase::Bind, Resumption::Value(value)) => {
                self.result = value.clone();
                self.phase = AssignPhase::Write;
                let frame = BindFrame::new(self.target.clone(), value, BindMode::Assign, self.context.clone());
                Ok(Command::enter(Frame::internal(FrameKind::Bind(frame)), EvalOptions::VALUE).into())
            }
            (_, input) => Err(unexpected("assignment", &input)),
        }
    }

    fn with_reference(&mut self, reference: Reference) -> Result<Step, EngineError> {
        self.reference = Some(reference.clone());
        if self.operator == AssignOperator::Assign {
            self.phase = AssignPhase::Value;
            return Ok(Step::evaluate(&self.value, &self.context));
        }
        self.phase = AssignPhase::Read;
        Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
    }
}

#[derive(Debug)]
pub struct ConditionalFrame {
    test: Rc<Expression>,
    consequent: Rc<Expression>,
    alternate: Rc<Expression>,
    context: Rc<EvaluationContext>,
    tested: bool,
}

impl ConditionalFrame {
    pub fn new(
        test: Rc<Expression>,
        consequent: Rc<Expression>,
        alternate: Rc<Expression>,
        context: Rc<EvaluationContext>,
    ) -> Self {
        Self {
            test,
            consequent,
            alternate,
            context,
            tested: false,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.test, &self.context)),
            Resumption::Value(test) if !self.tested => {
                self.tested = true;
                let branch = if to_boolean(&test) { &self.consequent } else { &self.alternate };
                Ok(Step::evaluate(branch, &self.context))
            }
            Resumption::Value(value) => Ok(Step::value(value)),
            other => Err(unexpected("conditional", &other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    Callee,
    Function,
    Arguments,
    Call,
}

#[derive(Debug)]
pub struct CallFrame {
    callee: Rc<Expression>,
    arguments: ArgumentList,
    context: Rc<EvaluationContext>,
    function: JsValue,
    this: JsValue,
    phase: CallPhase,
}

impl CallFrame {
    pub fn new(callee: Rc<Expression>, args: Rc<[Argument]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            callee,
            arguments: ArgumentList::new(Elements::Arguments(args)),
            context,
            function: JsValue::Undefined,
            this: JsValue::Undefined,
            phase: CallPhase::Callee,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (self.phase, input) {
            (CallPhase::Callee, Resumption::Start) => Ok(Step::reference(&self.callee, &self.context)),
            (CallPhase::Callee, Resumption::Reference(reference)) => {
                self.this = reference.this_value();
                self.phase = CallPhase::Function;
                Ok(Command::Host(HostOperation::GetValue(reference), EvalOptions::VALUE).into())
            }
            (CallPhase::Callee | CallPhase::Function, Resumption::Value(function)) => {
                self.function = function;
                self.phase = CallPhase::Arguments;
                let collected = self.arguments.next(&self.context);
                Ok(self.collected(collected))
            }
            (CallPhase::Arguments, Resumption::Value(value)) => {
                let collected = self.arguments.feed(realm, value, &self.context);
                Ok(self.collected(collected))
            }
            (CallPhase::Call, Resumption::Value(result)) => Ok(Step::value(result)),
            (_, input) => Err(unexpected("call", &input)),
        }
    }

    fn collected(&mut self, collected: Collected) -> Step {
        match collected {
            Collected::Pending(step) => step,
            Collected::Ready(args) => {
                self.phase = CallPhase::Call;
                let function = std::mem::take(&mut self.function);
                let this = std::mem::take(&mut self.this);
                Command::call(function, this, args).into()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewPhase {
    Callee,
    Arguments,
    Construct,
}

#[derive(Debug)]
pub struct NewFrame {
    callee: Rc<Expression>,
    arguments: ArgumentList,
    context: Rc<EvaluationContext>,
    constructor: JsValue,
    phase: NewPhase,
}

impl NewFrame {
    pub fn new(callee: Rc<Expression>, args: Rc<[Argument]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            callee,
            arguments: ArgumentList::new(Elements::Arguments(args)),
            context,
            constructor: JsValue::Undefined,
            phase: NewPhase::Callee,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let collected = match (self.phase, input) {
            (NewPhase::Callee, Resumption::Start) => return Ok(Step::evaluate(&self.callee, &self.context)),
            (NewPhase::Callee, Resumption::Value(constructor)) => {
                self.constructor = constructor;
                self.phase = NewPhase::Arguments;
                self.arguments.next(&self.context)
            }
            (NewPhase::Arguments, Resumption::Value(value)) => self.arguments.feed(realm, value, &self.context),
            (NewPhase::Construct, Resumption::Value(object)) => return Ok(Step::value(object)),
            (_, input) => return Err(unexpected("new", &input)),
        };
        Ok(match collected {
            Collected::Pending(step) => step,
            Collected::Ready(args) => {
                self.phase = NewPhase::Construct;
                let callee = std::mem::take(&mut self.constructor);
                let operation = HostOperation::Construct {
                    new_target: callee.clone(),
                    callee,
                    args,
                };
                Command::Host(operation, EvalOptions::VALUE).into()
            }
        })
    }
}

#[derive(Debug)]
pub struct MemberFrame {
    object: Rc<Expression>,
    property: MemberProperty,
    context: Rc<EvaluationContext>,
    base: Option<JsValue>,
}

impl MemberFrame {
    pub fn new(object: Rc<Expression>, property: MemberProperty, context: Rc<EvaluationContext>) -> Self {
        Self {
            object,
            property,
            context,
            base: None,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.object, &self.context)),
            Resumption::Value(value) => match (self.base.take(), &self.property) {
                (None, MemberProperty::Static(name)) => {
                    let key = PropertyKey::String(name.clone());
                    Ok(Step::Reference(Reference::property(value, key, self.context.strict)))
                }
                (None, MemberProperty::Computed(expr)) => {
                    self.base = Some(value);
                    Ok(Step::evaluate(expr, &self.context))
                }
                (Some(base), _) => {
                    if base.is_nullish() {
                        let message = format!("Cannot read properties of {base} (reading '{}')", value);
                        return Ok(Step::throw(realm.type_error(message)));
                    }
                    match realm.to_property_key(&value) {
                        Ok(key) => Ok(Step::Reference(Reference::property(base, key, self.context.strict))),
                        Err(error) => Ok(Step::throw(error)),
                    }
                }
            },
            other => Err(unexpected("member", &other)),
        }
    }
}

/// `super.x` and `super[x]`.
#[derive(Debug)]
pub struct SuperMemberFrame {
    property: MemberProperty,
    context: Rc<EvaluationContext>,
}

impl SuperMemberFrame {
    pub fn new(property: MemberProperty, context: Rc<EvaluationContext>) -> Self {
        Self { property, context }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match (&self.property, input) {
            (MemberProperty::Static(name), Resumption::Start) => {
                let key = PropertyKey::String(name.clone());
                self.reference(realm, key)
            }
            (MemberProperty::Computed(expr), Resumption::Start) => Ok(Step::evaluate(expr, &self.context)),
            (MemberProperty::Computed(_), Resumption::Value(key)) => match realm.to_property_key(&key) {
                Ok(key) => self.reference(realm, key),
                Err(error) => Ok(Step::throw(error)),
            },
            (_, input) => Err(unexpected("super-member", &input)),
        }
    }

    fn reference(&self, realm: &mut Realm, key: PropertyKey) -> Result<Step, EngineError> {
        let env = this_environment(&self.context.lexical);
        let this = match env.get_this_binding() {
            Ok(this) => this,
            Err(_) => {
                return Ok(Step::throw(realm.reference_error(
                    "Must call super constructor in derived class before accessing 'this'",
                )));
            }
        };
        let Some(home) = env.function_scope().and_then(|s| s.home_object) else {
            return Ok(Step::throw(realm.type_error("'super' keyword unexpected here")));
        };
        let base = realm.object(home).prototype.map(JsValue::Object).unwrap_or(JsValue::Null);
        Ok(Step::Reference(Reference::Property {
            base,
            key,
            this,
            strict: true,
        }))
    }
}

/// `super(...)` in a derived constructor.
#[derive(Debug)]
pub struct SuperCallFrame {
    arguments: ArgumentList,
    context: Rc<EvaluationContext>,
    constructing: bool,
}

impl SuperCallFrame {
    pub fn new(args: Rc<[Argument]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            arguments: ArgumentList::new(Elements::Arguments(args)),
            context,
            constructing: false,
        }
    }

    pub fn resume(&mut self, realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let collected = match input {
            Resumption::Start => self.arguments.next(&self.context),
            Resumption::Value(result) if self.constructing => {
                let env = this_environment(&self.context.lexical);
                return match env.bind_this_value(result.clone()) {
                    Ok(()) => Ok(Step::value(result)),
                    Err(_) => Ok(Step::throw(realm.reference_error("Super constructor may only be called once"))),
                };
            }
            Resumption::Value(value) => self.arguments.feed(realm, value, &self.context),
            other => return Err(unexpected("super-call", &other)),
        };
        match collected {
            Collected::Pending(step) => Ok(step),
            Collected::Ready(args) => {
                let env = this_environment(&self.context.lexical);
                let Some(scope) = env.function_scope() else {
                    return Ok(Step::throw(realm.type_error("'super' keyword unexpected here")));
                };
                let parent = realm.object(scope.function).prototype.map(JsValue::Object).unwrap_or_default();
                if !realm.is_constructor(&parent) {
                    let message = format!("Super constructor {} is not a constructor", realm.describe(&parent));
                    return Ok(Step::throw(realm.type_error(message)));
                }
                self.constructing = true;
                let operation = HostOperation::Construct {
                    callee: parent,
                    args,
                    new_target: scope.new_target.clone(),
                };
                Ok(Command::Host(operation, EvalOptions::VALUE).into())
            }
        }
    }
}

#[derive(Debug)]
pub struct SequenceFrame {
    expressions: Rc<[Rc<Expression>]>,
    context: Rc<EvaluationContext>,
    index: usize,
}

impl SequenceFrame {
    pub fn new(expressions: Rc<[Rc<Expression>]>, context: Rc<EvaluationContext>) -> Self {
        Self {
            expressions,
            context,
            index: 0,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        let last = match input {
            Resumption::Start => JsValue::Undefined,
            Resumption::Value(v) => v,
            other => return Err(unexpected("sequence", &other)),
        };
        match self.expressions.get(self.index) {
            Some(expr) => {
                self.index += 1;
                Ok(Step::evaluate(expr, &self.context))
            }
            None => Ok(Step::value(last)),
        }
    }
}

/// `yield`. The generator machinery resumes the frame with the value sent by
/// `next`, or with the throw or return completion injected by
/// `throw`/`return`.
#[derive(Debug)]
pub struct YieldFrame {
    argument: Option<Rc<Expression>>,
    context: Rc<EvaluationContext>,
    suspended: bool,
}

impl YieldFrame {
    pub fn new(argument: Option<Rc<Expression>>, context: Rc<EvaluationContext>) -> Self {
        Self {
            argument,
            context,
            suspended: false,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => match &self.argument {
                Some(arg) => Ok(Step::evaluate(arg, &self.context)),
                None => {
                    self.suspended = true;
                    Ok(Command::Produce(JsValue::Undefined).into())
                }
            },
            Resumption::Value(value) if !self.suspended => {
                self.suspended = true;
                Ok(Command::Produce(value).into())
            }
            Resumption::Value(sent) => Ok(Step::value(sent)),
            Resumption::Completion(completion) if self.suspended => Ok(Step::Done(completion)),
            other => Err(unexpected("yield", &other)),
        }
    }
}

#[derive(Debug)]
pub struct AwaitFrame {
    argument: Rc<Expression>,
    context: Rc<EvaluationContext>,
    suspended: bool,
}

impl AwaitFrame {
    pub fn new(argument: Rc<Expression>, context: Rc<EvaluationContext>) -> Self {
        Self {
            argument,
            context,
            suspended: false,
        }
    }

    pub fn resume(&mut self, _realm: &mut Realm, input: Resumption) -> Result<Step, EngineError> {
        match input {
            Resumption::Start => Ok(Step::evaluate(&self.argument, &self.context)),
            Resumption::Value(value) if !self.suspended => {
                self.suspended = true;
                Ok(Command::Await(value).into())
            }
            Resumption::Value(settled) => Ok(Step::value(settled)),
            Resumption::Completion(thrown @ Completion::Throw(_)) if self.suspended => Ok(Step::Done(thrown)),
            other => Err(unexpected("await", &other)),
        }
    }
}

trace_fields! {
    ArgumentList => values;
    IdentifierFrame => context;
    ThisFrame => context;
    NewTargetFrame => context;
    ClosureFrame => context;
    ClassFrame => context, class_context, superclass, constructor, prototype;
    ArrayLiteralFrame => elements, context;
    ObjectLiteralFrame => context, object;
    UnaryFrame => context;
    UpdateFrame => context, reference, result;
    BinaryFrame => context, left_value;
    LogicalFrame => context;
    AssignFrame => context, reference, current, result;
    ConditionalFrame => context;
    CallFrame => arguments, context, function, this;
    NewFrame => arguments, context, constructor;
    MemberFrame => context, base;
    SuperMemberFrame => context;
    SuperCallFrame => arguments, context;
    SequenceFrame => context;
    YieldFrame => context;
    AwaitFrame => context;
}
