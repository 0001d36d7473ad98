//! Tree-walking evaluator.

use super::builtins::{self, get_property};
use super::scope::{Lookup, Scope, Slot, Store};
use super::value::{Callable, Object, Value, compare_strings, number_to_string};
use super::{EvalError, MAX_CALL_DEPTH};
use crate::neutralize::Stub;
use crate::source::ast::*;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::rc::Rc;

/// Name under which `export default` values are stored in module scope.
pub(super) const DEFAULT_SLOT: &str = "*default*";

pub struct Evaluator {
    depth: usize,
    source: String,
}

fn type_error(span: Span, message: impl Into<String>) -> EvalError {
    EvalError::Type {
        span,
        message: message.into(),
    }
}

/// Property key for `obj[key]`.
fn key_string(key: &Value) -> String {
    match key {
        Value::Number(n) => number_to_string(*n),
        other => other.to_js_string(),
    }
}

fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Readable rendering of a callee or object expression for messages.
fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member {
            object, property, ..
        } => format!("{}.{property}", describe(object)),
        ExprKind::Index { object, .. } => format!("{}[...]", describe(object)),
        ExprKind::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

fn stored(store: Store, name: &str, span: Span) -> Result<(), EvalError> {
    Err(match store {
        Store::Done => return Ok(()),
        Store::Constant => type_error(span, format!("assignment to constant variable '{name}'")),
        Store::Uninitialized => EvalError::Uninitialized {
            name: name.to_string(),
            span,
        },
        Store::Import(specifier) => EvalError::UnavailableImport {
            name: name.to_string(),
            specifier,
            span,
        },
        Store::Missing => EvalError::NotDefined {
            name: name.to_string(),
            span,
        },
    })
}

/// `target[key] = value` on a shared array or object.
fn put(target: &Value, key: &Value, value: Value, span: Span) -> Result<(), EvalError> {
    match target {
        Value::Object(map) => {
            map.borrow_mut().insert(key_string(key), value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key_string(key) == "length" {
                return match array_index(&value) {
                    Some(len) if len <= items.len() => {
                        items.truncate(len);
                        Ok(())
                    }
                    _ => Err(type_error(span, "arrays can only be shortened through 'length'")),
                };
            }
            let Some(i) = array_index(key) else {
                return Err(type_error(
                    span,
                    format!("cannot set property '{}' on an array", key_string(key)),
                ));
            };
            match i.cmp(&items.len()) {
                Ordering::Less => items[i] = value,
                Ordering::Equal => items.push(value),
                Ordering::Greater => {
                    return Err(type_error(span, "sparse array assignment is not supported"));
                }
            }
            Ok(())
        }
        Value::Undefined | Value::Null => Err(type_error(
            span,
            format!(
                "cannot set properties of {} (setting '{}')",
                target.to_js_string(),
                key_string(key)
            ),
        )),
        // assignments to primitives are ignored
        _ => Ok(()),
    }
}

/// How a statement list finished.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Items of an iterable in `for...of`, destructuring and spread position.
fn iterate(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.borrow().clone()),
        Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
        _ => None,
    }
}

impl Evaluator {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            depth: 0,
            source: source.into(),
        }
    }

    /// File the code being evaluated came from, for console output.
    pub fn source_name(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Run a module's top-level items in `scope`. Returns the export map
    /// (exported name → local binding name) in declaration order.
    pub fn run_module(
        &mut self,
        module: &Module,
        scope: &Rc<Scope>,
    ) -> Result<IndexMap<String, String>, EvalError> {
        self.hoist(module, scope)?;
        let mut exports = IndexMap::new();
        for item in &module.items {
            match item {
                Item::Import(_) => {}
                Item::Function(decl) => {
                    if decl.exported
                        && let Some(name) = &decl.func.name
                    {
                        exports.insert(name.clone(), name.clone());
                    }
                }
                Item::Declare(decl) => {
                    self.declare_bindings(decl.kind, &decl.bindings, scope)?;
                    if decl.exported {
                        for binding in &decl.bindings {
                            for name in binding.target.names() {
                                exports.insert(name.to_string(), name.to_string());
                            }
                        }
                    }
                }
                Item::ExportList(specs) => {
                    for spec in specs {
                        if let Lookup::Missing = scope.lookup(&spec.local) {
                            return Err(EvalError::NotDefined {
                                name: spec.local.clone(),
                                span: Span::default(),
                            });
                        }
                        exports.insert(spec.exported.clone(), spec.local.clone());
                    }
                }
                Item::ExportDefault(expr) => {
                    let value = self.eval(expr, scope)?;
                    scope.initialize(DEFAULT_SLOT, value, false);
                    exports.insert("default".to_string(), DEFAULT_SLOT.to_string());
                }
                Item::Expr(expr) => {
                    self.eval(expr, scope)?;
                }
                Item::Stmt(stmt) => {
                    self.exec_stmt(stmt, scope)?;
                }
            }
        }
        Ok(exports)
    }

    /// Bind leftover imports, function declarations and the dead zone of
    /// every top-level `const`/`let` before any code runs.
    fn hoist(&mut self, module: &Module, scope: &Rc<Scope>) -> Result<(), EvalError> {
        for item in &module.items {
            match item {
                Item::Import(decl) if !decl.type_only => {
                    for name in &decl.bindings {
                        // a stub, an enclosing binding or a bound JSON
                        // document of the same name wins
                        if scope.inherited(name) || matches!(scope.own(name), Some(Slot::Value { .. })) {
                            continue;
                        }
                        let slot = Slot::Import {
                            specifier: decl.specifier.clone(),
                        };
                        if !scope.declare(name, slot) {
                            return Err(EvalError::Redeclared {
                                name: name.clone(),
                                span: decl.span,
                            });
                        }
                    }
                }
                Item::Function(decl) => {
                    if let Some(name) = &decl.func.name {
                        let value = closure(&decl.func, scope);
                        if !scope.declare(name, Slot::Value { value, mutable: true }) {
                            return Err(EvalError::Redeclared {
                                name: name.clone(),
                                span: decl.func.span,
                            });
                        }
                    }
                }
                Item::Declare(decl) => {
                    for binding in &decl.bindings {
                        self.predeclare(decl.kind, binding, scope)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn predeclare(&self, kind: DeclKind, binding: &Binding, scope: &Scope) -> Result<(), EvalError> {
        for name in binding.target.names() {
            let slot = match kind {
                DeclKind::Var => Slot::Value {
                    value: Value::Undefined,
                    mutable: true,
                },
                DeclKind::Let => Slot::Uninitialized { mutable: true },
                DeclKind::Const => Slot::Uninitialized { mutable: false },
            };
            if !scope.declare(name, slot) {
                return Err(EvalError::Redeclared {
                    name: name.to_string(),
                    span: binding.span,
                });
            }
        }
        Ok(())
    }

    fn declare_bindings(
        &mut self,
        kind: DeclKind,
        bindings: &[Binding],
        scope: &Rc<Scope>,
    ) -> Result<(), EvalError> {
        for binding in bindings {
            let value = match &binding.init {
                Some(init) => self.eval(init, scope)?,
                None => Value::Undefined,
            };
            self.bind_pattern(&binding.target, value, kind != DeclKind::Const, scope, binding.span)?;
        }
        Ok(())
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        mutable: bool,
        scope: &Rc<Scope>,
        span: Span,
    ) -> Result<(), EvalError> {
        match pattern {
            Pattern::Ident(name) => {
                scope.initialize(name, value, mutable);
                Ok(())
            }
            Pattern::Array(elems) => {
                let Some(items) = iterate(&value) else {
                    return Err(type_error(
                        span,
                        format!("{} is not iterable", value.to_js_string()),
                    ));
                };
                for (i, elem) in elems.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    let item = self.apply_default(item, elem.default.as_ref(), scope)?;
                    self.bind_pattern(&elem.target, item, mutable, scope, span)?;
                }
                Ok(())
            }
            Pattern::Object(props) => {
                if value.is_nullish() {
                    return Err(type_error(
                        span,
                        format!("cannot destructure '{}'", value.to_js_string()),
                    ));
                }
                for prop in props {
                    let item = get_property(&value, &prop.key, span)?;
                    let item = self.apply_default(item, prop.default.as_ref(), scope)?;
                    self.bind_pattern(&prop.target, item, mutable, scope, span)?;
                }
                Ok(())
            }
        }
    }

    fn apply_default(
        &mut self,
        value: Value,
        default: Option<&Expr>,
        scope: &Rc<Scope>,
    ) -> Result<Value, EvalError> {
        match (value, default) {
            (Value::Undefined, Some(default)) => self.eval(default, scope),
            (value, _) => Ok(value),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call(&mut self, f: &Value, args: Vec<Value>, span: Span) -> Result<Value, EvalError> {
        let Value::Function(callable) = f else {
            return Err(type_error(span, format!("{} is not a function", f.to_js_string())));
        };
        match callable.as_ref() {
            Callable::Stub { stub, .. } => {
                let first = args.into_iter().next().unwrap_or(Value::Undefined);
                Ok(match stub {
                    Stub::Prefix { prefix } => {
                        Value::String(format!("{prefix}{}", first.to_js_string()))
                    }
                    _ => first,
                })
            }
            Callable::Closure { func, scope } => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(EvalError::Range {
                        span,
                        message: format!("maximum call depth of {MAX_CALL_DEPTH} exceeded"),
                    });
                }
                self.depth += 1;
                let result = self.invoke(func, scope, args);
                self.depth -= 1;
                result
            }
            Callable::Builtin(builtin) => builtins::call_builtin(self, *builtin, args, span),
            Callable::Method { method, this } => {
                builtins::call_method(self, *method, this, args, span)
            }
        }
    }

    fn invoke(
        &mut self,
        func: &Rc<Function>,
        closure: &Rc<Scope>,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        let local = Scope::child(closure);
        let mut args = args.into_iter();
        for param in &func.params {
            let arg = args.next().unwrap_or(Value::Undefined);
            let arg = self.apply_default(arg, param.default.as_ref(), &local)?;
            self.bind_pattern(&param.target, arg, true, &local, func.span)?;
        }
        match &func.body {
            FunctionBody::Expr(expr) => self.eval(expr, &local),
            FunctionBody::Block(stmts) => Ok(match self.exec_block(stmts, &local)? {
                Flow::Return(value) => value,
                Flow::Normal | Flow::Break | Flow::Continue => Value::Undefined,
            }),
        }
    }

    /// Run statements in `scope`, which holds their declarations.
    fn exec_block(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        for stmt in stmts {
            if let Stmt::Declare(kind, bindings) = stmt {
                for binding in bindings {
                    self.predeclare(*kind, binding, scope)?;
                }
            }
        }
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Declare(kind, bindings) => self.declare_bindings(*kind, bindings, scope)?,
            Stmt::Return(value) => {
                return Ok(Flow::Return(match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                }));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let branch = if self.eval(test, scope)?.truthy() {
                    consequent
                } else {
                    alternate
                };
                return self.exec_block(branch, &Scope::child(scope));
            }
            Stmt::ForOf {
                kind,
                target,
                iterable,
                body,
                span,
            } => return self.for_of(*kind, target, iterable, body, scope, *span),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Arrays are walked live, so items pushed by the body are visited too.
    fn for_of(
        &mut self,
        kind: DeclKind,
        target: &Pattern,
        iterable: &Expr,
        body: &[Stmt],
        scope: &Rc<Scope>,
        span: Span,
    ) -> Result<Flow, EvalError> {
        let value = self.eval(iterable, scope)?;
        let chars = match &value {
            Value::Array(_) => Vec::new(),
            other => iterate(other).ok_or_else(|| {
                type_error(
                    iterable.span,
                    format!("{} is not iterable", describe_value(iterable, other)),
                )
            })?,
        };
        let mut index = 0;
        loop {
            let item = match &value {
                Value::Array(items) => items.borrow().get(index).cloned(),
                _ => chars.get(index).cloned(),
            };
            let Some(item) = item else { break };
            index += 1;
            let binding = Scope::child(scope);
            self.bind_pattern(target, item, kind != DeclKind::Const, &binding, span)?;
            match self.exec_block(body, &Scope::child(&binding))? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lookup(&self, name: &str, span: Span, scope: &Scope) -> Result<Value, EvalError> {
        match scope.lookup(name) {
            Lookup::Found(value) => Ok(value),
            Lookup::Uninitialized => Err(EvalError::Uninitialized {
                name: name.to_string(),
                span,
            }),
            Lookup::Import(specifier) => Err(EvalError::UnavailableImport {
                name: name.to_string(),
                specifier,
                span,
            }),
            Lookup::Missing => Err(EvalError::NotDefined {
                name: name.to_string(),
                span,
            }),
        }
    }

    pub fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Undefined => Value::Undefined,
            ExprKind::Null => Value::Null,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Number(n) => Value::Number(*n),
            ExprKind::Str(s) => Value::String(s.clone()),
            ExprKind::Regex(literal) => Value::RegExp(Rc::clone(literal)),
            ExprKind::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(e) => out.push_str(&self.eval(e, scope)?.to_js_string()),
                    }
                }
                Value::String(out)
            }
            ExprKind::Array(elements) => Value::array(self.elements(elements, scope)?),
            ExprKind::Object(props) => {
                let mut map = Object::new();
                for prop in props {
                    match prop {
                        Property::KeyValue(key, value) => {
                            let value = self.eval(value, scope)?;
                            map.insert(key.clone(), value);
                        }
                        Property::Spread(source) => match self.eval(source, scope)? {
                            Value::Object(other) => {
                                let other = other.borrow();
                                map.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
                            }
                            Value::Array(items) => {
                                let items = items.borrow();
                                map.extend(
                                    items.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())),
                                );
                            }
                            Value::String(s) => {
                                map.extend(
                                    s.chars()
                                        .enumerate()
                                        .map(|(i, c)| (i.to_string(), Value::String(c.to_string()))),
                                );
                            }
                            _ => {}
                        },
                    }
                }
                Value::object(map)
            }
            ExprKind::Ident(name) => self.lookup(name, span, scope)?,
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => {
                self.chain(expr, scope)?.unwrap_or(Value::Undefined)
            }
            ExprKind::Function(func) => closure(func, scope),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => Value::Bool(!self.eval(operand, scope)?.truthy()),
                UnaryOp::Neg => Value::Number(-self.eval(operand, scope)?.to_number()),
                UnaryOp::TypeOf => {
                    // typeof of an undeclared name is "undefined", not an error
                    if let ExprKind::Ident(name) = &operand.kind
                        && let Lookup::Missing = scope.lookup(name)
                    {
                        Value::string("undefined")
                    } else {
                        Value::string(self.eval(operand, scope)?.type_of())
                    }
                }
            },
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, scope, span)?,
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)?
                } else {
                    self.eval(alternate, scope)?
                }
            }
            ExprKind::Assign { target, value } => self.assign(target, value, scope, span)?,
        })
    }

    fn elements(&mut self, elements: &[Element], scope: &Rc<Scope>) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Item(e) => out.push(self.eval(e, scope)?),
                Element::Spread(e) => {
                    let value = self.eval(e, scope)?;
                    let Some(items) = iterate(&value) else {
                        return Err(type_error(
                            e.span,
                            format!("{} is not iterable", describe_value(e, &value)),
                        ));
                    };
                    out.extend(items);
                }
            }
        }
        Ok(out)
    }

    /// Member, index and call chains. `None` means an optional link
    /// (`?.`) met null or undefined and the rest of the chain is skipped.
    fn chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Option<Value>, EvalError> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                get_property(&target, property, expr.span).map(Some)
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval(index, scope)?;
                get_property(&target, &key_string(&key), expr.span).map(Some)
            }
            ExprKind::Call { callee, args } => {
                let Some(f) = self.chain(callee, scope)? else {
                    return Ok(None);
                };
                if !matches!(f, Value::Function(_)) {
                    return Err(type_error(
                        expr.span,
                        format!("{} is not a function", describe(callee)),
                    ));
                }
                let args = self.elements(args, scope)?;
                self.call(&f, args, expr.span).map(Some)
            }
            _ => self.eval(expr, scope).map(Some),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Rc<Scope>,
        span: Span,
    ) -> Result<Value, EvalError> {
        let lhs = self.eval(left, scope)?;
        match op {
            BinaryOp::And => return if lhs.truthy() { self.eval(right, scope) } else { Ok(lhs) },
            BinaryOp::Or => return if lhs.truthy() { Ok(lhs) } else { self.eval(right, scope) },
            BinaryOp::Nullish => {
                return if lhs.is_nullish() {
                    self.eval(right, scope)
                } else {
                    Ok(lhs)
                };
            }
            _ => {}
        }
        let rhs = self.eval(right, scope)?;
        Ok(match op {
            BinaryOp::Add => {
                if is_stringy(&lhs) || is_stringy(&rhs) {
                    Value::String(lhs.to_js_string() + &rhs.to_js_string())
                } else {
                    Value::Number(lhs.to_number() + rhs.to_number())
                }
            }
            BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
            BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
            BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
            BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
            BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(&rhs)),
            BinaryOp::StrictNe => Value::Bool(!lhs.strict_eq(&rhs)),
            BinaryOp::LooseEq => Value::Bool(lhs.loose_eq(&rhs)),
            BinaryOp::LooseNe => Value::Bool(!lhs.loose_eq(&rhs)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let ordering = if is_stringy(&lhs) && is_stringy(&rhs) {
                    Some(compare_strings(&lhs.to_js_string(), &rhs.to_js_string()))
                } else {
                    lhs.to_number().partial_cmp(&rhs.to_number())
                };
                // NaN compares false every way
                Value::Bool(ordering.is_some_and(|o| match op {
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Gt => o.is_gt(),
                    BinaryOp::LtEq => o.is_le(),
                    _ => o.is_ge(),
                }))
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => {
                return Err(type_error(span, "logical operator reached arithmetic path"));
            }
        })
    }

    fn assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        scope: &Rc<Scope>,
        span: Span,
    ) -> Result<Value, EvalError> {
        if let ExprKind::Ident(name) = &target.kind {
            let value = self.eval(value, scope)?;
            return stored(scope.assign(name, value.clone()), name, span).map(|()| value);
        }
        let (object, key) = match &target.kind {
            ExprKind::Member {
                object, property, ..
            } => (self.eval(object, scope)?, Value::String(property.clone())),
            ExprKind::Index { object, index, .. } => {
                let object = self.eval(object, scope)?;
                (object, self.eval(index, scope)?)
            }
            _ => {
                return Err(type_error(
                    span,
                    format!("cannot assign through {}", describe(target)),
                ));
            }
        };
        let value = self.eval(value, scope)?;
        put(&object, &key, value.clone(), span)?;
        Ok(value)
    }
}

/// Operands that `+` concatenates and `<` compares as strings.
fn is_stringy(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::RegExp(_) | Value::Function(_)
    )
}

fn closure(func: &Rc<Function>, scope: &Rc<Scope>) -> Value {
    Value::Function(Rc::new(Callable::Closure {
        func: Rc::clone(func),
        scope: Rc::clone(scope),
    }))
}

fn describe_value(expr: &Expr, value: &Value) -> String {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
            format!("{} ({})", describe(expr), value.to_js_string())
        }
        _ => value.to_js_string(),
    }
}
