//! Tree-walking evaluation
//!
//! Top-level `let` bindings and function declarations become properties of
//! the global object. Function literals capture the enclosing frame by
//! value.

use super::{ReferenceEngine, STACK_RED_ZONE, STACK_SEGMENT};
use super::heap::{Builtin, HeapObject, ObjectKind};
use super::parser::{BinOp, Expr, FunctionDecl, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use crate::engine::{Host, ScriptEngine};
use crate::error::ScriptError;
use crate::value::{ObjectId, ScriptValue, format_number};
use std::rc::Rc;

/// Variables of one activation
struct Scope {
    vars: Vec<(Rc<str>, ScriptValue)>,
    this: ScriptValue,
    /// Bindings go to the global object
    global: bool,
    source_url: Rc<str>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<&ScriptValue> {
        self.vars.iter().rev().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    fn assign(&mut self, name: &str, value: &ScriptValue) -> bool {
        match self.vars.iter_mut().rev().find(|(k, _)| &**k == name) {
            Some(entry) => {
                entry.1 = value.clone();
                true
            }
            None => false,
        }
    }
}

enum Completion {
    /// Carries the value of an expression statement, if any
    Normal(Option<ScriptValue>),
    Return(ScriptValue),
}

/// Callee resolved out of the heap
enum Callee {
    Closure(Rc<FunctionDecl>, Vec<(Rc<str>, ScriptValue)>),
    Native(crate::engine::NativeFunctionId),
    Builtin(Builtin),
}

impl ReferenceEngine {
    pub(super) fn run_program(&mut self, host: &mut dyn Host, program: &Program) -> Result<ScriptValue, ScriptError> {
        let mut scope = Scope {
            vars: Vec::new(),
            this: ScriptValue::Undefined,
            global: true,
            source_url: program.source_url.clone(),
        };
        match self.exec_block(host, &program.body, &mut scope) {
            Ok(Completion::Normal(value)) => Ok(value.unwrap_or_default()),
            Ok(Completion::Return(value)) => Ok(value),
            Err(mut error) => {
                error.stack.push_str(&format!("    at <eval> ({})\n", program.source_url));
                Err(error.at(&program.source_url, 0))
            }
        }
    }

    fn exec_block(&mut self, host: &mut dyn Host, stmts: &[Stmt], scope: &mut Scope) -> Result<Completion, ScriptError> {
        let mut last = None;
        for stmt in stmts {
            let completion = self
                .exec_stmt(host, stmt, scope)
                .map_err(|e| e.at(&scope.source_url, stmt.line))?;
            match completion {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                Completion::Return(value) => return Ok(Completion::Return(value)),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn exec_stmt(&mut self, host: &mut dyn Host, stmt: &Stmt, scope: &mut Scope) -> Result<Completion, ScriptError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.exec_stmt_kind(host, stmt, scope))
    }

    fn exec_stmt_kind(
        &mut self,
        host: &mut dyn Host,
        stmt: &Stmt,
        scope: &mut Scope,
    ) -> Result<Completion, ScriptError> {
        match &stmt.kind {
            StmtKind::Let(name, init) => {
                let value = match init {
                    Some(expr) => self.eval(host, expr, scope)?,
                    None => ScriptValue::Undefined,
                };
                if scope.global {
                    let global = self.global;
                    self.define_property(global, name, value);
                } else {
                    scope.vars.push((name.clone(), value));
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::Expr(expr) => Ok(Completion::Normal(Some(self.eval(host, expr, scope)?))),
            StmtKind::Throw(expr) => {
                let value = self.eval(host, expr, scope)?;
                Err(self.error_from_value(value))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(host, expr, scope)?,
                    None => ScriptValue::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StmtKind::If(test, consequent, alternate) => {
                if self.eval(host, test, scope)?.is_truthy() {
                    self.exec_block(host, consequent, scope)
                } else {
                    self.exec_block(host, alternate, scope)
                }
            }
            StmtKind::While(test, body) => {
                let mut last = None;
                while self.eval(host, test, scope)?.is_truthy() {
                    match self.exec_block(host, body, scope)? {
                        Completion::Normal(Some(value)) => last = Some(value),
                        Completion::Normal(None) => {}
                        ret @ Completion::Return(_) => return Ok(ret),
                    }
                }
                Ok(Completion::Normal(last))
            }
            StmtKind::Try {
                body,
                param,
                handler,
                finalizer,
            } => {
                let outcome = match (self.exec_block(host, body, scope), handler) {
                    (Err(error), Some(handler)) => {
                        let error = error.at(&scope.source_url, stmt.line);
                        let value = self.error_value(&error);
                        let depth = scope.vars.len();
                        if let Some(param) = param {
                            scope.vars.push((param.clone(), value));
                        }
                        let outcome = self.exec_block(host, handler, scope);
                        scope.vars.truncate(depth);
                        outcome
                    }
                    (outcome, _) => outcome,
                };
                if let Some(finalizer) = finalizer {
                    match self.exec_block(host, finalizer, scope)? {
                        ret @ Completion::Return(_) => return Ok(ret),
                        Completion::Normal(_) => {}
                    }
                }
                outcome
            }
            StmtKind::Block(body) => self.exec_block(host, body, scope),
        }
    }

    fn eval(&mut self, host: &mut dyn Host, expr: &Expr, scope: &mut Scope) -> Result<ScriptValue, ScriptError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.eval_expr(host, expr, scope))
    }

    fn eval_expr(&mut self, host: &mut dyn Host, expr: &Expr, scope: &mut Scope) -> Result<ScriptValue, ScriptError> {
        match expr {
            Expr::Number(n) => Ok(ScriptValue::number(*n)),
            Expr::Str(s) => Ok(ScriptValue::String(s.clone())),
            Expr::Bool(b) => Ok(ScriptValue::bool(*b)),
            Expr::Null => Ok(ScriptValue::Null),
            Expr::Undefined => Ok(ScriptValue::Undefined),
            Expr::This => Ok(scope.this.clone()),
            Expr::Ident(name) => self
                .lookup(scope, name)
                .ok_or_else(|| ScriptError::reference(format!("{} is not defined", name))),
            Expr::Member(object, name) => {
                let object = self.eval(host, object, scope)?;
                self.get_value_property(host, &object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(host, object, scope)?;
                let key = self.eval(host, index, scope)?;
                let key = self.property_key(&key);
                self.get_value_property(host, &object, &key)
            }
            Expr::Call(callee, args) => {
                let (function, this) = match &**callee {
                    Expr::Member(object, name) => {
                        let object = self.eval(host, object, scope)?;
                        (self.get_value_property(host, &object, name)?, object)
                    }
                    Expr::Index(object, index) => {
                        let object = self.eval(host, object, scope)?;
                        let key = self.eval(host, index, scope)?;
                        let key = self.property_key(&key);
                        (self.get_value_property(host, &object, &key)?, object)
                    }
                    other => (self.eval(host, other, scope)?, ScriptValue::Undefined),
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(host, arg, scope)?);
                }
                if !self.is_callable(&function) {
                    return Err(ScriptError::type_error(format!("{} is not a function", describe(callee))));
                }
                self.call_value(host, &function, &this, &values)
            }
            Expr::Function(decl) => {
                let captured = if scope.global { Vec::new() } else { scope.vars.clone() };
                let closure = HeapObject::new(
                    ObjectKind::Closure {
                        decl: decl.clone(),
                        captured,
                    },
                    None,
                );
                Ok(ScriptValue::object(self.heap.alloc(closure)))
            }
            Expr::Object(props) => {
                let mut values = Vec::with_capacity(props.len());
                for (key, value) in props {
                    values.push((key.clone(), self.eval(host, value, scope)?));
                }
                let mut object = HeapObject::new(ObjectKind::Plain, None);
                object.props = values;
                Ok(ScriptValue::object(self.heap.alloc(object)))
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(host, item, scope)?);
                }
                Ok(ScriptValue::object(self.create_array(values)))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(host, left, scope)?;
                let right = self.eval(host, right, scope)?;
                Ok(self.binary(*op, &left, &right))
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(host, left, scope)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(host, right, scope),
                }
            }
            Expr::Unary(UnaryOp::TypeOf, operand) => {
                let value = match &**operand {
                    Expr::Ident(name) => self.lookup(scope, name).unwrap_or_default(),
                    other => self.eval(host, other, scope)?,
                };
                let name = if self.is_callable(&value) {
                    "function"
                } else {
                    value.type_name()
                };
                Ok(ScriptValue::string(name))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(host, operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => ScriptValue::bool(!value.is_truthy()),
                    _ => ScriptValue::number(-value.to_number()),
                })
            }
            Expr::Assign(target, value) => {
                let value = self.eval(host, value, scope)?;
                self.assign(host, target, value.clone(), scope)?;
                Ok(value)
            }
        }
    }

    fn lookup(&self, scope: &Scope, name: &str) -> Option<ScriptValue> {
        if let Some(value) = scope.lookup(name) {
            return Some(value.clone());
        }
        self.heap.get(self.global)?.get_own(name).cloned()
    }

    fn assign(
        &mut self,
        host: &mut dyn Host,
        target: &Expr,
        value: ScriptValue,
        scope: &mut Scope,
    ) -> Result<(), ScriptError> {
        match target {
            Expr::Ident(name) => {
                if !scope.assign(name, &value) {
                    let global = self.global;
                    self.define_property(global, name, value);
                }
                Ok(())
            }
            Expr::Member(object, name) => {
                let object = self.eval(host, object, scope)?;
                self.set_value_property(host, &object, name, value)
            }
            Expr::Index(object, index) => {
                let object = self.eval(host, object, scope)?;
                let key = self.eval(host, index, scope)?;
                let key = self.property_key(&key);
                self.set_value_property(host, &object, &key, value)
            }
            _ => Err(ScriptError::syntax("invalid assignment target")),
        }
    }

    fn property_key(&self, key: &ScriptValue) -> String {
        match key {
            ScriptValue::Number(n) => format_number(*n),
            other => self.display(other),
        }
    }

    fn get_value_property(
        &mut self,
        host: &mut dyn Host,
        value: &ScriptValue,
        name: &str,
    ) -> Result<ScriptValue, ScriptError> {
        match value {
            ScriptValue::Object(id) => self.get_property(host, *id, name),
            ScriptValue::String(s) if name == "length" => Ok(ScriptValue::number(s.chars().count() as f64)),
            ScriptValue::Undefined | ScriptValue::Null => Err(ScriptError::type_error(format!(
                "cannot read properties of {} (reading '{}')",
                value, name
            ))),
            _ => Ok(ScriptValue::Undefined),
        }
    }

    fn set_value_property(
        &mut self,
        host: &mut dyn Host,
        target: &ScriptValue,
        name: &str,
        value: ScriptValue,
    ) -> Result<(), ScriptError> {
        match target {
            ScriptValue::Object(id) => self.set_property(host, *id, name, value),
            ScriptValue::Undefined | ScriptValue::Null => Err(ScriptError::type_error(format!(
                "cannot set properties of {} (setting '{}')",
                target, name
            ))),
            _ => Ok(()),
        }
    }

    fn binary(&self, op: BinOp, left: &ScriptValue, right: &ScriptValue) -> ScriptValue {
        match op {
            BinOp::Add => {
                let stringy = |v: &ScriptValue| matches!(v, ScriptValue::String(_) | ScriptValue::Object(_));
                if stringy(left) || stringy(right) {
                    let mut text = self.display(left);
                    text.push_str(&self.display(right));
                    ScriptValue::from(text)
                } else {
                    ScriptValue::number(left.to_number() + right.to_number())
                }
            }
            BinOp::Sub => ScriptValue::number(left.to_number() - right.to_number()),
            BinOp::Mul => ScriptValue::number(left.to_number() * right.to_number()),
            BinOp::Div => ScriptValue::number(left.to_number() / right.to_number()),
            BinOp::Rem => ScriptValue::number(left.to_number() % right.to_number()),
            BinOp::StrictEq => ScriptValue::bool(left.strict_equals(right)),
            BinOp::StrictNe => ScriptValue::bool(!left.strict_equals(right)),
            BinOp::LooseEq => ScriptValue::bool(loose_equals(left, right)),
            BinOp::LooseNe => ScriptValue::bool(!loose_equals(left, right)),
            BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
                let ordering = match (left, right) {
                    (ScriptValue::String(a), ScriptValue::String(b)) => a.partial_cmp(b),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                let Some(ordering) = ordering else {
                    return ScriptValue::bool(false);
                };
                ScriptValue::bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::LtEq => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    /// Invoke any callable value
    pub(super) fn call_value(
        &mut self,
        host: &mut dyn Host,
        function: &ScriptValue,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let Some(id) = function.as_object() else {
            return Err(ScriptError::type_error(format!("{} is not a function", self.display(function))));
        };
        let callee = match self.heap.get(id).map(|o| &o.kind) {
            Some(ObjectKind::Closure { decl, captured }) => Callee::Closure(decl.clone(), captured.clone()),
            Some(ObjectKind::NativeFunction { id: native, .. }) => Callee::Native(*native),
            Some(ObjectKind::Builtin(builtin)) => Callee::Builtin(*builtin),
            _ => {
                return Err(ScriptError::type_error(format!("{} is not a function", self.display(function))));
            }
        };

        if self.depth >= self.max_depth {
            return Err(ScriptError::range("maximum call stack size exceeded"));
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || match callee {
            Callee::Closure(decl, captured) => self.call_closure(host, id, &decl, captured, this, args),
            Callee::Native(native) => host.call_native(self, native, this, args),
            Callee::Builtin(builtin) => self.call_builtin(host, builtin, this, args),
        });
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        host: &mut dyn Host,
        function: ObjectId,
        decl: &FunctionDecl,
        captured: Vec<(Rc<str>, ScriptValue)>,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let mut scope = Scope {
            vars: captured,
            this: this.clone(),
            global: false,
            source_url: decl.source_url.clone(),
        };
        if let Some(name) = &decl.name {
            scope.vars.push((name.clone(), ScriptValue::object(function)));
        }
        for (idx, param) in decl.params.iter().enumerate() {
            scope
                .vars
                .push((param.clone(), args.get(idx).cloned().unwrap_or_default()));
        }
        match self.exec_block(host, &decl.body, &mut scope) {
            Ok(Completion::Return(value)) => Ok(value),
            Ok(Completion::Normal(_)) => Ok(ScriptValue::Undefined),
            Err(mut error) => {
                error.stack.push_str(&format!(
                    "    at {} ({}:{})\n",
                    decl.name.as_deref().unwrap_or("<anonymous>"),
                    decl.source_url,
                    decl.line
                ));
                Err(error)
            }
        }
    }

    fn call_builtin(
        &mut self,
        host: &mut dyn Host,
        builtin: Builtin,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let arg = |idx: usize| args.get(idx).cloned().unwrap_or_default();
        match builtin {
            Builtin::PromiseResolve => {
                let value = arg(0);
                if let Some(id) = value.as_object().filter(|id| self.is_promise(*id)) {
                    return Ok(ScriptValue::object(id));
                }
                let promise = self.new_promise();
                self.resolve_promise(host, promise, value);
                Ok(ScriptValue::object(promise))
            }
            Builtin::PromiseReject => {
                let promise = self.new_promise();
                self.reject_promise(host, promise, arg(0));
                Ok(ScriptValue::object(promise))
            }
            Builtin::PromiseThen | Builtin::PromiseCatch => {
                let Some(promise) = this.as_object().filter(|id| self.is_promise(*id)) else {
                    return Err(ScriptError::type_error("receiver is not a promise"));
                };
                let (on_fulfilled, on_rejected) = match builtin {
                    Builtin::PromiseThen => (arg(0), arg(1)),
                    _ => (ScriptValue::Undefined, arg(0)),
                };
                let derived = self.new_promise();
                self.perform_then(host, promise, on_fulfilled, on_rejected, Some(derived));
                Ok(ScriptValue::object(derived))
            }
            Builtin::ArrayPush => {
                let Some(ObjectKind::Array(items)) = this
                    .as_object()
                    .and_then(|id| self.heap.get_mut(id))
                    .map(|o| &mut o.kind)
                else {
                    return Err(ScriptError::type_error("push called on a non-array"));
                };
                items.extend_from_slice(args);
                Ok(ScriptValue::number(items.len() as f64))
            }
            Builtin::Resolver { promise, reject } => {
                self.settle_once(host, promise, reject, arg(0));
                Ok(ScriptValue::Undefined)
            }
        }
    }
}

fn loose_equals(left: &ScriptValue, right: &ScriptValue) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (a, b) if a.is_nullish() || b.is_nullish() => false,
        (ScriptValue::Object(_), _) | (_, ScriptValue::Object(_)) => left == right,
        (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
        _ => left.to_number() == right.to_number(),
    }
}

/// Short source-like description of a callee for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::Member(object, name) => format!("{}.{}", describe(object), name),
        Expr::This => "this".to_string(),
        Expr::Call(callee, _) => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Host, NativeFunctionId, ReferenceEngine, ScriptEngine};
    use crate::error::ScriptError;
    use crate::gc::{GcVisitor, NativeGraph, NativeRef};
    use crate::value::{ObjectId, ScriptValue};

    /// Host with no native surface, recording rejection tracking calls
    #[derive(Default)]
    struct NullHost {
        rejections: Vec<(ObjectId, bool)>,
    }

    impl NativeGraph for NullHost {
        fn trace_native(&self, _native: NativeRef, _visitor: &mut GcVisitor<'_>) {}
        fn trace_roots(&self, _visitor: &mut GcVisitor<'_>) {}
    }

    impl Host for NullHost {
        fn call_native(
            &mut self,
            _engine: &mut dyn ScriptEngine,
            _function: NativeFunctionId,
            _this: &ScriptValue,
            args: &[ScriptValue],
        ) -> Result<ScriptValue, ScriptError> {
            Ok(args.first().cloned().unwrap_or_default())
        }

        fn get_native_property(
            &mut self,
            _engine: &mut dyn ScriptEngine,
            _native: NativeRef,
            _name: &str,
        ) -> Result<Option<ScriptValue>, ScriptError> {
            Ok(None)
        }

        fn set_native_property(
            &mut self,
            _engine: &mut dyn ScriptEngine,
            _native: NativeRef,
            _name: &str,
            _value: &ScriptValue,
        ) -> Result<bool, ScriptError> {
            Ok(false)
        }

        fn promise_rejection_tracker(&mut self, promise: ObjectId, _reason: &ScriptValue, handled: bool) {
            self.rejections.push((promise, handled));
        }
    }

    fn eval(engine: &mut ReferenceEngine, host: &mut NullHost, source: &str) -> Result<ScriptValue, ScriptError> {
        engine.evaluate(host, source, "test.js", 1)
    }

    fn drain(engine: &mut ReferenceEngine, host: &mut NullHost) {
        while let Some(result) = engine.run_pending_job(host) {
            result.unwrap();
        }
    }

    #[test]
    fn test_arithmetic_and_strings() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        assert_eq!(eval(&mut engine, &mut host, "1 + 2 * 3").unwrap(), ScriptValue::number(7.0));
        assert_eq!(eval(&mut engine, &mut host, "'a' + 1").unwrap(), ScriptValue::string("a1"));
        assert_eq!(eval(&mut engine, &mut host, "1 === 1 && 'x' !== 'y'").unwrap(), ScriptValue::bool(true));
        assert_eq!(eval(&mut engine, &mut host, "null == undefined").unwrap(), ScriptValue::bool(true));
    }

    #[test]
    fn test_globals_persist_between_evaluations() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(&mut engine, &mut host, "let counter = 1\nfunction bump() { counter = counter + 1 }").unwrap();
        eval(&mut engine, &mut host, "bump(); bump()").unwrap();
        assert_eq!(eval(&mut engine, &mut host, "counter").unwrap(), ScriptValue::number(3.0));
    }

    #[test]
    fn test_closures_capture_by_value() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let source = "
            function make(n) {
                return function () { return n * 2 }
            }
            let f = make(21)
            f()
        ";
        assert_eq!(eval(&mut engine, &mut host, source).unwrap(), ScriptValue::number(42.0));
    }

    #[test]
    fn test_recursion_limit() {
        let mut engine = ReferenceEngine::new(16);
        let mut host = NullHost::default();
        let err = eval(&mut engine, &mut host, "function f() { return f() }\nf()").unwrap_err();
        assert_eq!(err.name, "RangeError");
        // The engine stays usable afterwards
        assert_eq!(eval(&mut engine, &mut host, "1").unwrap(), ScriptValue::number(1.0));
    }

    #[test]
    fn test_unbounded_recursion_at_default_depth() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let err = eval(&mut engine, &mut host, "function f(n) { return f(n + 1) }\nf(0)").unwrap_err();
        assert_eq!(err.name, "RangeError");
        assert_eq!(err.message, "maximum call stack size exceeded");

        let err = eval(&mut engine, &mut host, "function g(n) { return 1 + g([n, { v: n }]) }\ng(0)").unwrap_err();
        assert_eq!(err.name, "RangeError");
    }

    #[test]
    fn test_array_length_writes_are_validated() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        for length in ["1e300", "-1", "1.5", "4294967296"] {
            let source = format!("let a = []\na.length = {}", length);
            assert_eq!(eval(&mut engine, &mut host, &source).unwrap_err().name, "RangeError");
        }
        let source = "let b = [1, 2, 3]\nb.length = 1\nb.length";
        assert_eq!(eval(&mut engine, &mut host, source).unwrap(), ScriptValue::number(1.0));
    }

    #[test]
    fn test_huge_indices_are_ordinary_properties() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(&mut engine, &mut host, "let a = []\na[1e18] = 1\na[4294967295] = 2").unwrap();
        assert_eq!(eval(&mut engine, &mut host, "a.length").unwrap(), ScriptValue::number(0.0));
        assert_eq!(eval(&mut engine, &mut host, "a[1e18] + a[4294967295]").unwrap(), ScriptValue::number(3.0));

        let err = eval(&mut engine, &mut host, "a[4294967294] = 3").unwrap_err();
        assert_eq!(err.name, "RangeError");
        assert_eq!(eval(&mut engine, &mut host, "a[2] = 'x'\na.length").unwrap(), ScriptValue::number(3.0));
    }

    #[test]
    fn test_cyclic_values_display() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let source = "let a = [1]\na.push(a)\n'' + a";
        assert_eq!(eval(&mut engine, &mut host, source).unwrap(), ScriptValue::string("1,"));
        let source = "let e = { name: 'Error' }\ne.message = e\n'' + e";
        assert_eq!(
            eval(&mut engine, &mut host, source).unwrap(),
            ScriptValue::string("Error: [object Object]")
        );
    }

    #[test]
    fn test_try_catch_finally() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let source = "
            let log = []
            try {
                log.push('try')
                throw { name: 'CustomError', message: 'bad' }
            } catch (e) {
                log.push(e.name)
            } finally {
                log.push('finally')
            }
            log.length
        ";
        assert_eq!(eval(&mut engine, &mut host, source).unwrap(), ScriptValue::number(3.0));
        assert_eq!(eval(&mut engine, &mut host, "log[1]").unwrap(), ScriptValue::string("CustomError"));
    }

    #[test]
    fn test_uncaught_error_location() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let err = engine
            .evaluate(&mut host, "let a = 1\nmissing()", "app.js", 10)
            .unwrap_err();
        assert_eq!(err.name, "ReferenceError");
        assert_eq!(err.source_url, "app.js");
        assert_eq!(err.line, 11);
        assert!(err.stack.contains("<eval>"));
    }

    #[test]
    fn test_thrown_value_is_kept() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let err = eval(&mut engine, &mut host, "throw 'boom'").unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(err.value, ScriptValue::string("boom"));
    }

    #[test]
    fn test_native_function_call() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let echo = engine.create_function("echo", NativeFunctionId(1));
        let global = engine.global();
        engine.define_property(global, "echo", ScriptValue::object(echo));
        assert_eq!(eval(&mut engine, &mut host, "echo(5) + 1").unwrap(), ScriptValue::number(6.0));
        let err = eval(&mut engine, &mut host, "let o = {}\no.nope()").unwrap_err();
        assert_eq!(err.name, "TypeError");
    }

    #[test]
    fn test_promise_then_runs_as_job() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(
            &mut engine,
            &mut host,
            "let seen = 0\nPromise.resolve(4).then(function (v) { seen = v })",
        )
        .unwrap();
        assert_eq!(eval(&mut engine, &mut host, "seen").unwrap(), ScriptValue::number(0.0));
        assert!(engine.has_pending_jobs());
        drain(&mut engine, &mut host);
        assert_eq!(eval(&mut engine, &mut host, "seen").unwrap(), ScriptValue::number(4.0));
    }

    #[test]
    fn test_rejection_tracking() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(&mut engine, &mut host, "let p = Promise.reject('x')").unwrap();
        assert_eq!(host.rejections.len(), 1);
        assert!(!host.rejections[0].1);

        eval(&mut engine, &mut host, "p.catch(function (e) { })").unwrap();
        assert_eq!(host.rejections.len(), 2);
        assert!(host.rejections[1].1);
        assert_eq!(host.rejections[0].0, host.rejections[1].0);
        drain(&mut engine, &mut host);
    }

    #[test]
    fn test_handler_error_rejects_derived() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(
            &mut engine,
            &mut host,
            "let caught = null\nPromise.resolve(1).then(function () { throw 'inner' }).catch(function (e) { caught = e })",
        )
        .unwrap();
        drain(&mut engine, &mut host);
        assert_eq!(eval(&mut engine, &mut host, "caught").unwrap(), ScriptValue::string("inner"));
        assert!(host.rejections.is_empty());
    }

    #[test]
    fn test_capability_settles_once() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        let capability = engine.new_promise_capability();
        engine
            .call(&mut host, &capability.resolve, &ScriptValue::Undefined, &[ScriptValue::number(1.0)])
            .unwrap();
        engine
            .call(&mut host, &capability.reject, &ScriptValue::Undefined, &[ScriptValue::number(2.0)])
            .unwrap();
        assert_eq!(
            engine.promise_status(capability.promise),
            Some(super::super::PromiseStatus::Fulfilled(ScriptValue::number(1.0)))
        );
        assert!(host.rejections.is_empty());
    }

    #[test]
    fn test_collect_keeps_globals() {
        let mut engine = ReferenceEngine::default();
        let mut host = NullHost::default();
        eval(&mut engine, &mut host, "let kept = { a: [1, 2] }\n{ let x = {} }").unwrap();
        eval(&mut engine, &mut host, "({ temp: 1 })").ok();
        let collection = engine.collect_garbage(&host);
        assert!(collection.objects_after < collection.objects_before);
        assert_eq!(eval(&mut engine, &mut host, "kept.a[1]").unwrap(), ScriptValue::number(2.0));
    }
}
