use std::{cmp::Ordering, rc::Rc};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDef, Literal, LogicalOp, Program, Stmt, StmtKind, UnaryOp},
    config::Config,
    diagnostics::{Position, Result, RuntimeError, RuntimeErrorKind},
    environment::{Environment, EnvironmentRef},
    lexer::Lexer,
    parser,
    registry::Registry,
    stack::ensure_sufficient_stack,
    value::{MapKey, UserFunction, Value, ValueKind},
};

/// An assignment target with its index keys already evaluated.
struct Place {
    root: String,
    pos: Position,
    path: Vec<(Value, Position)>,
}

/// Outcome of executing one statement.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Executes `program` against `env` with the default configuration.
pub fn evaluate(program: &Program, env: &EnvironmentRef) -> std::result::Result<Value, RuntimeError> {
    Interpreter::with_environment(Rc::clone(env), Config::default()).eval_program(program)
}

/// Tokenizes, parses and evaluates `source` against `env`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn run(source: &str, env: &EnvironmentRef) -> Result<Value> {
    Interpreter::with_environment(Rc::clone(env), Config::default()).eval_source(source)
}

pub struct Interpreter {
    globals: EnvironmentRef,
    env: EnvironmentRef,
    config: Config,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_registry(Registry::with_prelude(), config)
    }

    pub fn with_registry(registry: Registry, config: Config) -> Self {
        Self::with_environment(registry.environment(), config)
    }

    pub fn with_environment(globals: EnvironmentRef, config: Config) -> Self {
        Self {
            env: Rc::clone(&globals),
            globals,
            config,
            depth: 0,
        }
    }

    pub fn environment(&self) -> EnvironmentRef {
        Rc::clone(&self.globals)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let tokens = Lexer::new(source)
            .with_options(self.config.lexer)
            .tokenize()?;
        debug!(tokens = tokens.len(), "tokenized");
        let program = parser::parse(tokens)?;
        Ok(self.eval_program(&program)?)
    }

    /// Runs top-level statements in order. The result is the value of the
    /// last expression statement, or nil.
    pub fn eval_program(&mut self, program: &Program) -> std::result::Result<Value, RuntimeError> {
        debug!(statements = program.statements.len(), "evaluating program");
        self.env = Rc::clone(&self.globals);
        self.depth = 0;
        let mut last = Value::nil();
        for stmt in &program.statements {
            match self.execute(stmt)? {
                Flow::Normal(value) => {
                    if matches!(stmt.kind, StmtKind::Expr(_)) {
                        last = value;
                    }
                }
                Flow::Return(_) => {
                    return Err(uncaught("`return` outside of a function").at(stmt.pos));
                }
                Flow::Break => return Err(uncaught("`break` outside of a loop").at(stmt.pos)),
                Flow::Continue => {
                    return Err(uncaught("`continue` outside of a loop").at(stmt.pos));
                }
            }
        }
        debug!(result = last.type_name(), "program finished");
        Ok(last)
    }

    fn execute(&mut self, stmt: &Stmt) -> std::result::Result<Flow, RuntimeError> {
        ensure_sufficient_stack(|| self.execute_inner(stmt))
    }

    fn execute_inner(&mut self, stmt: &Stmt) -> std::result::Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Let { name, initializer } => {
                let value = self.evaluate(initializer)?;
                self.env.borrow_mut().define(name.clone(), value);
                Ok(Flow::Normal(Value::nil()))
            }
            StmtKind::Assign { target, op, value } => {
                let place = self.place(target)?;
                let value = match op {
                    None => self.evaluate(value)?,
                    Some(op) => {
                        let current = self.load(&place)?;
                        let rhs = self.evaluate(value)?;
                        binary(*op, &current, &rhs).map_err(|err| err.at(stmt.pos))?
                    }
                };
                self.store(&place, value)?;
                Ok(Flow::Normal(Value::nil()))
            }
            StmtKind::Expr(expr) => Ok(Flow::Normal(self.evaluate(expr)?)),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition, "`if` condition")? {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(Flow::Normal(Value::nil()))
                }
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition, "`while` condition")? {
                    match self.execute_block(body)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal(Value::nil()))
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable_value = self.evaluate(iterable)?;
                let items = iterate(&iterable_value).map_err(|err| err.at(iterable.pos))?;
                for item in items {
                    let frame = Environment::with_parent(Rc::clone(&self.env));
                    frame.borrow_mut().define(binding.clone(), item);
                    match self.execute_in(frame, body)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal(Value::nil()))
            }
            StmtKind::Function(def) => {
                let function = self.closure(def);
                let name = def.name.clone().unwrap_or_default();
                self.env.borrow_mut().define(name, function);
                Ok(Flow::Normal(Value::nil()))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::nil(),
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Block(statements) => self.execute_block(statements),
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> std::result::Result<Flow, RuntimeError> {
        let frame = Environment::with_parent(Rc::clone(&self.env));
        self.execute_in(frame, statements)
    }

    /// Runs `statements` with `frame` as the current scope, restoring the
    /// previous scope on every exit path.
    fn execute_in(
        &mut self,
        frame: EnvironmentRef,
        statements: &[Stmt],
    ) -> std::result::Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, frame);
        let result = self.execute_statements(statements);
        self.env = previous;
        result
    }

    fn execute_statements(&mut self, statements: &[Stmt]) -> std::result::Result<Flow, RuntimeError> {
        for stmt in statements {
            match self.execute(stmt)? {
                Flow::Normal(_) => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(Value::nil()))
    }

    fn condition(&mut self, expr: &Expr, context: &str) -> std::result::Result<bool, RuntimeError> {
        let value = self.evaluate(expr)?;
        value.expect_bool(context).map_err(|err| err.at(expr.pos))
    }

    fn closure(&self, def: &Rc<FunctionDef>) -> Value {
        Value::new(ValueKind::Function(UserFunction {
            def: Rc::clone(def),
            closure: Rc::clone(&self.env),
        }))
    }

    fn evaluate(&mut self, expr: &Expr) -> std::result::Result<Value, RuntimeError> {
        ensure_sufficient_stack(|| self.evaluate_inner(expr))
    }

    fn evaluate_inner(&mut self, expr: &Expr) -> std::result::Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::number(*n),
                Literal::String(s) => Value::string(s.clone()),
                Literal::Bool(b) => Value::bool(*b),
                Literal::Nil => Value::nil(),
            }),
            ExprKind::List(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Map(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key_expr, value_expr) in pairs {
                    let key_value = self.evaluate(key_expr)?;
                    let key = MapKey::from_value(&key_value).map_err(|err| err.at(key_expr.pos))?;
                    let value = self.evaluate(value_expr)?;
                    map.insert(key, value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Identifier(name) => {
                Environment::get(&self.env, name).map_err(|err| err.at(expr.pos))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                unary(*op, &value).map_err(|err| err.at(expr.pos))
            }
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                binary(*op, &left_value, &right_value).map_err(|err| err.at(expr.pos))
            }
            ExprKind::Logical { op, left, right } => {
                let context = match op {
                    LogicalOp::And => "operand of `&&`",
                    LogicalOp::Or => "operand of `||`",
                };
                let lhs = self.condition(left, context)?;
                let short_circuit = match op {
                    LogicalOp::And => !lhs,
                    LogicalOp::Or => lhs,
                };
                if short_circuit {
                    return Ok(Value::bool(lhs));
                }
                Ok(Value::bool(self.condition(right, context)?))
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.call(&callee_value, values, expr.pos)
            }
            ExprKind::Index { collection, key } => {
                let collection_value = self.evaluate(collection)?;
                let key_value = self.evaluate(key)?;
                index(&collection_value, &key_value).map_err(|err| err.at(expr.pos))
            }
            ExprKind::Function(def) => Ok(self.closure(def)),
        }
    }

    fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        pos: Position,
    ) -> std::result::Result<Value, RuntimeError> {
        match callee.kind() {
            ValueKind::NativeFunction(native) => {
                trace!(function = %native.name, args = args.len(), "native call");
                native.call(&args).map_err(|err| err.at(pos))
            }
            ValueKind::Function(function) => self.call_user(function, args, pos),
            _ => Err(RuntimeError::type_error(format!(
                "{} is not callable",
                callee.type_name()
            ))
            .at(pos)),
        }
    }

    fn call_user(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
        pos: Position,
    ) -> std::result::Result<Value, RuntimeError> {
        let name = function.name().unwrap_or("anonymous");
        if args.len() != function.arity() {
            let expected = match function.arity() {
                1 => "1 argument".to_string(),
                n => format!("{n} arguments"),
            };
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityError,
                format!(
                    "function `{name}` expected {expected} but received {}",
                    args.len()
                ),
            )
            .at(pos));
        }
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::RecursionLimit,
                format!(
                    "maximum call depth of {} exceeded in `{name}`",
                    self.config.max_call_depth
                ),
            )
            .at(pos));
        }

        let frame = Environment::with_parent(Rc::clone(&function.closure));
        {
            let mut scope = frame.borrow_mut();
            for (param, arg) in function.def.params.iter().zip(args) {
                scope.define(param.name.clone(), arg);
            }
        }

        self.depth += 1;
        trace!(function = name, depth = self.depth, "call");
        let result = self.execute_in(frame, &function.def.body);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(Value::nil()),
            Flow::Break => Err(uncaught("`break` outside of a loop").at(pos)),
            Flow::Continue => Err(uncaught("`continue` outside of a loop").at(pos)),
        }
    }

    /// Resolves an assignment target, evaluating each index key once and
    /// left to right.
    fn place(&mut self, target: &Expr) -> std::result::Result<Place, RuntimeError> {
        match &target.kind {
            ExprKind::Identifier(name) => Ok(Place {
                root: name.clone(),
                pos: target.pos,
                path: Vec::new(),
            }),
            ExprKind::Index { collection, key } => {
                let mut place = self.place(collection)?;
                let key_value = self.evaluate(key)?;
                place.path.push((key_value, target.pos));
                Ok(place)
            }
            _ => Err(RuntimeError::type_error("invalid assignment target").at(target.pos)),
        }
    }

    fn load(&self, place: &Place) -> std::result::Result<Value, RuntimeError> {
        let mut value = Environment::get(&self.env, &place.root).map_err(|err| err.at(place.pos))?;
        for (key, pos) in &place.path {
            value = index(&value, key).map_err(|err| err.at(*pos))?;
        }
        Ok(value)
    }

    /// Stores `value` at `place`, rebuilding each container on the way back
    /// to the variable that owns it.
    fn store(&self, place: &Place, value: Value) -> std::result::Result<(), RuntimeError> {
        let mut updated = value;
        if let Some((_, steps)) = place.path.split_last() {
            let mut containers = Vec::with_capacity(place.path.len());
            let mut current =
                Environment::get(&self.env, &place.root).map_err(|err| err.at(place.pos))?;
            for (key, pos) in steps {
                let inner = index(&current, key).map_err(|err| err.at(*pos))?;
                containers.push(current);
                current = inner;
            }
            containers.push(current);
            for (container, (key, pos)) in containers.iter().zip(&place.path).rev() {
                updated = set_index(container, key, updated).map_err(|err| err.at(*pos))?;
            }
        }
        Environment::assign(&self.env, &place.root, updated).map_err(|err| err.at(place.pos))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn uncaught(message: &str) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::UncaughtControlSignal, message)
}

fn unary(op: UnaryOp, value: &Value) -> std::result::Result<Value, RuntimeError> {
    match op {
        UnaryOp::Negate => match value.as_number() {
            Some(n) => Ok(Value::number(-n)),
            None => Err(RuntimeError::type_error(format!(
                "cannot negate {}",
                value.type_name()
            ))),
        },
        UnaryOp::Not => Ok(Value::bool(!value.expect_bool("operand of `!`")?)),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> std::result::Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        Add => match (left.kind(), right.kind()) {
            (ValueKind::Number(a), ValueKind::Number(b)) => Ok(Value::number(a + b)),
            (ValueKind::String(a), ValueKind::String(b)) => Ok(Value::string(format!("{a}{b}"))),
            _ => Err(operand_error(op, left, right)),
        },
        Sub => arithmetic(op, left, right, |a, b| a - b),
        Mul => arithmetic(op, left, right, |a, b| a * b),
        Pow => arithmetic(op, left, right, f64::powf),
        Div | Mod => {
            let (a, b) = numbers(op, left, right)?;
            if b == 0.0 {
                let what = if op == Div { "division" } else { "modulo" };
                return Err(RuntimeError::new(
                    RuntimeErrorKind::DivisionByZero,
                    format!("{what} by zero"),
                ));
            }
            if op == Div {
                Ok(Value::number(a / b))
            } else {
                // floored: the result takes the sign of the divisor
                let rem = a % b;
                let rem = if rem != 0.0 && (rem < 0.0) != (b < 0.0) { rem + b } else { rem };
                Ok(Value::number(rem))
            }
        }
        Equal => Ok(Value::bool(left == right)),
        NotEqual => Ok(Value::bool(left != right)),
        Less => compare(op, left, right, Ordering::is_lt),
        LessEqual => compare(op, left, right, Ordering::is_le),
        Greater => compare(op, left, right, Ordering::is_gt),
        GreaterEqual => compare(op, left, right, Ordering::is_ge),
    }
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "cannot apply `{}` to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn numbers(op: BinaryOp, left: &Value, right: &Value) -> std::result::Result<(f64, f64), RuntimeError> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(operand_error(op, left, right)),
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    func: impl Fn(f64, f64) -> f64,
) -> std::result::Result<Value, RuntimeError> {
    let (a, b) = numbers(op, left, right)?;
    Ok(Value::number(func(a, b)))
}

fn compare(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    test: fn(Ordering) -> bool,
) -> std::result::Result<Value, RuntimeError> {
    let ordering = match (left.kind(), right.kind()) {
        (ValueKind::Number(a), ValueKind::Number(b)) => a.partial_cmp(b),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "cannot compare {} with {} using `{}`",
                left.type_name(),
                right.type_name(),
                op.symbol()
            )));
        }
    };
    Ok(Value::bool(ordering.is_some_and(test)))
}

/// Validates a list or string position against `len`.
fn position_index(key: &Value, len: usize, what: &str) -> std::result::Result<usize, RuntimeError> {
    let Some(n) = key.as_number() else {
        return Err(RuntimeError::type_error(format!(
            "{what} index must be a Number, found {}",
            key.type_name()
        )));
    };
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(RuntimeError::type_error(format!(
            "{what} index must be an integer, found {n}"
        )));
    }
    if n < 0.0 || n >= len as f64 {
        return Err(RuntimeError::new(
            RuntimeErrorKind::IndexError,
            format!("{what} index {n} out of range for length {len}"),
        ));
    }
    Ok(n as usize)
}

fn index(collection: &Value, key: &Value) -> std::result::Result<Value, RuntimeError> {
    match collection.kind() {
        ValueKind::List(values) => {
            let idx = position_index(key, values.len(), "list")?;
            Ok(values[idx].clone())
        }
        ValueKind::String(text) => {
            let idx = position_index(key, text.chars().count(), "string")?;
            Ok(text
                .chars()
                .nth(idx)
                .map(|ch| Value::string(ch.to_string()))
                .unwrap_or_else(Value::nil))
        }
        ValueKind::Map(map) => {
            let map_key = MapKey::from_value(key)?;
            map.get(&map_key).cloned().ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::KeyError,
                    format!("key {map_key:?} not found in map"),
                )
            })
        }
        _ => Err(RuntimeError::type_error(format!(
            "cannot index into {}",
            collection.type_name()
        ))),
    }
}

fn set_index(
    collection: &Value,
    key: &Value,
    value: Value,
) -> std::result::Result<Value, RuntimeError> {
    match collection.kind() {
        ValueKind::List(values) => {
            let idx = position_index(key, values.len(), "list")?;
            let mut updated = values.clone();
            updated[idx] = value;
            Ok(Value::list(updated))
        }
        ValueKind::Map(map) => {
            let map_key = MapKey::from_value(key)?;
            let mut updated = map.clone();
            updated.insert(map_key, value);
            Ok(Value::map(updated))
        }
        _ => Err(RuntimeError::type_error(format!(
            "cannot assign into {}",
            collection.type_name()
        ))),
    }
}

fn iterate(value: &Value) -> std::result::Result<Vec<Value>, RuntimeError> {
    match value.kind() {
        ValueKind::List(values) => Ok(values.clone()),
        ValueKind::Map(map) => Ok(map.keys().map(MapKey::to_value).collect()),
        ValueKind::String(text) => Ok(text.chars().map(|ch| Value::string(ch.to_string())).collect()),
        _ => Err(RuntimeError::type_error(format!(
            "cannot iterate over {}",
            value.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DEFAULT_MAX_CALL_DEPTH, diagnostics::TomboError};

    fn eval(source: &str) -> Value {
        Interpreter::new().eval_source(source).expect("eval")
    }

    fn runtime_error(source: &str) -> RuntimeError {
        match Interpreter::new().eval_source(source) {
            Err(TomboError::Runtime(err)) => err,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3"), Value::number(7.0));
        assert_eq!(eval("2 ** 3 ** 2"), Value::number(512.0));
        assert_eq!(eval("-2 ** 2"), Value::number(-4.0));
        assert_eq!(eval("7 / 2"), Value::number(3.5));
        assert_eq!(eval("\"ab\" + \"cd\""), Value::string("abcd"));
    }

    #[test]
    fn floored_modulo() {
        assert_eq!(eval("7 % 3"), Value::number(1.0));
        assert_eq!(eval("-7 % 3"), Value::number(2.0));
        assert_eq!(eval("7 % -3"), Value::number(-2.0));
    }

    #[test]
    fn division_by_zero() {
        let err = runtime_error("let x = 0\n1 / x");
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(err.pos, Some(Position::new(2, 3)));
        assert_eq!(runtime_error("5 % 0").message, "modulo by zero");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("1 < 2"), Value::bool(true));
        assert_eq!(eval("\"apple\" < \"banana\""), Value::bool(true));
        assert_eq!(eval("[1, [2]] == [1, [2]]"), Value::bool(true));
        assert_eq!(eval("1 == \"1\""), Value::bool(false));
        let err = runtime_error("1 < \"2\"");
        assert_eq!(err.kind, RuntimeErrorKind::TypeError);
        assert_eq!(err.message, "cannot compare Number with String using `<`");
    }

    #[test]
    fn strict_booleans() {
        assert_eq!(runtime_error("if 1 then 2 end").message, "`if` condition must be Bool, found Number");
        assert_eq!(runtime_error("!nil").kind, RuntimeErrorKind::TypeError);
        assert_eq!(runtime_error("true && 1").kind, RuntimeErrorKind::TypeError);
        assert_eq!(eval("false && (1 / 0)"), Value::bool(false));
        assert_eq!(eval("true || missing"), Value::bool(true));
    }

    #[test]
    fn hand_built_block_scopes_its_bindings() {
        let root = Environment::new();
        let pos = Position::default();
        let program = Program {
            statements: vec![Stmt {
                kind: StmtKind::Block(vec![Stmt {
                    kind: StmtKind::Let {
                        name: "inner".into(),
                        initializer: Expr {
                            kind: ExprKind::Literal(Literal::Nil),
                            pos,
                        },
                    },
                    pos,
                }]),
                pos,
            }],
        };
        assert_eq!(evaluate(&program, &root), Ok(Value::nil()));
        assert!(!root.borrow().contains_local("inner"));
    }

    #[test]
    fn top_level_control_signals() {
        for (source, message) in [
            ("break", "`break` outside of a loop"),
            ("continue", "`continue` outside of a loop"),
            ("return 1", "`return` outside of a function"),
        ] {
            let err = runtime_error(source);
            assert_eq!(err.kind, RuntimeErrorKind::UncaughtControlSignal);
            assert_eq!(err.message, message);
        }
        let err = runtime_error("function f()\n  break\nend\nf()");
        assert_eq!(err.kind, RuntimeErrorKind::UncaughtControlSignal);
        assert_eq!(err.pos, Some(Position::new(4, 2)));
    }

    #[test]
    fn recursion_limit() {
        let config = Config::default().with_max_call_depth(16);
        let mut interpreter = Interpreter::with_config(config);
        let err = interpreter
            .eval_source("function down(n)\n  return down(n + 1)\nend\ndown(0)")
            .expect_err("limit");
        let TomboError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.kind, RuntimeErrorKind::RecursionLimit);
        assert_eq!(
            interpreter
                .eval_source("function count(n)\n  if n == 0 then return 0 end\n  return 1 + count(n - 1)\nend\ncount(15)")
                .expect("within limit"),
            Value::number(15.0)
        );
    }

    #[test]
    fn default_call_depth_on_a_worker_thread() {
        // values are not Send; hand back plain numbers and errors
        let (counted, runaway) = std::thread::spawn(|| {
            let mut interpreter = Interpreter::new();
            assert_eq!(interpreter.config().max_call_depth, DEFAULT_MAX_CALL_DEPTH);
            let counted = interpreter
                .eval_source(
                    "function count(n)\n  if n == 0 then return 0 end\n  return 1 + count(n - 1)\nend\ncount(190)",
                )
                .map(|value| value.as_number());
            let runaway = interpreter
                .eval_source("function down(n) => down(n + 1)\ndown(0)")
                .map(|value| value.to_string());
            (counted, runaway)
        })
        .join()
        .expect("evaluation stays within the thread's stack");
        assert_eq!(counted.expect("within limit"), Some(190.0));
        let Err(TomboError::Runtime(err)) = runaway else {
            panic!("expected runtime error");
        };
        assert_eq!(err.kind, RuntimeErrorKind::RecursionLimit);
        assert_eq!(
            err.message,
            format!("maximum call depth of {DEFAULT_MAX_CALL_DEPTH} exceeded in `down`")
        );
    }

    #[test]
    fn deeply_nested_expression_evaluates() {
        let depth = 2_000;
        let source = format!("{}1{}", "-(".repeat(depth), ")".repeat(depth));
        let value = std::thread::spawn(move || {
            Interpreter::new()
                .eval_source(&source)
                .map(|value| value.as_number())
        })
        .join()
        .expect("evaluation stays within the thread's stack")
        .expect("eval");
        assert_eq!(value, Some(1.0));
    }

    #[test]
    fn call_rooted_target_is_rejected_at_runtime_for_hand_built_trees() {
        let pos = Position::new(1, 1);
        let call = Expr {
            kind: ExprKind::Call {
                callee: Box::new(Expr {
                    kind: ExprKind::Identifier("len".into()),
                    pos,
                }),
                args: Vec::new(),
            },
            pos,
        };
        let program = Program {
            statements: vec![Stmt {
                kind: StmtKind::Assign {
                    target: Expr {
                        kind: ExprKind::Index {
                            collection: Box::new(call),
                            key: Box::new(Expr {
                                kind: ExprKind::Literal(Literal::Number(0.0)),
                                pos,
                            }),
                        },
                        pos,
                    },
                    op: None,
                    value: Expr {
                        kind: ExprKind::Literal(Literal::Nil),
                        pos,
                    },
                },
                pos,
            }],
        };
        let err = Interpreter::new().eval_program(&program).expect_err("invalid target");
        assert_eq!(err.kind, RuntimeErrorKind::TypeError);
        assert_eq!(err.message, "invalid assignment target");
    }

    #[test]
    fn scope_is_restored_after_errors() {
        let mut interpreter = Interpreter::new();
        interpreter
            .eval_source("let kept = 1\nif true\n  let inner = 2\n  missing()\nend")
            .expect_err("undefined");
        assert_eq!(interpreter.eval_source("kept").expect("kept"), Value::number(1.0));
        assert!(interpreter.eval_source("inner").is_err());
    }
}
