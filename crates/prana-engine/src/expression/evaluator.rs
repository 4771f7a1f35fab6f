//! Expression and template evaluation (spec §4.4). Grounded on the teacher's
//! `expression::evaluator` (same split between evaluating a parsed `Expr`
//! and rendering a mixed template against a context), rewired to the spec's
//! grammar: pipe filters instead of method calls, `{% if %}`/`{% for %}`
//! control flow the teacher never had, and a four-root variable set
//! (`$input`, `$nodes`, `$variables`, `$execution`) instead of n8n's.

use std::collections::HashMap;

use prana_workflow::Value;

use super::filters;
use super::parser::{self, BinaryOperator, Expr, FilterCall, Literal, PathSegment, TemplateNode, VariablePath};
use super::ExpressionError;
use crate::config::RuntimeConfig;

/// The resolved roots and `for`-loop bindings an expression or template is
/// evaluated against. Built fresh per node by the node executor from
/// `routed_input`, `runtime.nodes`, `runtime.variables` and the execution's
/// loop/run-index state (spec §4.3 step 2).
#[derive(Clone)]
pub struct EvalContext {
    roots: HashMap<String, Value>,
    locals: Vec<HashMap<String, Value>>,
}

impl EvalContext {
    pub fn new(input: Value, nodes: Value, variables: Value, execution: Value) -> Self {
        let mut roots = HashMap::new();
        roots.insert("input".to_string(), input);
        roots.insert("nodes".to_string(), nodes);
        roots.insert("variables".to_string(), variables);
        roots.insert("execution".to_string(), execution);
        Self { roots, locals: Vec::new() }
    }

    fn root(&self, name: &str) -> Value {
        self.roots.get(name).cloned().unwrap_or(Value::Null)
    }

    fn local(&self, name: &str) -> Option<Value> {
        self.locals.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    fn push_scope(&mut self, name: String, value: Value) {
        let mut scope = HashMap::with_capacity(1);
        scope.insert(name, value);
        self.locals.push(scope);
    }

    fn pop_scope(&mut self) {
        self.locals.pop();
    }
}

struct Evaluator<'a> {
    config: &'a RuntimeConfig,
    loop_iterations: std::cell::Cell<u64>,
}

impl<'a> Evaluator<'a> {
    fn new(config: &'a RuntimeConfig) -> Self {
        Self {
            config,
            loop_iterations: std::cell::Cell::new(0),
        }
    }

    fn check_depth(&self, depth: u32) -> Result<(), ExpressionError> {
        if depth > self.config.max_template_depth {
            Err(ExpressionError::LimitExceeded(format!(
                "template nesting exceeds max depth of {}",
                self.config.max_template_depth
            )))
        } else {
            Ok(())
        }
    }

    fn count_iteration(&self) -> Result<(), ExpressionError> {
        let n = self.loop_iterations.get() + 1;
        self.loop_iterations.set(n);
        if n > self.config.max_loop_iterations {
            Err(ExpressionError::LimitExceeded(format!(
                "loop iterations exceed max of {}",
                self.config.max_loop_iterations
            )))
        } else {
            Ok(())
        }
    }

    fn eval(&self, expr: &Expr, ctx: &EvalContext, depth: u32) -> Result<Value, ExpressionError> {
        self.check_depth(depth)?;
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Variable(path) => self.resolve_variable(path, ctx, depth),
            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, ctx, depth),
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, ctx, depth + 1)?);
                }
                if values.is_empty() {
                    return Err(ExpressionError::UnknownFunction(name.clone()));
                }
                let base = values.remove(0);
                filters::apply(name, base, &values)
            }
            Expr::Pipe { base, filters: stages } => {
                let mut value = self.eval(base, ctx, depth + 1)?;
                for FilterCall { name, args } in stages {
                    let mut arg_values = Vec::with_capacity(args.len());
                    for arg in args {
                        arg_values.push(self.eval(arg, ctx, depth + 1)?);
                    }
                    value = filters::apply(name, value, &arg_values)?;
                }
                Ok(value)
            }
        }
    }

    fn resolve_variable(&self, path: &VariablePath, ctx: &EvalContext, depth: u32) -> Result<Value, ExpressionError> {
        let mut value = if path.dollar {
            ctx.root(&path.root)
        } else {
            ctx.local(&path.root).unwrap_or(Value::Null)
        };
        for segment in &path.path {
            value = match segment {
                PathSegment::Field(field) => value.get(field),
                PathSegment::Index(key_expr) => {
                    let key = self.eval(key_expr, ctx, depth + 1)?;
                    match key {
                        Value::Integer(i) if i >= 0 => value.index(i as usize),
                        Value::String(s) => value.get(&s),
                        _ => Value::Null,
                    }
                }
            };
        }
        Ok(value)
    }

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        ctx: &EvalContext,
        depth: u32,
    ) -> Result<Value, ExpressionError> {
        if op == BinaryOperator::And {
            let l = self.eval(left, ctx, depth + 1)?;
            if !l.is_truthy() {
                return Ok(l);
            }
            return self.eval(right, ctx, depth + 1);
        }
        if op == BinaryOperator::Or {
            let l = self.eval(left, ctx, depth + 1)?;
            if l.is_truthy() {
                return Ok(l);
            }
            return self.eval(right, ctx, depth + 1);
        }

        let l = self.eval(left, ctx, depth + 1)?;
        let r = self.eval(right, ctx, depth + 1)?;
        match op {
            BinaryOperator::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOperator::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge => {
                compare(&l, op, &r)
            }
            BinaryOperator::Add => add(&l, &r),
            BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div => arith(&l, op, &r),
            BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
        }
    }

    fn render(&self, nodes: &[TemplateNode], ctx: &mut EvalContext, depth: u32) -> Result<String, ExpressionError> {
        self.check_depth(depth)?;
        let mut out = String::new();
        for node in nodes {
            match node {
                TemplateNode::Text(text) => out.push_str(text),
                TemplateNode::Expr(expr) => {
                    let value = self.eval(expr, ctx, depth)?;
                    out.push_str(&value.render());
                }
                TemplateNode::If { cond, body } => {
                    if self.eval(cond, ctx, depth)?.is_truthy() {
                        out.push_str(&self.render(body, ctx, depth + 1)?);
                    }
                }
                TemplateNode::For { ident, iterable, body } => {
                    let items = self.eval(iterable, ctx, depth)?;
                    let Value::Array(items) = items else {
                        return Err(ExpressionError::TypeError("For loop iterable must be a list".to_string()));
                    };
                    for item in items {
                        self.count_iteration()?;
                        ctx.push_scope(ident.clone(), item);
                        let rendered = self.render(body, ctx, depth + 1);
                        ctx.pop_scope();
                        out.push_str(&rendered?);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                Value::Integer(*n as i64)
            } else {
                Value::Float(*n)
            }
        }
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn compare(a: &Value, op: BinaryOperator, b: &Value) -> Result<Value, ExpressionError> {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => x.partial_cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(ExpressionError::TypeError(format!(
                    "cannot compare {a:?} and {b:?}"
                )))
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::Le => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn add(a: &Value, b: &Value) -> Result<Value, ExpressionError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        (Value::String(x), other) => Ok(Value::String(format!("{x}{}", other.render()))),
        (other, Value::String(y)) => Ok(Value::String(format!("{}{y}", other.render()))),
        _ => arith(a, BinaryOperator::Add, b),
    }
}

fn arith(a: &Value, op: BinaryOperator, b: &Value) -> Result<Value, ExpressionError> {
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(ExpressionError::TypeError(format!(
            "arithmetic requires numeric operands, got {a:?} and {b:?}"
        )));
    };
    let result = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Sub => x - y,
        BinaryOperator::Mul => x * y,
        BinaryOperator::Div => x / y,
        _ => unreachable!(),
    };
    let both_integer = matches!(a, Value::Integer(_)) && matches!(b, Value::Integer(_));
    if both_integer && op != BinaryOperator::Div {
        Ok(Value::Integer(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn check_size(source: &str, config: &RuntimeConfig) -> Result<(), ExpressionError> {
    if source.len() > config.max_template_size {
        Err(ExpressionError::LimitExceeded(format!(
            "template size {} exceeds max of {} bytes",
            source.len(),
            config.max_template_size
        )))
    } else {
        Ok(())
    }
}

/// Evaluate `source` and return its raw `Value` (spec §4.3 step 2: a pure
/// `{{ expr }}` template with nothing else around it yields the expression's
/// value rather than its stringified form; anything else renders to a
/// string).
pub fn render_value(source: &str, ctx: &EvalContext, config: &RuntimeConfig) -> Result<Value, ExpressionError> {
    check_size(source, config)?;
    let nodes = parser::parse_template(source)?;
    let evaluator = Evaluator::new(config);
    if let [TemplateNode::Expr(expr)] = nodes.as_slice() {
        return evaluator.eval(expr, ctx, 0);
    }
    let mut ctx = ctx.clone();
    let rendered = evaluator.render(&nodes, &mut ctx, 0)?;
    Ok(Value::String(rendered))
}

/// Render every templated string in `params`, recursing through arrays and
/// objects, leaving non-string and non-templated values untouched (spec
/// §4.3 step 2 "render the node's `params`").
pub fn render_params(params: &Value, ctx: &EvalContext, config: &RuntimeConfig) -> Result<Value, ExpressionError> {
    match params {
        Value::String(s) if s.contains("{{") || s.contains("{%") => render_value(s, ctx, config),
        Value::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(render_params(item, ctx, config)?);
            }
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut rendered = prana_workflow::ValueMap::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render_params(value, ctx, config)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_input(input: Value) -> EvalContext {
        EvalContext::new(input, Value::Null, Value::Null, Value::Null)
    }

    #[test]
    fn pure_expression_returns_raw_value() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert("age".to_string(), Value::Integer(42));
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let value = render_value("{{ $input.age }}", &ctx, &config).unwrap();
        assert_eq!(value, Value::Integer(42));
    }

    #[test]
    fn mixed_template_renders_string() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert("name".to_string(), Value::String("Ada".to_string()));
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let value = render_value("hi {{ $input.name }}!", &ctx, &config).unwrap();
        assert_eq!(value, Value::String("hi Ada!".to_string()));
    }

    #[test]
    fn missing_variable_resolves_to_nil_not_error() {
        let ctx = ctx_with_input(Value::Null);
        let config = RuntimeConfig::default();
        let value = render_value("{{ $input.missing.deep }}", &ctx, &config).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn filter_chain_applies_in_order() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert("name".to_string(), Value::String("ada lovelace".to_string()));
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let value = render_value("{{ $input.name | upper_case | truncate(3) }}", &ctx, &config).unwrap();
        assert_eq!(value, Value::String("ADA...".to_string()));
    }

    #[test]
    fn if_block_is_conditional() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert("ok".to_string(), Value::Bool(true));
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let value = render_value("{% if $input.ok %}yes{% endif %}", &ctx, &config).unwrap();
        assert_eq!(value, Value::String("yes".to_string()));
    }

    #[test]
    fn for_loop_binds_item() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert(
            "items".to_string(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
        );
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let value = render_value("{% for n in $input.items %}{{ n }},{% endfor %}", &ctx, &config).unwrap();
        assert_eq!(value, Value::String("1,2,3,".to_string()));
    }

    #[test]
    fn for_loop_over_non_array_is_a_type_error() {
        let mut map = prana_workflow::ValueMap::new();
        map.insert("items".to_string(), Value::String("not a list".to_string()));
        let ctx = ctx_with_input(Value::Object(map));
        let config = RuntimeConfig::default();
        let err = render_value("{% for n in $input.items %}{{ n }}{% endfor %}", &ctx, &config).unwrap_err();
        assert_eq!(err.kind(), prana_workflow::ErrorKind::TemplateError);
        assert!(err.to_string().contains("For loop iterable must be a list"));
    }

    #[test]
    fn loop_iteration_limit_is_enforced() {
        let items: Vec<Value> = (0..5).map(Value::Integer).collect();
        let mut map = prana_workflow::ValueMap::new();
        map.insert("items".to_string(), Value::Array(items));
        let ctx = ctx_with_input(Value::Object(map));
        let mut config = RuntimeConfig::default();
        config.max_loop_iterations = 3;
        let err = render_value("{% for n in $input.items %}{{ n }}{% endfor %}", &ctx, &config).unwrap_err();
        assert_eq!(err.kind(), prana_workflow::ErrorKind::TemplateLimit);
    }

    #[test]
    fn template_size_limit_is_enforced() {
        let ctx = ctx_with_input(Value::Null);
        let mut config = RuntimeConfig::default();
        config.max_template_size = 4;
        let err = render_value("{{ 1 }}", &ctx, &config).unwrap_err();
        assert_eq!(err.kind(), prana_workflow::ErrorKind::TemplateLimit);
    }

    #[test]
    fn arithmetic_and_comparison() {
        let ctx = ctx_with_input(Value::Null);
        let config = RuntimeConfig::default();
        let value = render_value("{{ (2 + 3) * 4 >= 20 }}", &ctx, &config).unwrap();
        assert_eq!(value, Value::Bool(true));
    }
}
