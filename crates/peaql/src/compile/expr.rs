//! Expression compilation: AST expressions → typed plan nodes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use peaql_parser::ast::{
    self, BinaryOp, Expr, FunctionCall, InList, Literal, UnaryOp, WindowSpec,
};

use super::{query, Compiler, Scope};
use crate::error::{Error, Result};
use crate::plan::{
    AggregateExpr, CallNode, ExcludeMode, FrameMode, FramePlan, InItems, Node, SubqueryExpr,
    WindowExpr,
};
use crate::registry::{registry, render_signature};
use crate::types::{self, DType};
use crate::value::Value;

/// Window attachments found while compiling target expressions, waiting for
/// the query-level lowering pass (partition/order keys become hidden
/// targets, so the target list must exist first).
pub(crate) type PendingWindows = Vec<(Rc<WindowExpr>, WindowSpec)>;

/// Compiles an expression where window functions are not meaningful
/// (WHERE, ON, constraints, defaults).
pub(crate) fn compile_standalone_expr(
    c: &Compiler,
    scope: &Scope,
    expr: &Expr,
) -> Result<Node> {
    compile_expr(c, scope, &mut None, expr)
}

/// Compiles an expression, collecting `OVER` attachments into `windows`.
pub(crate) fn compile_expr(
    c: &Compiler,
    scope: &Scope,
    windows: &mut Option<&mut PendingWindows>,
    expr: &Expr,
) -> Result<Node> {
    match expr {
        Expr::Literal(literal) => Ok(Node::Constant(literal_value(literal))),

        Expr::Parameter {
            name,
            position,
            span,
        } => {
            let value = c.bind_parameter(name.as_deref(), *position, *span)?;
            Ok(Node::Constant(value))
        }

        Expr::Column {
            table,
            name,
            quoted,
            span,
        } => {
            if let Some(node) = scope.lookup(table.as_deref(), name, false)? {
                return Ok(node);
            }
            // `created.year`: the qualifier may be a structured column whose
            // attribute is being read.
            if let Some(qualifier) = table {
                if let Some(base) = scope.lookup(None, qualifier, false)? {
                    if let Some(node) = attribute_access(base, name)? {
                        return Ok(node);
                    }
                }
            }
            if *quoted {
                // Auto quoting: unresolvable delimited names read as string
                // literals.
                return Ok(Node::Constant(Value::String(name.clone())));
            }
            let rendered = match table {
                Some(table) => format!("{table}.{name}"),
                None => name.clone(),
            };
            Err(Error::compile_at(
                format!("column \"{rendered}\" does not exist"),
                *span,
            ))
        }

        Expr::Binary { left, op, right } => compile_binary(c, scope, windows, left, *op, right),

        Expr::Unary { op, operand } => {
            let operand = compile_expr(c, scope, windows, operand)?;
            match op {
                UnaryOp::Not => Ok(Node::Not(Box::new(operand))),
                UnaryOp::Neg => dispatch_call("neg", vec![operand]),
            }
        }

        Expr::Function(call) => compile_function(c, scope, windows, call),

        Expr::Method { expr, call } => {
            // `x.f(args)` is `f(x, args)`.
            let mut args = Vec::with_capacity(call.args.len() + 1);
            args.push((**expr).clone());
            args.extend(call.args.iter().cloned());
            let rewritten = FunctionCall {
                name: call.name.clone(),
                args,
                distinct: call.distinct,
                filter: call.filter.clone(),
                over: call.over.clone(),
                span: call.span,
            };
            compile_function(c, scope, windows, &rewritten)
        }

        Expr::Attribute { expr, name, span } => {
            let receiver = compile_expr(c, scope, windows, expr)?;
            attribute_access(receiver, name)?.ok_or_else(|| {
                Error::compile_at(format!("attribute \"{name}\" does not exist"), *span)
            })
        }

        Expr::Subscript { expr, index } => {
            let expr = compile_expr(c, scope, windows, expr)?;
            let index = compile_expr(c, scope, windows, index)?;
            Ok(Node::Subscript {
                expr: Box::new(expr),
                index: Box::new(index),
            })
        }

        Expr::Cast {
            expr,
            type_name,
            span,
        } => {
            let operand = compile_expr(c, scope, windows, expr)?;
            if registry().cast_type(type_name).is_none() {
                return Err(Error::compile_at(
                    format!("unknown type name: {type_name}"),
                    *span,
                ));
            }
            dispatch_call(&type_name.to_ascii_lowercase(), vec![operand])
        }

        Expr::IsNull { expr, negated } => {
            let expr = compile_expr(c, scope, windows, expr)?;
            Ok(Node::IsNull {
                expr: Box::new(expr),
                negated: *negated,
            })
        }

        Expr::In {
            expr,
            list,
            negated,
        } => {
            let needle = compile_expr(c, scope, windows, expr)?;
            let items = match list {
                InList::Exprs(exprs) => {
                    let mut nodes = Vec::with_capacity(exprs.len());
                    for item in exprs {
                        nodes.push(compile_expr(c, scope, windows, item)?);
                    }
                    InItems::List(nodes)
                }
                InList::Expr(item) => {
                    InItems::Expr(Box::new(compile_expr(c, scope, windows, item)?))
                }
                InList::Subquery(subquery) => {
                    InItems::Subquery(compile_subquery(c, scope, subquery, true)?)
                }
            };
            Ok(Node::In {
                expr: Box::new(needle),
                items,
                negated: *negated,
            })
        }

        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            // The probe compiles once; the clone shares any subquery or
            // aggregate state behind it, so both bounds see one
            // materialization.
            let probe = compile_expr(c, scope, windows, expr)?;
            let low = compile_expr(c, scope, windows, low)?;
            let high = compile_expr(c, scope, windows, high)?;
            let lower = dispatch_call(">=", vec![probe.clone(), low])?;
            let upper = dispatch_call("<=", vec![probe, high])?;
            let both = Node::And(vec![lower, upper]);
            Ok(if *negated {
                Node::Not(Box::new(both))
            } else {
                both
            })
        }

        Expr::Case {
            operand,
            when_clauses,
            else_clause,
        } => {
            let operand = match operand {
                Some(operand) => Some(Box::new(compile_expr(c, scope, windows, operand)?)),
                None => None,
            };
            let mut arms = Vec::with_capacity(when_clauses.len());
            for (when, then) in when_clauses {
                arms.push((
                    compile_expr(c, scope, windows, when)?,
                    compile_expr(c, scope, windows, then)?,
                ));
            }
            let otherwise = match else_clause {
                Some(else_clause) => Some(Box::new(compile_expr(c, scope, windows, else_clause)?)),
                None => None,
            };
            Ok(Node::Case {
                operand,
                arms,
                otherwise,
            })
        }

        Expr::Array(items) | Expr::Tuple(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for item in items {
                nodes.push(compile_expr(c, scope, windows, item)?);
            }
            Ok(Node::ListLit(nodes))
        }

        Expr::Subquery(query) => {
            let subquery = compile_subquery(c, scope, query, true)?;
            Ok(Node::ScalarSubquery(subquery))
        }

        Expr::Exists(query) => {
            let subquery = compile_subquery(c, scope, query, false)?;
            Ok(Node::Exists(subquery))
        }

        Expr::Wildcard { .. } => Err(Error::compile(
            "wildcard is only allowed in the target list and count(*)",
        )),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Real(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Null => Value::Null,
    }
}

/// Attribute access against the receiver's structure; `None` when the
/// receiver's type has no such attribute.
fn attribute_access(receiver: Node, name: &str) -> Result<Option<Node>> {
    let receiver_type = receiver.dtype();
    if let Some(attr) = types::attribute(&receiver_type, name) {
        return Ok(Some(Node::Attribute {
            expr: Box::new(receiver),
            name: name.to_string(),
            dtype: attr.dtype.clone(),
        }));
    }
    if receiver_type == DType::Object {
        // Dynamic receiver: attribute resolution happens per value.
        return Ok(Some(Node::Attribute {
            expr: Box::new(receiver),
            name: name.to_string(),
            dtype: DType::Object,
        }));
    }
    Ok(None)
}

fn compile_binary(
    c: &Compiler,
    scope: &Scope,
    windows: &mut Option<&mut PendingWindows>,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
) -> Result<Node> {
    let left = compile_expr(c, scope, windows, left)?;
    let right = compile_expr(c, scope, windows, right)?;
    match op {
        BinaryOp::And => Ok(Node::And(flatten_and(left, right))),
        BinaryOp::Or => Ok(Node::Or(flatten_or(left, right))),
        BinaryOp::Like => dispatch_call("like", vec![left, right]),
        other => dispatch_call(other.as_str(), vec![left, right]),
    }
}

fn flatten_and(left: Node, right: Node) -> Vec<Node> {
    let mut operands = match left {
        Node::And(operands) => operands,
        other => vec![other],
    };
    operands.push(right);
    operands
}

fn flatten_or(left: Node, right: Node) -> Vec<Node> {
    let mut operands = match left {
        Node::Or(operands) => operands,
        other => vec![other],
    };
    operands.push(right);
    operands
}

/// Dispatches a call through the registry, folding constants for pure
/// functions.
pub(crate) fn dispatch_call(name: &str, args: Vec<Node>) -> Result<Node> {
    let types: Vec<DType> = args.iter().map(Node::dtype).collect();
    let Some(def) = registry().function(name) else {
        return Err(Error::NotSupported(render_signature(name, &types)));
    };
    let sig = registry().resolve_function(name, &types)?;

    if def.pure && args.iter().all(Node::is_constant) {
        let values: Vec<Value> = args
            .iter()
            .map(|node| match node {
                Node::Constant(value) => value.clone(),
                _ => Value::Null,
            })
            .collect();
        let folded = if !sig.null_safe && values.iter().any(Value::is_null) {
            Value::Null
        } else {
            (sig.eval)(&values)
        };
        return Ok(Node::Constant(folded));
    }

    Ok(Node::Call(CallNode {
        name: name.to_string(),
        sig,
        args,
    }))
}

fn compile_function(
    c: &Compiler,
    scope: &Scope,
    windows: &mut Option<&mut PendingWindows>,
    call: &FunctionCall,
) -> Result<Node> {
    let name = call.name.to_ascii_lowercase();

    if let Some(def) = registry().aggregate(&name) {
        return compile_aggregate(c, scope, windows, call, &name, def);
    }

    if call.distinct {
        return Err(Error::compile_at(
            format!("DISTINCT is only allowed on aggregate functions, not {name}()"),
            call.span,
        ));
    }
    if call.filter.is_some() {
        return Err(Error::compile_at(
            format!("FILTER is only allowed on aggregate functions, not {name}()"),
            call.span,
        ));
    }
    if call.over.is_some() {
        return Err(Error::compile_at(
            format!("{name}() is not an aggregate or window function"),
            call.span,
        ));
    }

    // COALESCE and CASE share null-safe plan nodes.
    if name == "coalesce" {
        if call.args.is_empty() {
            return Err(Error::compile_at("coalesce() requires arguments", call.span));
        }
        let mut nodes = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            nodes.push(compile_expr(c, scope, windows, arg)?);
        }
        return Ok(Node::Coalesce(nodes));
    }

    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        args.push(compile_expr(c, scope, windows, arg)?);
    }
    dispatch_call(&name, args)
}

fn compile_aggregate(
    c: &Compiler,
    scope: &Scope,
    windows: &mut Option<&mut PendingWindows>,
    call: &FunctionCall,
    name: &str,
    def: &'static crate::registry::AggregateDef,
) -> Result<Node> {
    // count(*) counts rows: no argument evaluation at all.
    let star = matches!(call.args.as_slice(), [Expr::Wildcard { table: None }]);
    let arg_exprs: &[Expr] = if star { &[] } else { &call.args };

    let mut args = Vec::with_capacity(arg_exprs.len());
    for arg in arg_exprs {
        // Window attachments inside aggregate arguments have no frame to
        // run in.
        args.push(compile_expr(c, scope, &mut None, arg)?);
    }

    for arg in &args {
        let mut nested = false;
        arg.visit(&mut |node| {
            if matches!(node, Node::Aggregate(_) | Node::Window(_)) {
                nested = true;
            }
            true
        });
        if nested {
            return Err(Error::compile_at(
                "aggregate function calls cannot be nested",
                call.span,
            ));
        }
    }

    let types: Vec<DType> = args.iter().map(Node::dtype).collect();
    if !star && !def.matches(&types) {
        return Err(Error::NotSupported(render_signature(name, &types)));
    }

    let filter = match &call.filter {
        Some(predicate) => Some(compile_standalone_expr(c, scope, predicate)?),
        None => None,
    };

    let dtype = (def.ret)(&types);
    let agg = Rc::new(AggregateExpr {
        name: name.to_string(),
        def,
        args,
        star,
        distinct: call.distinct,
        filter,
        dtype,
        value: RefCell::new(Value::Null),
    });

    match &call.over {
        None => {
            if def.window_only {
                return Err(Error::compile_at(
                    format!("window function {name}() requires an OVER clause"),
                    call.span,
                ));
            }
            Ok(Node::Aggregate(agg))
        }
        Some(spec) => {
            let Some(sink) = windows.as_deref_mut() else {
                return Err(Error::compile_at(
                    "window functions are only allowed in the target list",
                    call.span,
                ));
            };
            let window = Rc::new(WindowExpr {
                agg,
                partition: RefCell::new(Vec::new()),
                order: RefCell::new(Vec::new()),
                frame: Cell::new(FramePlan {
                    mode: FrameMode::Range,
                    preceding: f64::INFINITY,
                    following: f64::INFINITY,
                    exclude: ExcludeMode::None,
                }),
                value: RefCell::new(Value::Null),
            });
            sink.push((Rc::clone(&window), spec.clone()));
            Ok(Node::Window(window))
        }
    }
}

/// Compiles a subquery used as an expression (scalar, IN list, EXISTS).
fn compile_subquery(
    c: &Compiler,
    scope: &Scope,
    query: &ast::Query,
    single_column: bool,
) -> Result<Rc<SubqueryExpr>> {
    let child = scope.child();
    let plan = query::compile_query(c, &child, query)?;
    let schema = plan.schema();
    if single_column && schema.len() != 1 {
        return Err(Error::compile(format!(
            "subquery returns {} columns, expected 1",
            schema.len()
        )));
    }
    let dtype = schema.first().map_or(DType::Object, |c| c.dtype.clone());
    let correlated = plan.correlated;
    Ok(Rc::new(SubqueryExpr::new(plan, correlated, dtype)))
}
