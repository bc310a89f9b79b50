//! Static admission control.
//!
//! Parses user code to an AST and walks every node once, consulting the
//! [`PolicyCatalog`]. The walk is a plain recursive match over the parser's
//! sum type; the first violation found is returned and nothing is executed.
//! This layer restricts what code can express; the supervisor's resource
//! caps bound what admitted code can consume.

use crate::policy::PolicyCatalog;
use rustpython_parser::{ast, Parse};

/// Functions that reach attributes by runtime-computed name. Calls to these
/// are rejected alongside the forbidden builtins.
const DYNAMIC_ATTRIBUTE_TRIO: &[&str] = &["getattr", "setattr", "delattr"];

/// Check `code` against the catalog without executing it.
///
/// Returns `Ok(())` to admit, or `Err(reason)` with the first violation
/// found. A parse failure is a rejection, not a panic. When a source
/// contains several violations, which one is reported depends on traversal
/// order and is not part of the contract.
pub fn validate_source(code: &str, catalog: &PolicyCatalog) -> Result<(), String> {
    let suite =
        ast::Suite::parse(code, "<sandbox>").map_err(|e| format!("syntax error: {e}"))?;
    check_body(&suite, catalog)
}

fn check_body(body: &[ast::Stmt], catalog: &PolicyCatalog) -> Result<(), String> {
    for stmt in body {
        check_stmt(stmt, catalog)?;
    }
    Ok(())
}

fn check_stmt(stmt: &ast::Stmt, catalog: &PolicyCatalog) -> Result<(), String> {
    match stmt {
        ast::Stmt::Import(ast::StmtImport { names, .. }) => {
            for alias in names {
                check_import_name(alias.name.as_str(), catalog)?;
            }
            Ok(())
        }
        // Imported symbols are not filtered here; they are only reachable
        // through the validated module. Relative imports (no module) are
        // admitted: a scratch script is not a package, so they fail at
        // runtime with a plain ImportError.
        ast::Stmt::ImportFrom(ast::StmtImportFrom { module, .. }) => {
            if let Some(module) = module {
                check_import_name(module.as_str(), catalog)?;
            }
            Ok(())
        }
        ast::Stmt::FunctionDef(ast::StmtFunctionDef {
            args,
            body,
            decorator_list,
            returns,
            ..
        })
        | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
            args,
            body,
            decorator_list,
            returns,
            ..
        }) => {
            check_arguments(args, catalog)?;
            check_exprs(decorator_list, catalog)?;
            check_opt_expr(returns.as_deref(), catalog)?;
            check_body(body, catalog)
        }
        ast::Stmt::ClassDef(ast::StmtClassDef {
            bases,
            keywords,
            body,
            decorator_list,
            ..
        }) => {
            check_exprs(bases, catalog)?;
            check_keywords(keywords, catalog)?;
            check_exprs(decorator_list, catalog)?;
            check_body(body, catalog)
        }
        ast::Stmt::Return(ast::StmtReturn { value, .. }) => {
            check_opt_expr(value.as_deref(), catalog)
        }
        ast::Stmt::Delete(ast::StmtDelete { targets, .. }) => check_exprs(targets, catalog),
        ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
            check_exprs(targets, catalog)?;
            check_expr(value, catalog)
        }
        ast::Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
            check_expr(target, catalog)?;
            check_expr(value, catalog)
        }
        ast::Stmt::AnnAssign(ast::StmtAnnAssign {
            target,
            annotation,
            value,
            ..
        }) => {
            check_expr(target, catalog)?;
            check_expr(annotation, catalog)?;
            check_opt_expr(value.as_deref(), catalog)
        }
        ast::Stmt::For(ast::StmtFor {
            target,
            iter,
            body,
            orelse,
            ..
        })
        | ast::Stmt::AsyncFor(ast::StmtAsyncFor {
            target,
            iter,
            body,
            orelse,
            ..
        }) => {
            check_expr(target, catalog)?;
            check_expr(iter, catalog)?;
            check_body(body, catalog)?;
            check_body(orelse, catalog)
        }
        ast::Stmt::While(ast::StmtWhile {
            test, body, orelse, ..
        }) => {
            check_expr(test, catalog)?;
            check_body(body, catalog)?;
            check_body(orelse, catalog)
        }
        ast::Stmt::If(ast::StmtIf {
            test, body, orelse, ..
        }) => {
            check_expr(test, catalog)?;
            check_body(body, catalog)?;
            check_body(orelse, catalog)
        }
        ast::Stmt::With(ast::StmtWith { items, body, .. })
        | ast::Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
            for item in items {
                check_expr(&item.context_expr, catalog)?;
                check_opt_expr(item.optional_vars.as_deref(), catalog)?;
            }
            check_body(body, catalog)
        }
        ast::Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
            check_expr(subject, catalog)?;
            for case in cases {
                check_pattern(&case.pattern, catalog)?;
                check_opt_expr(case.guard.as_deref(), catalog)?;
                check_body(&case.body, catalog)?;
            }
            Ok(())
        }
        ast::Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
            check_opt_expr(exc.as_deref(), catalog)?;
            check_opt_expr(cause.as_deref(), catalog)
        }
        ast::Stmt::Try(ast::StmtTry {
            body,
            handlers,
            orelse,
            finalbody,
            ..
        })
        | ast::Stmt::TryStar(ast::StmtTryStar {
            body,
            handlers,
            orelse,
            finalbody,
            ..
        }) => {
            check_body(body, catalog)?;
            for handler in handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                check_opt_expr(h.type_.as_deref(), catalog)?;
                check_body(&h.body, catalog)?;
            }
            check_body(orelse, catalog)?;
            check_body(finalbody, catalog)
        }
        ast::Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
            check_expr(test, catalog)?;
            check_opt_expr(msg.as_deref(), catalog)
        }
        ast::Stmt::Expr(ast::StmtExpr { value, .. }) => check_expr(value, catalog),
        _ => Ok(()),
    }
}

fn check_expr(expr: &ast::Expr, catalog: &PolicyCatalog) -> Result<(), String> {
    match expr {
        ast::Expr::Call(ast::ExprCall {
            func,
            args,
            keywords,
            ..
        }) => {
            if let ast::Expr::Name(ast::ExprName { id, .. }) = func.as_ref() {
                let name = id.as_str();
                if catalog.is_forbidden_builtin(name) || DYNAMIC_ATTRIBUTE_TRIO.contains(&name) {
                    return Err(format!("call to '{name}' is not allowed"));
                }
            }
            check_expr(func, catalog)?;
            check_exprs(args, catalog)?;
            check_keywords(keywords, catalog)
        }
        ast::Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
            if catalog.is_forbidden_attribute(attr.as_str()) {
                return Err(format!(
                    "access to attribute '{}' is not allowed",
                    attr.as_str()
                ));
            }
            check_expr(value, catalog)
        }
        ast::Expr::BoolOp(ast::ExprBoolOp { values, .. }) => check_exprs(values, catalog),
        ast::Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
            check_expr(target, catalog)?;
            check_expr(value, catalog)
        }
        ast::Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
            check_expr(left, catalog)?;
            check_expr(right, catalog)
        }
        ast::Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => check_expr(operand, catalog),
        ast::Expr::Lambda(ast::ExprLambda { args, body, .. }) => {
            check_arguments(args, catalog)?;
            check_expr(body, catalog)
        }
        ast::Expr::IfExp(ast::ExprIfExp {
            test, body, orelse, ..
        }) => {
            check_expr(test, catalog)?;
            check_expr(body, catalog)?;
            check_expr(orelse, catalog)
        }
        ast::Expr::Dict(ast::ExprDict { keys, values, .. }) => {
            for key in keys.iter().flatten() {
                check_expr(key, catalog)?;
            }
            check_exprs(values, catalog)
        }
        ast::Expr::Set(ast::ExprSet { elts, .. })
        | ast::Expr::List(ast::ExprList { elts, .. })
        | ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => check_exprs(elts, catalog),
        ast::Expr::ListComp(ast::ExprListComp {
            elt, generators, ..
        })
        | ast::Expr::SetComp(ast::ExprSetComp {
            elt, generators, ..
        })
        | ast::Expr::GeneratorExp(ast::ExprGeneratorExp {
            elt, generators, ..
        }) => {
            check_expr(elt, catalog)?;
            check_comprehensions(generators, catalog)
        }
        ast::Expr::DictComp(ast::ExprDictComp {
            key,
            value,
            generators,
            ..
        }) => {
            check_expr(key, catalog)?;
            check_expr(value, catalog)?;
            check_comprehensions(generators, catalog)
        }
        ast::Expr::Await(ast::ExprAwait { value, .. })
        | ast::Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
        | ast::Expr::Starred(ast::ExprStarred { value, .. }) => check_expr(value, catalog),
        ast::Expr::Yield(ast::ExprYield { value, .. }) => {
            check_opt_expr(value.as_deref(), catalog)
        }
        ast::Expr::Compare(ast::ExprCompare {
            left, comparators, ..
        }) => {
            check_expr(left, catalog)?;
            check_exprs(comparators, catalog)
        }
        ast::Expr::FormattedValue(ast::ExprFormattedValue {
            value, format_spec, ..
        }) => {
            check_expr(value, catalog)?;
            check_opt_expr(format_spec.as_deref(), catalog)
        }
        ast::Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => check_exprs(values, catalog),
        ast::Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
            check_expr(value, catalog)?;
            check_expr(slice, catalog)
        }
        ast::Expr::Slice(ast::ExprSlice {
            lower, upper, step, ..
        }) => {
            check_opt_expr(lower.as_deref(), catalog)?;
            check_opt_expr(upper.as_deref(), catalog)?;
            check_opt_expr(step.as_deref(), catalog)
        }
        _ => Ok(()),
    }
}

fn check_import_name(name: &str, catalog: &PolicyCatalog) -> Result<(), String> {
    let top = name.split('.').next().unwrap_or(name);
    if catalog.is_forbidden_import(top) {
        return Err(format!("import of forbidden module '{top}'"));
    }
    // Underscore-prefixed names are host-internal synthetic imports and are
    // admitted rather than false-rejected.
    if !catalog.is_permitted_import(top) && !top.starts_with('_') {
        return Err(format!("import of module '{top}' is not permitted"));
    }
    Ok(())
}

fn check_arguments(args: &ast::Arguments, catalog: &PolicyCatalog) -> Result<(), String> {
    let ast::Arguments {
        posonlyargs,
        args,
        kwonlyargs,
        ..
    } = args;
    for arg in posonlyargs.iter().chain(args).chain(kwonlyargs) {
        check_opt_expr(arg.default.as_deref(), catalog)?;
    }
    Ok(())
}

fn check_pattern(pattern: &ast::Pattern, catalog: &PolicyCatalog) -> Result<(), String> {
    match pattern {
        ast::Pattern::MatchValue(ast::PatternMatchValue { value, .. }) => {
            check_expr(value, catalog)
        }
        ast::Pattern::MatchSequence(ast::PatternMatchSequence { patterns, .. })
        | ast::Pattern::MatchOr(ast::PatternMatchOr { patterns, .. }) => {
            for p in patterns {
                check_pattern(p, catalog)?;
            }
            Ok(())
        }
        ast::Pattern::MatchMapping(ast::PatternMatchMapping { keys, patterns, .. }) => {
            check_exprs(keys, catalog)?;
            for p in patterns {
                check_pattern(p, catalog)?;
            }
            Ok(())
        }
        ast::Pattern::MatchClass(ast::PatternMatchClass {
            cls,
            patterns,
            kwd_patterns,
            ..
        }) => {
            check_expr(cls, catalog)?;
            for p in patterns.iter().chain(kwd_patterns) {
                check_pattern(p, catalog)?;
            }
            Ok(())
        }
        ast::Pattern::MatchAs(ast::PatternMatchAs { pattern, .. }) => {
            if let Some(p) = pattern {
                check_pattern(p, catalog)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_comprehensions(
    generators: &[ast::Comprehension],
    catalog: &PolicyCatalog,
) -> Result<(), String> {
    for generator in generators {
        check_expr(&generator.target, catalog)?;
        check_expr(&generator.iter, catalog)?;
        check_exprs(&generator.ifs, catalog)?;
    }
    Ok(())
}

fn check_exprs(exprs: &[ast::Expr], catalog: &PolicyCatalog) -> Result<(), String> {
    for expr in exprs {
        check_expr(expr, catalog)?;
    }
    Ok(())
}

fn check_opt_expr(expr: Option<&ast::Expr>, catalog: &PolicyCatalog) -> Result<(), String> {
    match expr {
        Some(expr) => check_expr(expr, catalog),
        None => Ok(()),
    }
}

fn check_keywords(keywords: &[ast::Keyword], catalog: &PolicyCatalog) -> Result<(), String> {
    for keyword in keywords {
        check_expr(&keyword.value, catalog)?;
    }
    Ok(())
}
