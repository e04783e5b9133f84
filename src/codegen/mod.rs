//! The code-generator backend.
//!
//! Walks the graph once, ahead of runtime, and emits equivalent procedural
//! source text in the host's imperative language (C#-flavored). Construct
//! semantics are identical to the interpreter's: jump signals become native
//! `continue`/`break`/`return` keywords, scoped acquisition becomes
//! `lock`/`using` blocks, and coroutine-classified entries become
//! suspendable routines.
//!
//! The generator fails fast: an unassigned required reference or a literal
//! type mismatch aborts the whole pass, and no partial source text is ever
//! returned.

use crate::classify::CoroutineClassifier;
use crate::error::CodegenError;
use crate::graph::{FlowReference, Graph, Node, NodeId, NodeKind, UnaryOp};
use crate::value::Value;
use itertools::Itertools;

mod artifact;
mod context;

pub use artifact::{GeneratedSource, VariableBinding};

use context::{CompilationContext, sanitize_identifier};

pub struct CodeGenerator<'g> {
    graph: &'g Graph,
}

impl<'g> CodeGenerator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Generates the routine for one entry node.
    pub fn generate(&self, entry: NodeId) -> Result<GeneratedSource, CodegenError> {
        let node = self.node(entry)?;
        let mut classifier = CoroutineClassifier::new(self.graph);
        let suspendable = classifier.requires_suspension(entry).map_err(|e| {
            CodegenError::UnsupportedNode {
                node: entry,
                message: e.to_string(),
            }
        })?;

        let routine = sanitize_identifier(&node.name);
        log::info!(
            "Generating {} routine '{}' for entry node {}",
            if suspendable { "suspendable" } else { "plain" },
            routine,
            entry
        );

        let mut ctx = CompilationContext::new(suspendable);
        let signature = if suspendable {
            format!("System.Collections.IEnumerator {}()", routine)
        } else if self.returns_value(entry)? {
            format!("object {}()", routine)
        } else {
            format!("void {}()", routine)
        };

        ctx.open(signature);
        match &node.kind {
            NodeKind::Entry { body } => self.emit_flow(entry, "body", body, &mut ctx)?,
            _ => self.emit_chain(entry, &mut ctx)?,
        }
        ctx.close();

        if suspendable {
            ctx.helpers.push(format!(
                "void Run{0}()\n{{\n    owner.StartCoroutine({0}());\n}}",
                routine
            ));
        }

        let (source, variables, helpers) = ctx.into_parts();
        log::debug!("--- Generated source for '{}' ---\n{}", routine, source);

        #[cfg(feature = "debug-tools")]
        self.write_debug_file(&format!("tmp/routine_{}.cs", routine), &source)?;

        Ok(GeneratedSource {
            routine,
            suspendable,
            source,
            variables,
            helpers,
        })
    }

    // ------------------------------------------------------------------
    // Statement emission
    // ------------------------------------------------------------------

    /// Emits a nested body. Unassigned bodies emit nothing.
    fn emit_flow(
        &self,
        owner: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        ctx: &mut CompilationContext,
    ) -> Result<(), CodegenError> {
        match reference {
            FlowReference::Unassigned => Ok(()),
            FlowReference::NodeOutput(id) => self.emit_chain(*id, ctx),
            FlowReference::Literal(_) | FlowReference::Member(_) => {
                Err(CodegenError::UnsupportedNode {
                    node: owner,
                    message: format!("flow socket '{}' does not resolve to a flow node", socket),
                })
            }
        }
    }

    /// Emits a statement and follows its continuation chain. Branch bodies
    /// converge here: the continuation is emitted once, after the
    /// construct's blocks.
    fn emit_chain(&self, start: NodeId, ctx: &mut CompilationContext) -> Result<(), CodegenError> {
        let mut current = start;
        loop {
            self.emit_statement(current, ctx)?;
            match self.node(current)?.kind.next() {
                Some(FlowReference::NodeOutput(id)) => current = *id,
                Some(FlowReference::Unassigned) | None => return Ok(()),
                Some(_) => {
                    return Err(CodegenError::UnsupportedNode {
                        node: current,
                        message: "continuation does not resolve to a flow node".to_string(),
                    });
                }
            }
        }
    }

    fn emit_statement(&self, id: NodeId, ctx: &mut CompilationContext) -> Result<(), CodegenError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::If {
                condition,
                on_true,
                on_false,
                ..
            } => {
                let condition = self.expression_typed(id, "condition", condition, ctx, Some("Bool"))?;
                ctx.open(format!("if ({})", condition));
                self.emit_flow(id, "true", on_true, ctx)?;
                ctx.close();
                if on_false.is_assigned() {
                    ctx.open("else");
                    self.emit_flow(id, "false", on_false, ctx)?;
                    ctx.close();
                }
                Ok(())
            }
            NodeKind::Switch {
                target,
                cases,
                default,
                ..
            } => {
                let target = self.expression(id, "target", target, ctx)?;
                if cases.is_empty() {
                    return self.emit_flow(id, "default", default, ctx);
                }
                // The scrutinee is evaluated once; cases are compared in
                // declaration order, so an earlier duplicate always wins,
                // exactly as under interpretation.
                let scrutinee = ctx.alloc_name("sw");
                ctx.register_variable(id, &scrutinee);
                ctx.line(format!("var {} = {};", scrutinee, target));
                for (index, case) in cases.iter().enumerate() {
                    let keyword = if index == 0 { "if" } else { "else if" };
                    ctx.open(format!(
                        "{} ({} == {})",
                        keyword,
                        scrutinee,
                        literal_text(&case.value)
                    ));
                    self.emit_flow(id, "case", &case.body, ctx)?;
                    ctx.close();
                }
                if default.is_assigned() {
                    ctx.open("else");
                    self.emit_flow(id, "default", default, ctx)?;
                    ctx.close();
                }
                Ok(())
            }
            NodeKind::For {
                variable,
                from,
                to,
                step,
                body,
                ..
            } => {
                let from = self.expression_typed(id, "from", from, ctx, Some("Number"))?;
                let to = self.expression_typed(id, "to", to, ctx, Some("Number"))?;
                let (step_text, descending) = match step {
                    FlowReference::Unassigned => ("1".to_string(), false),
                    assigned => {
                        let descending = matches!(
                            assigned,
                            FlowReference::Literal(Value::Number(n)) if *n < 0.0
                        );
                        (
                            self.expression_typed(id, "step", assigned, ctx, Some("Number"))?,
                            descending,
                        )
                    }
                };
                let variable = sanitize_identifier(variable);
                ctx.register_variable(id, &variable);
                let comparison = if descending { ">" } else { "<" };
                ctx.open(format!(
                    "for (var {v} = {from}; {v} {cmp} {to}; {v} += {step})",
                    v = variable,
                    from = from,
                    cmp = comparison,
                    to = to,
                    step = step_text
                ));
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                Ok(())
            }
            NodeKind::Foreach {
                variable,
                source,
                body,
                ..
            } => {
                let source = self.expression(id, "source", source, ctx)?;
                let variable = sanitize_identifier(variable);
                ctx.register_variable(id, &variable);
                ctx.open(format!("foreach (var {} in {})", variable, source));
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                Ok(())
            }
            NodeKind::While {
                condition, body, ..
            } => {
                let condition = self.expression_typed(id, "condition", condition, ctx, Some("Bool"))?;
                ctx.open(format!("while ({})", condition));
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                Ok(())
            }
            NodeKind::DoWhile {
                condition, body, ..
            } => {
                let condition = self.expression_typed(id, "condition", condition, ctx, Some("Bool"))?;
                ctx.open("do");
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close_with(format!("}} while ({});", condition));
                Ok(())
            }
            NodeKind::Try {
                body,
                catches,
                finally,
                ..
            } => {
                ctx.open("try");
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                for clause in catches {
                    match &clause.exception_type {
                        Some(exception_type) => {
                            let binding = clause
                                .binding
                                .as_deref()
                                .map(sanitize_identifier)
                                .unwrap_or_else(|| ctx.alloc_name("ex"));
                            ctx.open(format!(
                                "catch ({} {})",
                                sanitize_identifier(exception_type),
                                binding
                            ));
                        }
                        None => ctx.open("catch"),
                    }
                    self.emit_flow(id, "catch", &clause.body, ctx)?;
                    ctx.close();
                }
                if finally.is_assigned() {
                    ctx.open("finally");
                    self.emit_flow(id, "finally", finally, ctx)?;
                    ctx.close();
                }
                Ok(())
            }
            NodeKind::Lock { target, body, .. } => {
                let target = self.expression(id, "target", target, ctx)?;
                ctx.open(format!("lock ({})", target));
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                Ok(())
            }
            NodeKind::Using {
                binding,
                resource,
                body,
                ..
            } => {
                let resource = self.expression(id, "resource", resource, ctx)?;
                let binding = sanitize_identifier(binding);
                ctx.register_variable(id, &binding);
                ctx.open(format!("using (var {} = {})", binding, resource));
                self.emit_flow(id, "body", body, ctx)?;
                ctx.close();
                Ok(())
            }
            NodeKind::NullCheck {
                value,
                on_null,
                on_value,
                ..
            } => {
                let value = self.expression(id, "value", value, ctx)?;
                ctx.open(format!("if ({} == null)", value));
                self.emit_flow(id, "null", on_null, ctx)?;
                ctx.close();
                if on_value.is_assigned() {
                    ctx.open("else");
                    self.emit_flow(id, "notNull", on_value, ctx)?;
                    ctx.close();
                }
                Ok(())
            }
            NodeKind::Throw {
                exception_type,
                message,
            } => {
                let exception_type = sanitize_identifier(exception_type);
                match message {
                    FlowReference::Unassigned => {
                        ctx.line(format!("throw new {}();", exception_type))
                    }
                    assigned => {
                        let message = self.expression(id, "message", assigned, ctx)?;
                        ctx.line(format!("throw new {}({});", exception_type, message));
                    }
                }
                Ok(())
            }
            NodeKind::YieldReturn { value, .. } => {
                let value = match value {
                    FlowReference::Unassigned => "null".to_string(),
                    assigned => self.expression(id, "value", assigned, ctx)?,
                };
                ctx.line(format!("yield return {};", value));
                Ok(())
            }
            NodeKind::Wait { seconds, .. } => {
                let seconds = self.expression_typed(id, "seconds", seconds, ctx, Some("Number"))?;
                ctx.line(format!("yield return new WaitForSeconds({});", seconds));
                Ok(())
            }
            NodeKind::Continue => {
                ctx.line("continue;");
                Ok(())
            }
            NodeKind::Break => {
                ctx.line("break;");
                Ok(())
            }
            NodeKind::Return { value } => {
                // Suspendable routines cannot return a value in the host
                // language; the interpreter still surfaces it as the task
                // result.
                if ctx.suspendable {
                    ctx.line("yield break;");
                } else {
                    match value {
                        FlowReference::Unassigned => ctx.line("return;"),
                        assigned => {
                            let value = self.expression(id, "value", assigned, ctx)?;
                            ctx.line(format!("return {};", value));
                        }
                    }
                }
                Ok(())
            }
            NodeKind::SetVariable {
                variable, value, ..
            } => {
                let value = self.expression(id, "value", value, ctx)?;
                let variable = sanitize_identifier(variable);
                ctx.register_variable(id, &variable);
                ctx.line(format!("{} = {};", variable, value));
                Ok(())
            }
            NodeKind::Entry { .. } => Err(CodegenError::UnsupportedNode {
                node: id,
                message: "an Entry node cannot appear inside a statement chain".to_string(),
            }),
            NodeKind::Operator { .. } | NodeKind::UnaryOperator { .. } => {
                Err(CodegenError::UnsupportedNode {
                    node: id,
                    message: "a pure value node cannot be emitted as a statement".to_string(),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression emission
    // ------------------------------------------------------------------

    fn expression(
        &self,
        consumer: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        ctx: &mut CompilationContext,
    ) -> Result<String, CodegenError> {
        match reference {
            FlowReference::Unassigned => Err(CodegenError::UnassignedInput {
                node: consumer,
                socket,
            }),
            FlowReference::Literal(value) => Ok(literal_text(value)),
            FlowReference::Member(path) => Ok(sanitize_identifier(path)),
            FlowReference::NodeOutput(id) => {
                if let Some(text) = ctx.memoized(*id) {
                    return Ok(text.clone());
                }
                let text = self.node_expression(*id, ctx)?;
                ctx.memoize(*id, text.clone());
                Ok(text)
            }
        }
    }

    /// Like [`expression`], but rejects literals of the wrong type before
    /// any text is emitted.
    fn expression_typed(
        &self,
        consumer: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        ctx: &mut CompilationContext,
        expected: Option<&'static str>,
    ) -> Result<String, CodegenError> {
        if let (Some(expected), FlowReference::Literal(value)) = (expected, reference) {
            if value.type_name() != expected {
                return Err(CodegenError::TypeMismatch {
                    node: consumer,
                    message: format!(
                        "socket '{}' expects {}, but found literal '{}'",
                        socket, expected, value
                    ),
                });
            }
        }
        self.expression(consumer, socket, reference, ctx)
    }

    fn node_expression(
        &self,
        id: NodeId,
        ctx: &mut CompilationContext,
    ) -> Result<String, CodegenError> {
        match &self.node(id)?.kind {
            NodeKind::Operator { op, left, right } => {
                let left = self.expression(id, "left", left, ctx)?;
                let right = self.expression(id, "right", right, ctx)?;
                Ok(format!("({} {} {})", left, op.symbol(), right))
            }
            NodeKind::UnaryOperator { op, operand } => {
                let operand = self.expression(id, "operand", operand, ctx)?;
                Ok(match op {
                    UnaryOp::Not => format!("(!{})", operand),
                    UnaryOp::Negate => format!("(-{})", operand),
                    UnaryOp::Abs => format!("System.Math.Abs({})", operand),
                })
            }
            _ => Err(CodegenError::UnsupportedNode {
                node: id,
                message: "expression references a pure flow node".to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn node(&self, id: NodeId) -> Result<&'g Node, CodegenError> {
        let graph: &'g Graph = self.graph;
        graph.node(id).map_err(|_| CodegenError::UnsupportedNode {
            node: id,
            message: "node is missing from the graph arena".to_string(),
        })
    }

    /// Whether any reachable Return carries a value, which decides the
    /// routine's return type.
    fn returns_value(&self, entry: NodeId) -> Result<bool, CodegenError> {
        let mut seen = ahash::AHashSet::new();
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let kind = &self.node(id)?.kind;
            if let NodeKind::Return { value } = kind {
                if value.is_assigned() {
                    return Ok(true);
                }
            }
            for flow in kind.nested_flows() {
                if let FlowReference::NodeOutput(child) = flow {
                    stack.push(*child);
                }
            }
        }
        Ok(false)
    }

    #[cfg(feature = "debug-tools")]
    fn write_debug_file(&self, path: &str, content: &str) -> Result<(), CodegenError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CodegenError::Artifact(format!("Failed to create debug directory: {}", e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| CodegenError::Artifact(format!("Failed to write debug file: {}", e)))
    }
}

fn literal_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Value::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::List(items) => format!(
            "new object[] {{ {} }}",
            items.iter().map(literal_text).join(", ")
        ),
    }
}
