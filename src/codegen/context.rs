use crate::codegen::artifact::VariableBinding;
use crate::graph::NodeId;
use ahash::{AHashMap, AHashSet};

/// The accumulator for one code-generation pass.
///
/// Owns the emitted statement buffer, the variable-name allocator, and the
/// memo table mapping nodes to their already-generated expressions. Created
/// at pass start, consumed into the artifact at pass end; nothing survives
/// between passes.
pub(super) struct CompilationContext {
    lines: Vec<String>,
    indent: usize,
    pub(super) suspendable: bool,
    expressions: AHashMap<NodeId, String>,
    name_counts: AHashMap<String, u32>,
    variables: Vec<VariableBinding>,
    named: AHashSet<String>,
    pub(super) helpers: Vec<String>,
}

impl CompilationContext {
    pub(super) fn new(suspendable: bool) -> Self {
        Self {
            lines: Vec::new(),
            indent: 0,
            suspendable,
            expressions: AHashMap::new(),
            name_counts: AHashMap::new(),
            variables: Vec::new(),
            named: AHashSet::new(),
            helpers: Vec::new(),
        }
    }

    pub(super) fn line(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.lines
            .push(format!("{}{}", "    ".repeat(self.indent), text));
    }

    pub(super) fn open(&mut self, header: impl Into<String>) {
        self.line(format!("{} {{", header.into()));
        self.indent += 1;
    }

    pub(super) fn close(&mut self) {
        self.close_with("}");
    }

    pub(super) fn close_with(&mut self, footer: impl Into<String>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(footer);
    }

    /// Allocates a fresh identifier from a stem, keeping names unique
    /// within the pass.
    pub(super) fn alloc_name(&mut self, stem: &str) -> String {
        let stem = sanitize_identifier(stem);
        let count = self.name_counts.entry(stem.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            stem
        } else {
            format!("{}{}", stem, count)
        }
    }

    /// The expression already generated for a node's output, if any.
    pub(super) fn memoized(&self, node: NodeId) -> Option<&String> {
        self.expressions.get(&node)
    }

    /// Memoizes a node's generated expression so later references reuse it
    /// instead of re-walking the subgraph.
    pub(super) fn memoize(&mut self, node: NodeId, text: String) {
        self.expressions.insert(node, text);
    }

    /// Records a variable declared by the generated code (SetVariable
    /// targets, loop variables, scrutinee locals) exactly once.
    pub(super) fn register_variable(&mut self, node: NodeId, name: &str) {
        if self.named.insert(name.to_string()) {
            self.variables.push(VariableBinding {
                node,
                name: name.to_string(),
            });
        }
    }

    pub(super) fn into_parts(self) -> (String, Vec<VariableBinding>, Vec<String>) {
        (self.lines.join("\n"), self.variables, self.helpers)
    }
}

/// Clamps arbitrary node/member names into host-language identifiers.
pub(super) fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('v');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
