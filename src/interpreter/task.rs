use crate::error::RuntimeError;
use crate::graph::{BinaryOp, FlowReference, Graph, NodeId, NodeKind, UnaryOp};
use crate::host::Host;
use crate::interpreter::{Completion, JumpSignal, RunState, Suspension, TaskStatus};
use crate::trace::ExecutionEvent;
use crate::value::{Exception, Value};
use ahash::{AHashMap, AHashSet};

/// One interpreted activation of an entry point.
///
/// A task is an explicit stack of frames, one per active node. Child
/// completions are handed to the innermost frame, which either consumes
/// them (loops consume `Continue`/`Break`, entries consume `Return`) or
/// finishes its node and forwards them. Suspension points return control
/// to the caller; stepping again resumes exactly where the task left off.
pub struct Task<'g> {
    graph: &'g Graph,
    entry: NodeId,
    frames: Vec<Frame>,
    states: AHashMap<NodeId, RunState>,
    events: Vec<ExecutionEvent>,
    pending: Option<Completion>,
    result: Option<Value>,
    started: bool,
    done: bool,
    tick_loops: AHashSet<NodeId>,
}

enum Frame {
    Entry { id: NodeId },
    If { id: NodeId },
    Switch { id: NodeId },
    While { id: NodeId },
    DoWhile { id: NodeId, checked: bool },
    For {
        id: NodeId,
        variable: String,
        current: f64,
        to: f64,
        step: f64,
    },
    Foreach {
        id: NodeId,
        variable: String,
        items: std::vec::IntoIter<Value>,
    },
    Try { id: NodeId, phase: TryPhase },
    Lock { id: NodeId, key: String },
    Using { id: NodeId, handle: Value },
    NullCheck { id: NodeId },
    YieldPoint { id: NodeId, resumed: bool },
}

enum TryPhase {
    Body,
    Catch,
    Finally(Completion),
}

impl Frame {
    fn node_id(&self) -> NodeId {
        match self {
            Frame::Entry { id }
            | Frame::If { id }
            | Frame::Switch { id }
            | Frame::While { id }
            | Frame::DoWhile { id, .. }
            | Frame::For { id, .. }
            | Frame::Foreach { id, .. }
            | Frame::Try { id, .. }
            | Frame::Lock { id, .. }
            | Frame::Using { id, .. }
            | Frame::NullCheck { id }
            | Frame::YieldPoint { id, .. } => *id,
        }
    }
}

enum Control {
    Continue,
    Suspend(Suspension),
}

impl<'g> Task<'g> {
    pub(crate) fn new(graph: &'g Graph, entry: NodeId, tick_loops: AHashSet<NodeId>) -> Self {
        Self {
            graph,
            entry,
            frames: Vec::new(),
            states: AHashMap::new(),
            events: Vec::new(),
            pending: None,
            result: None,
            started: false,
            done: false,
            tick_loops,
        }
    }

    /// Advances the task until the next suspension point or completion.
    pub fn step(&mut self, host: &mut dyn Host) -> Result<TaskStatus, RuntimeError> {
        if self.done {
            return Ok(TaskStatus::Done(self.result.clone()));
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.push_node(self.entry, host) {
                self.abort(host);
                return Err(e);
            }
        }
        match self.machine(host) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.abort(host);
                Err(e)
            }
        }
    }

    /// Runs to completion, resuming every suspension immediately.
    pub fn run(&mut self, host: &mut dyn Host) -> Result<Option<Value>, RuntimeError> {
        loop {
            match self.step(host)? {
                TaskStatus::Suspended(_) => continue,
                TaskStatus::Done(value) => return Ok(value),
            }
        }
    }

    /// Stops the task. All active nodes are forced to `Failure`, scoped
    /// locks and resources are released, and no Finally body or finish
    /// continuation runs as a normal completion.
    pub fn cancel(&mut self, host: &mut dyn Host) {
        if self.done {
            return;
        }
        while let Some(frame) = self.frames.pop() {
            let id = frame.node_id();
            self.release_scoped(&frame, host);
            self.states.insert(id, RunState::Failure);
            self.events.push(ExecutionEvent::Cancelled { node: id });
        }
        self.pending = None;
        self.done = true;
    }

    /// Marks a node finished. A no-op when the node is already finished:
    /// the second call neither records an event nor re-triggers any
    /// continuation. Returns whether the node transitioned.
    pub fn finish_node(&mut self, node: NodeId) -> bool {
        self.finish_with(node, RunState::Success)
    }

    pub fn state(&self, node: NodeId) -> RunState {
        self.states
            .get(&node)
            .copied()
            .unwrap_or(RunState::NotStarted)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Values handed to the scheduler by Yield-Return nodes, in order.
    pub fn yielded_values(&self) -> Vec<Value> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Yielded { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Machine loop
    // ------------------------------------------------------------------

    fn machine(&mut self, host: &mut dyn Host) -> Result<TaskStatus, RuntimeError> {
        loop {
            if let Some(completion) = self.pending.take() {
                let Some(frame) = self.frames.pop() else {
                    return self.finalize(completion);
                };
                let id = frame.node_id();
                match self.resume_frame(frame, completion, host) {
                    Ok(Control::Continue) => continue,
                    Ok(Control::Suspend(s)) => return Ok(TaskStatus::Suspended(s)),
                    Err(e) => {
                        self.finish_with(id, RunState::Failure);
                        return Err(e);
                    }
                }
            }

            let Some(frame) = self.frames.pop() else {
                self.done = true;
                return Ok(TaskStatus::Done(self.result.clone()));
            };
            let id = frame.node_id();
            match self.advance_frame(frame, host) {
                Ok(Control::Continue) => continue,
                Ok(Control::Suspend(s)) => return Ok(TaskStatus::Suspended(s)),
                Err(e) => {
                    self.finish_with(id, RunState::Failure);
                    return Err(e);
                }
            }
        }
    }

    fn finalize(&mut self, completion: Completion) -> Result<TaskStatus, RuntimeError> {
        self.done = true;
        match completion {
            Completion::Normal => Ok(TaskStatus::Done(self.result.clone())),
            Completion::Jump(JumpSignal::Return(value)) => {
                self.result = value;
                Ok(TaskStatus::Done(self.result.clone()))
            }
            Completion::Jump(JumpSignal::Continue) => Err(RuntimeError::UnsupportedOperation {
                node: self.entry,
                message: "a 'continue' signal escaped to the flow entry with no enclosing loop"
                    .to_string(),
            }),
            Completion::Jump(JumpSignal::Break) => Err(RuntimeError::UnsupportedOperation {
                node: self.entry,
                message: "a 'break' signal escaped to the flow entry with no enclosing loop"
                    .to_string(),
            }),
            Completion::Raised { exception, origin } => Err(RuntimeError::Host {
                node: origin,
                exception,
            }),
        }
    }

    /// Engine-error unwind: every active node is failed and finished, and
    /// scoped acquisitions are released. Finally bodies do not run.
    fn abort(&mut self, host: &mut dyn Host) {
        while let Some(frame) = self.frames.pop() {
            let id = frame.node_id();
            self.release_scoped(&frame, host);
            self.finish_with(id, RunState::Failure);
        }
        self.pending = None;
        self.done = true;
    }

    fn release_scoped(&mut self, frame: &Frame, host: &mut dyn Host) {
        match frame {
            Frame::Lock { key, .. } => host.release_lock(key),
            Frame::Using { handle, .. } => host.dispose_resource(handle),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    fn kind(&self, id: NodeId) -> Result<&'g NodeKind, RuntimeError> {
        let graph: &'g Graph = self.graph;
        graph
            .node(id)
            .map(|n| &n.kind)
            .map_err(|_| RuntimeError::UnsupportedOperation {
                node: id,
                message: "node is missing from the graph arena".to_string(),
            })
    }

    /// Runs a control socket. Unassigned bodies complete immediately.
    fn push_flow(
        &mut self,
        reference: &FlowReference,
        owner: NodeId,
        socket: &'static str,
        host: &mut dyn Host,
    ) -> Result<(), RuntimeError> {
        match reference {
            FlowReference::Unassigned => {
                self.pending = Some(Completion::Normal);
                Ok(())
            }
            FlowReference::NodeOutput(id) => self.push_node(*id, host),
            FlowReference::Literal(_) | FlowReference::Member(_) => {
                Err(RuntimeError::UnsupportedOperation {
                    node: owner,
                    message: format!("flow socket '{}' does not resolve to a flow node", socket),
                })
            }
        }
    }

    /// Activates a node: double-activation guard, run-state transition,
    /// then kind-specific dispatch. Immediate kinds (signals, SetVariable,
    /// Throw) complete inline; constructs push a frame.
    fn push_node(&mut self, id: NodeId, host: &mut dyn Host) -> Result<(), RuntimeError> {
        if self.state(id) == RunState::Running {
            return Err(RuntimeError::DoubleActivation { node: id });
        }
        self.states.insert(id, RunState::Running);
        self.events.push(ExecutionEvent::Activated { node: id });
        log::trace!("activate node {}", id);

        match self.activate_kind(id, host) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.finish_with(id, RunState::Failure);
                Err(e)
            }
        }
    }

    fn activate_kind(&mut self, id: NodeId, host: &mut dyn Host) -> Result<(), RuntimeError> {
        let kind = self.kind(id)?;
        match kind {
            NodeKind::Entry { body } => {
                self.frames.push(Frame::Entry { id });
                self.push_flow(body, id, "body", host)
            }
            NodeKind::If {
                condition,
                on_true,
                on_false,
                ..
            } => {
                let taken = self.eval_bool(id, "condition", condition, host, "If condition")?;
                let branch = if taken { on_true } else { on_false };
                self.frames.push(Frame::If { id });
                self.push_flow(branch, id, if taken { "true" } else { "false" }, host)
            }
            NodeKind::Switch { target, cases, default, .. } => {
                let value = self.eval_value(id, "target", target, host)?;
                // First declared match wins; duplicate case values resolve
                // to the earliest declaration.
                let body = cases
                    .iter()
                    .find(|case| case.value == value)
                    .map(|case| &case.body)
                    .unwrap_or(default);
                self.frames.push(Frame::Switch { id });
                self.push_flow(body, id, "case", host)
            }
            NodeKind::For { from, to, step, variable, .. } => {
                let from = self.eval_number(id, "from", from, host, "For bounds")?;
                let to = self.eval_number(id, "to", to, host, "For bounds")?;
                let step = match step {
                    FlowReference::Unassigned => 1.0,
                    assigned => self.eval_number(id, "step", assigned, host, "For bounds")?,
                };
                if step == 0.0 {
                    return Err(RuntimeError::UnsupportedOperation {
                        node: id,
                        message: "For loop with a zero step never terminates".to_string(),
                    });
                }
                self.frames.push(Frame::For {
                    id,
                    variable: variable.clone(),
                    current: from,
                    to,
                    step,
                });
                Ok(())
            }
            NodeKind::Foreach { source, variable, .. } => {
                let source = self.eval_value(id, "source", source, host)?;
                match host.sequence(&source) {
                    Ok(items) => {
                        self.frames.push(Frame::Foreach {
                            id,
                            variable: variable.clone(),
                            items: items.into_iter(),
                        });
                        Ok(())
                    }
                    Err(exception) => {
                        self.finish_with(id, RunState::Failure);
                        self.pending = Some(Completion::Raised {
                            exception,
                            origin: id,
                        });
                        Ok(())
                    }
                }
            }
            NodeKind::While { .. } => {
                self.frames.push(Frame::While { id });
                Ok(())
            }
            NodeKind::DoWhile { body, .. } => {
                self.frames.push(Frame::DoWhile { id, checked: false });
                self.push_flow(body, id, "body", host)
            }
            NodeKind::Try { body, .. } => {
                self.frames.push(Frame::Try {
                    id,
                    phase: TryPhase::Body,
                });
                self.push_flow(body, id, "body", host)
            }
            NodeKind::Lock { target, body, .. } => {
                let target = self.eval_value(id, "target", target, host)?;
                let key = match target {
                    Value::Str(key) => key,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            node: id,
                            operation: "Lock target".to_string(),
                            expected: "Str",
                            found: other,
                        });
                    }
                };
                host.acquire_lock(&key);
                self.frames.push(Frame::Lock { id, key });
                self.push_flow(body, id, "body", host)
            }
            NodeKind::Using { resource, binding, body, .. } => {
                let descriptor = self.eval_value(id, "resource", resource, host)?;
                match host.open_resource(&descriptor) {
                    Ok(handle) => {
                        host.set_variable(binding, handle.clone());
                        self.events.push(ExecutionEvent::VariableSet {
                            name: binding.clone(),
                            value: handle.clone(),
                        });
                        self.frames.push(Frame::Using { id, handle });
                        self.push_flow(body, id, "body", host)
                    }
                    Err(exception) => {
                        self.finish_with(id, RunState::Failure);
                        self.pending = Some(Completion::Raised {
                            exception,
                            origin: id,
                        });
                        Ok(())
                    }
                }
            }
            NodeKind::NullCheck { value, on_null, on_value, .. } => {
                let resolved = self.eval_value(id, "value", value, host)?;
                let branch = if resolved.is_null() { on_null } else { on_value };
                self.frames.push(Frame::NullCheck { id });
                self.push_flow(branch, id, "branch", host)
            }
            NodeKind::Throw { exception_type, message } => {
                let payload = match message {
                    FlowReference::Unassigned => Value::Null,
                    assigned => self.eval_value(id, "message", assigned, host)?,
                };
                let text = match &payload {
                    Value::Str(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                let exception = Exception::new(exception_type.clone(), text).with_payload(payload);
                self.finish_with(id, RunState::Failure);
                self.pending = Some(Completion::Raised {
                    exception,
                    origin: id,
                });
                Ok(())
            }
            NodeKind::YieldReturn { .. } | NodeKind::Wait { .. } => {
                self.frames.push(Frame::YieldPoint { id, resumed: false });
                Ok(())
            }
            NodeKind::Continue => {
                self.finish_with(id, RunState::Success);
                self.pending = Some(Completion::Jump(JumpSignal::Continue));
                Ok(())
            }
            NodeKind::Break => {
                self.finish_with(id, RunState::Success);
                self.pending = Some(Completion::Jump(JumpSignal::Break));
                Ok(())
            }
            NodeKind::Return { value } => {
                let value = match value {
                    FlowReference::Unassigned => None,
                    assigned => Some(self.eval_value(id, "value", assigned, host)?),
                };
                self.finish_with(id, RunState::Success);
                self.pending = Some(Completion::Jump(JumpSignal::Return(value)));
                Ok(())
            }
            NodeKind::SetVariable { variable, value, .. } => {
                let value = self.eval_value(id, "value", value, host)?;
                host.set_variable(variable, value.clone());
                self.events.push(ExecutionEvent::VariableSet {
                    name: variable.clone(),
                    value,
                });
                self.finish_with(id, RunState::Success);
                self.continue_next(id, host)
            }
            NodeKind::Operator { .. } | NodeKind::UnaryOperator { .. } => {
                Err(RuntimeError::UnsupportedOperation {
                    node: id,
                    message: "a pure value node cannot be activated as flow".to_string(),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Frame stepping
    // ------------------------------------------------------------------

    fn advance_frame(&mut self, frame: Frame, host: &mut dyn Host) -> Result<Control, RuntimeError> {
        match frame {
            Frame::While { id } => {
                let NodeKind::While { condition, body, .. } = self.kind(id)? else {
                    return Err(self.wrong_kind(id));
                };
                if self.eval_bool(id, "condition", condition, host, "While condition")? {
                    self.frames.push(Frame::While { id });
                    self.push_flow(body, id, "body", host)?;
                } else {
                    self.complete(id, Completion::Normal, host)?;
                }
                Ok(Control::Continue)
            }
            Frame::DoWhile { id, checked } => {
                let NodeKind::DoWhile { condition, body, .. } = self.kind(id)? else {
                    return Err(self.wrong_kind(id));
                };
                // The first body run happens at activation; every later
                // advance checks the condition first.
                if !checked
                    || self.eval_bool(id, "condition", condition, host, "DoWhile condition")?
                {
                    self.frames.push(Frame::DoWhile { id, checked: true });
                    self.push_flow(body, id, "body", host)?;
                } else {
                    self.complete(id, Completion::Normal, host)?;
                }
                Ok(Control::Continue)
            }
            Frame::For {
                id,
                variable,
                current,
                to,
                step,
            } => {
                let NodeKind::For { body, .. } = self.kind(id)? else {
                    return Err(self.wrong_kind(id));
                };
                let more = if step > 0.0 { current < to } else { current > to };
                if more {
                    host.set_variable(&variable, Value::Number(current));
                    self.events.push(ExecutionEvent::VariableSet {
                        name: variable.clone(),
                        value: Value::Number(current),
                    });
                    self.frames.push(Frame::For {
                        id,
                        variable,
                        current,
                        to,
                        step,
                    });
                    self.push_flow(body, id, "body", host)?;
                } else {
                    self.complete(id, Completion::Normal, host)?;
                }
                Ok(Control::Continue)
            }
            Frame::Foreach { id, variable, mut items } => {
                let NodeKind::Foreach { body, .. } = self.kind(id)? else {
                    return Err(self.wrong_kind(id));
                };
                match items.next() {
                    Some(item) => {
                        host.set_variable(&variable, item.clone());
                        self.events.push(ExecutionEvent::VariableSet {
                            name: variable.clone(),
                            value: item,
                        });
                        self.frames.push(Frame::Foreach { id, variable, items });
                        self.push_flow(body, id, "body", host)?;
                    }
                    None => self.complete(id, Completion::Normal, host)?,
                }
                Ok(Control::Continue)
            }
            Frame::YieldPoint { id, resumed } => {
                if resumed {
                    self.events.push(ExecutionEvent::Resumed { node: id });
                    self.complete(id, Completion::Normal, host)?;
                    return Ok(Control::Continue);
                }
                let suspension = match self.kind(id)? {
                    NodeKind::YieldReturn { value, .. } => {
                        let value = match value {
                            FlowReference::Unassigned => Value::Null,
                            assigned => self.eval_value(id, "value", assigned, host)?,
                        };
                        self.events.push(ExecutionEvent::Yielded {
                            node: id,
                            value: value.clone(),
                        });
                        Suspension::Yield(value)
                    }
                    NodeKind::Wait { seconds, .. } => {
                        let seconds =
                            self.eval_number(id, "seconds", seconds, host, "Wait duration")?;
                        Suspension::Wait(seconds)
                    }
                    _ => return Err(self.wrong_kind(id)),
                };
                self.events.push(ExecutionEvent::Suspended { node: id });
                self.frames.push(Frame::YieldPoint { id, resumed: true });
                Ok(Control::Suspend(suspension))
            }
            // Frames below only ever re-enter through `resume_frame`.
            other => Err(RuntimeError::UnsupportedOperation {
                node: other.node_id(),
                message: "frame advanced without a child completion".to_string(),
            }),
        }
    }

    fn resume_frame(
        &mut self,
        frame: Frame,
        completion: Completion,
        host: &mut dyn Host,
    ) -> Result<Control, RuntimeError> {
        match frame {
            Frame::Entry { id } => {
                match completion {
                    Completion::Jump(JumpSignal::Return(value)) => {
                        if id == self.entry {
                            self.result = value;
                        }
                        self.complete(id, Completion::Normal, host)?;
                    }
                    Completion::Jump(_) => {
                        return Err(RuntimeError::UnsupportedOperation {
                            node: id,
                            message: "a loop signal escaped to the flow entry".to_string(),
                        });
                    }
                    other => self.complete(id, other, host)?,
                }
                Ok(Control::Continue)
            }
            Frame::If { id } | Frame::Switch { id } | Frame::NullCheck { id } => {
                self.complete(id, completion, host)?;
                Ok(Control::Continue)
            }
            Frame::While { id } => self.resume_loop(Frame::While { id }, completion, host),
            Frame::DoWhile { id, .. } => {
                self.resume_loop(Frame::DoWhile { id, checked: true }, completion, host)
            }
            Frame::For {
                id,
                variable,
                current,
                to,
                step,
            } => self.resume_loop(
                Frame::For {
                    id,
                    variable,
                    current: current + step,
                    to,
                    step,
                },
                completion,
                host,
            ),
            Frame::Foreach { id, variable, items } => {
                self.resume_loop(Frame::Foreach { id, variable, items }, completion, host)
            }
            Frame::Try { id, phase } => self.resume_try(id, phase, completion, host),
            Frame::Lock { id, key } => {
                host.release_lock(&key);
                self.complete(id, completion, host)?;
                Ok(Control::Continue)
            }
            Frame::Using { id, handle } => {
                host.dispose_resource(&handle);
                self.complete(id, completion, host)?;
                Ok(Control::Continue)
            }
            Frame::YieldPoint { id, .. } => Err(RuntimeError::UnsupportedOperation {
                node: id,
                message: "suspension point resumed with a child completion".to_string(),
            }),
        }
    }

    /// Shared loop-body completion handling: `Continue` and normal
    /// completion advance to the next iteration check, `Break` exits this
    /// loop only, `Return` and exceptions are forwarded.
    fn resume_loop(
        &mut self,
        next_iteration: Frame,
        completion: Completion,
        host: &mut dyn Host,
    ) -> Result<Control, RuntimeError> {
        let id = next_iteration.node_id();
        match completion {
            Completion::Normal | Completion::Jump(JumpSignal::Continue) => {
                let tick = self.tick_loops.contains(&id);
                self.frames.push(next_iteration);
                if tick {
                    // Coroutine-classified body: yield at the iteration
                    // boundary instead of busy-looping.
                    Ok(Control::Suspend(Suspension::Tick))
                } else {
                    Ok(Control::Continue)
                }
            }
            Completion::Jump(JumpSignal::Break) => {
                self.complete(id, Completion::Normal, host)?;
                Ok(Control::Continue)
            }
            other => {
                self.complete(id, other, host)?;
                Ok(Control::Continue)
            }
        }
    }

    fn resume_try(
        &mut self,
        id: NodeId,
        phase: TryPhase,
        completion: Completion,
        host: &mut dyn Host,
    ) -> Result<Control, RuntimeError> {
        match phase {
            TryPhase::Body => {
                if let Completion::Raised { exception, .. } = &completion {
                    let NodeKind::Try { catches, .. } = self.kind(id)? else {
                        return Err(self.wrong_kind(id));
                    };
                    // First declared filter whose type accepts the thrown
                    // exception wins; an unfiltered catch accepts all.
                    let matched = catches
                        .iter()
                        .find(|clause| exception.matches_filter(clause.exception_type.as_deref()));
                    if let Some(clause) = matched {
                        if let Some(binding) = &clause.binding {
                            let bound = if exception.payload.is_null() {
                                Value::Str(exception.message.clone())
                            } else {
                                exception.payload.clone()
                            };
                            host.set_variable(binding, bound.clone());
                            self.events.push(ExecutionEvent::VariableSet {
                                name: binding.clone(),
                                value: bound,
                            });
                        }
                        let body = &clause.body;
                        self.frames.push(Frame::Try {
                            id,
                            phase: TryPhase::Catch,
                        });
                        self.push_flow(body, id, "catch", host)?;
                        return Ok(Control::Continue);
                    }
                }
                self.enter_finally(id, completion, host)
            }
            TryPhase::Catch => self.enter_finally(id, completion, host),
            TryPhase::Finally(saved) => {
                // Finally ran; its own jump or exception replaces the saved
                // outcome, otherwise the saved outcome is forwarded.
                let outcome = if completion == Completion::Normal {
                    saved
                } else {
                    completion
                };
                self.complete(id, outcome, host)?;
                Ok(Control::Continue)
            }
        }
    }

    /// Finally runs on every exit path: normal, caught, jump-signal, and
    /// uncaught exceptions all pass through here before forwarding.
    fn enter_finally(
        &mut self,
        id: NodeId,
        saved: Completion,
        host: &mut dyn Host,
    ) -> Result<Control, RuntimeError> {
        let NodeKind::Try { finally, .. } = self.kind(id)? else {
            return Err(self.wrong_kind(id));
        };
        if finally.is_assigned() {
            self.frames.push(Frame::Try {
                id,
                phase: TryPhase::Finally(saved),
            });
            self.push_flow(finally, id, "finally", host)?;
        } else {
            self.complete(id, saved, host)?;
        }
        Ok(Control::Continue)
    }

    /// Finishes a node and routes its completion: normal completion runs
    /// the node's continuation, everything else is forwarded to the
    /// enclosing frame untouched.
    fn complete(
        &mut self,
        id: NodeId,
        completion: Completion,
        host: &mut dyn Host,
    ) -> Result<(), RuntimeError> {
        match completion {
            Completion::Normal => {
                self.finish_with(id, RunState::Success);
                self.continue_next(id, host)
            }
            Completion::Jump(signal) => {
                self.finish_with(id, RunState::Success);
                self.pending = Some(Completion::Jump(signal));
                Ok(())
            }
            raised @ Completion::Raised { .. } => {
                self.finish_with(id, RunState::Failure);
                self.pending = Some(raised);
                Ok(())
            }
        }
    }

    fn continue_next(&mut self, id: NodeId, host: &mut dyn Host) -> Result<(), RuntimeError> {
        match self.kind(id)?.next() {
            Some(next) if next.is_assigned() => self.push_flow(next, id, "next", host),
            _ => {
                self.pending = Some(Completion::Normal);
                Ok(())
            }
        }
    }

    fn finish_with(&mut self, id: NodeId, state: RunState) -> bool {
        match self.state(id) {
            RunState::Success | RunState::Failure => false,
            _ => {
                self.states.insert(id, state);
                self.events.push(ExecutionEvent::Finished { node: id, state });
                true
            }
        }
    }

    fn wrong_kind(&self, id: NodeId) -> RuntimeError {
        RuntimeError::UnsupportedOperation {
            node: id,
            message: "frame does not match the node's kind".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Value resolution
    // ------------------------------------------------------------------

    /// Resolves a value reference. Type errors surface here, at resolution
    /// time, not when the value is later consumed.
    fn eval_value(
        &self,
        consumer: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        host: &dyn Host,
    ) -> Result<Value, RuntimeError> {
        match reference {
            FlowReference::Unassigned => Err(RuntimeError::UnassignedInput {
                node: consumer,
                socket,
            }),
            FlowReference::Literal(value) => Ok(value.clone()),
            FlowReference::Member(path) => {
                host.get_member(path)
                    .ok_or_else(|| RuntimeError::InputNotFound {
                        node: consumer,
                        path: path.clone(),
                    })
            }
            FlowReference::NodeOutput(id) => self.node_value(*id, host),
        }
    }

    /// `get_value` for a value-producing node. Pure flow nodes fail with
    /// an unsupported-operation error.
    fn node_value(&self, id: NodeId, host: &dyn Host) -> Result<Value, RuntimeError> {
        match self.kind(id)? {
            NodeKind::Operator { op, left, right } => self.apply_binary(id, *op, left, right, host),
            NodeKind::UnaryOperator { op, operand } => {
                let operand = self.eval_value(id, "operand", operand, host)?;
                match op {
                    UnaryOp::Not => match operand {
                        Value::Bool(b) => Ok(Value::Bool(!b)),
                        found => Err(self.mismatch(id, "!", "Bool", found)),
                    },
                    UnaryOp::Negate => match operand {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        found => Err(self.mismatch(id, "-", "Number", found)),
                    },
                    UnaryOp::Abs => match operand {
                        Value::Number(n) => Ok(Value::Number(n.abs())),
                        found => Err(self.mismatch(id, "abs", "Number", found)),
                    },
                }
            }
            _ => Err(RuntimeError::UnsupportedOperation {
                node: id,
                message: "get_value is not supported on a pure flow node".to_string(),
            }),
        }
    }

    fn apply_binary(
        &self,
        id: NodeId,
        op: BinaryOp,
        left: &FlowReference,
        right: &FlowReference,
        host: &dyn Host,
    ) -> Result<Value, RuntimeError> {
        let symbol = op.symbol();
        match op {
            BinaryOp::And => {
                let l = self.operand_bool(id, "left", left, host, symbol)?;
                if !l {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.operand_bool(id, "right", right, host, symbol)?))
            }
            BinaryOp::Or => {
                let l = self.operand_bool(id, "left", left, host, symbol)?;
                if l {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.operand_bool(id, "right", right, host, symbol)?))
            }
            BinaryOp::Xor => {
                let l = self.operand_bool(id, "left", left, host, symbol)?;
                let r = self.operand_bool(id, "right", right, host, symbol)?;
                Ok(Value::Bool(l ^ r))
            }
            BinaryOp::Equal => {
                let l = self.eval_value(id, "left", left, host)?;
                let r = self.eval_value(id, "right", right, host)?;
                Ok(Value::Bool(l == r))
            }
            BinaryOp::NotEqual => {
                let l = self.eval_value(id, "left", left, host)?;
                let r = self.eval_value(id, "right", right, host)?;
                Ok(Value::Bool(l != r))
            }
            _ => {
                let l = self.operand_number(id, "left", left, host, symbol)?;
                let r = self.operand_number(id, "right", right, host, symbol)?;
                Ok(match op {
                    BinaryOp::Add => Value::Number(l + r),
                    BinaryOp::Subtract => Value::Number(l - r),
                    BinaryOp::Multiply => Value::Number(l * r),
                    BinaryOp::Divide => Value::Number(l / r),
                    BinaryOp::GreaterThan => Value::Bool(l > r),
                    BinaryOp::SmallerThan => Value::Bool(l < r),
                    BinaryOp::GreaterThanOrEqual => Value::Bool(l >= r),
                    BinaryOp::SmallerThanOrEqual => Value::Bool(l <= r),
                    // And/Or/Xor/Equal/NotEqual handled above.
                    _ => unreachable!("non-numeric operator dispatched as numeric"),
                })
            }
        }
    }

    fn operand_bool(
        &self,
        id: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        host: &dyn Host,
        operation: &str,
    ) -> Result<bool, RuntimeError> {
        match self.eval_value(id, socket, reference, host)? {
            Value::Bool(b) => Ok(b),
            found => Err(self.mismatch(id, operation, "Bool", found)),
        }
    }

    fn operand_number(
        &self,
        id: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        host: &dyn Host,
        operation: &str,
    ) -> Result<f64, RuntimeError> {
        match self.eval_value(id, socket, reference, host)? {
            Value::Number(n) => Ok(n),
            found => Err(self.mismatch(id, operation, "Number", found)),
        }
    }

    fn eval_bool(
        &self,
        consumer: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        host: &dyn Host,
        operation: &str,
    ) -> Result<bool, RuntimeError> {
        match self.eval_value(consumer, socket, reference, host)? {
            Value::Bool(b) => Ok(b),
            found => Err(self.mismatch(consumer, operation, "Bool", found)),
        }
    }

    fn eval_number(
        &self,
        consumer: NodeId,
        socket: &'static str,
        reference: &FlowReference,
        host: &dyn Host,
        operation: &str,
    ) -> Result<f64, RuntimeError> {
        match self.eval_value(consumer, socket, reference, host)? {
            Value::Number(n) => Ok(n),
            found => Err(self.mismatch(consumer, operation, "Number", found)),
        }
    }

    fn mismatch(
        &self,
        node: NodeId,
        operation: &str,
        expected: &'static str,
        found: Value,
    ) -> RuntimeError {
        RuntimeError::TypeMismatch {
            node,
            operation: operation.to_string(),
            expected,
            found,
        }
    }
}
