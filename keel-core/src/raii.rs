#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use keel_ast::{
    Block, CleanupAction, CleanupStmt, CtorBody, DeferStmt, NodeId, Program, SourceFile, Span,
    Spanned, Stmt,
};
use keel_diagnostics::{codes, Diagnostics, Layer, LayerError, ScopeRef};

use crate::context::Context;
use crate::symbols::SymbolId;

/// What kind of lexical scope a tracker belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Body,
    Block,
    Then,
    Else,
    While,
    For,
}

impl ScopeKind {
    /// Bodies that may run zero or more times depending on control flow.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            ScopeKind::Then | ScopeKind::Else | ScopeKind::While | ScopeKind::For
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ScopeKind::Body => "function body",
            ScopeKind::Block => "block",
            ScopeKind::Then => "`if` body",
            ScopeKind::Else => "`else` body",
            ScopeKind::While => "`while` body",
            ScopeKind::For => "`for` body",
        }
    }
}

/// One `defer` applied to one variable: bump it to the front and attach `action`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeferEffect {
    pub var: SymbolId,
    pub span: Span,
    pub action: CleanupAction,
}

/// Destruction orders of one lexical scope.
///
/// `return_order` is what a `return` at this point must destroy, inherited
/// locals included; `scope_end_order` is what falling off the end destroys.
/// Both always hold the same variables, and the front of each runs first.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeDestructorTracker {
    pub block: NodeId,
    pub span: Span,
    pub kind: ScopeKind,
    pub is_conditional: bool,
    pub has_return: bool,
    return_order: VecDeque<SymbolId>,
    scope_end_order: VecDeque<SymbolId>,
    locals: Vec<SymbolId>,
    /// Registered cleanup steps per variable, most recent first.
    actions: HashMap<SymbolId, Vec<CleanupAction>>,
    /// Effects on ancestor variables, replayed on the parent when this scope ends.
    inherited: Vec<DeferEffect>,
}

impl ScopeDestructorTracker {
    pub fn root(block: NodeId, span: Span, kind: ScopeKind) -> Self {
        Self {
            block,
            span,
            kind,
            is_conditional: kind.is_conditional(),
            has_return: false,
            return_order: VecDeque::new(),
            scope_end_order: VecDeque::new(),
            locals: Vec::new(),
            actions: HashMap::new(),
            inherited: Vec::new(),
        }
    }

    pub fn nested(parent: &Self, block: NodeId, span: Span, kind: ScopeKind) -> Self {
        Self {
            return_order: parent.return_order.clone(),
            scope_end_order: parent.return_order.clone(),
            actions: parent.actions.clone(),
            ..Self::root(block, span, kind)
        }
    }

    pub fn declare(&mut self, var: SymbolId) {
        self.return_order.push_back(var);
        self.scope_end_order.push_back(var);
        self.locals.push(var);
    }

    pub fn is_local(&self, var: SymbolId) -> bool {
        self.locals.contains(&var)
    }

    pub fn tracks(&self, var: SymbolId) -> bool {
        self.return_order.contains(&var)
    }

    /// Move `var` to the front of both orders. A variable already at the
    /// front leaves the tracker untouched.
    pub fn bump(&mut self, var: SymbolId) {
        bump_to_front(&mut self.return_order, var);
        bump_to_front(&mut self.scope_end_order, var);
        debug_assert!(self.is_consistent());
    }

    /// Bump `effect.var` and register its action ahead of any earlier ones.
    pub fn apply(&mut self, effect: &DeferEffect) {
        self.bump(effect.var);
        self.actions
            .entry(effect.var)
            .or_default()
            .insert(0, effect.action.clone());
    }

    /// Cleanup steps for `var` in run order. A variable nothing was
    /// deferred on gets its destructor.
    pub fn actions(&self, var: SymbolId) -> Vec<CleanupAction> {
        match self.actions.get(&var) {
            Some(registered) if !registered.is_empty() => registered.clone(),
            _ => vec![CleanupAction::Destructor],
        }
    }

    pub fn return_order(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.return_order.iter().copied()
    }

    pub fn scope_end_order(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.scope_end_order.iter().copied()
    }

    /// Fall-off cleanup: this scope's own locals in `scope_end_order`.
    pub fn fall_off_order(&self) -> Vec<SymbolId> {
        self.scope_end_order
            .iter()
            .copied()
            .filter(|v| self.is_local(*v))
            .collect()
    }

    /// Both orders hold the same multiset of variables.
    pub fn is_consistent(&self) -> bool {
        let mut a: Vec<_> = self.return_order.iter().collect();
        let mut b: Vec<_> = self.scope_end_order.iter().collect();
        a.sort();
        b.sort();
        a == b
    }

    pub fn scope_ref(&self) -> ScopeRef {
        ScopeRef {
            block: self.block,
            span: self.span,
            label: self.kind.label().to_string(),
        }
    }
}

fn bump_to_front(order: &mut VecDeque<SymbolId>, var: SymbolId) {
    if order.front() == Some(&var) {
        return;
    }
    if let Some(pos) = order.iter().position(|v| *v == var) {
        order.remove(pos);
        order.push_front(var);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Return,
    FallOff,
}

/// The cleanup sequence synthesized at one exit point.
#[derive(Clone, Debug, PartialEq)]
pub struct ExitCleanup {
    pub kind: ExitKind,
    pub block: NodeId,
    pub span: Span,
    pub sequence: Vec<CleanupStmt>,
}

impl ExitCleanup {
    pub fn vars(&self) -> Vec<&str> {
        self.sequence.iter().map(|c| c.var.node.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CleanupReport {
    pub function: String,
    pub exits: Vec<ExitCleanup>,
}

impl CleanupReport {
    pub fn returns(&self) -> impl Iterator<Item = &ExitCleanup> {
        self.exits.iter().filter(|e| e.kind == ExitKind::Return)
    }
}

/// A program whose exit points carry explicit cleanup statements.
#[derive(Clone, Debug, PartialEq)]
pub struct CleanedProgram {
    pub program: Program,
    pub reports: Vec<CleanupReport>,
}

impl CleanedProgram {
    pub fn report(&self, function: &str) -> Option<&CleanupReport> {
        self.reports.iter().find(|r| r.function == function)
    }
}

/// Rewrite every function and constructor body of `program` so that each
/// exit is preceded by its cleanup sequence.
///
/// Requires a contextualized program with no blocking diagnostics; otherwise a
/// fatal diagnostic is recorded and nothing is produced.
pub fn analyze(
    program: &Program,
    ctx: &Context,
    file: &SourceFile,
    diags: &mut Diagnostics,
) -> Option<CleanedProgram> {
    let unmet = if diags.has_blocking() {
        Some("earlier passes reported blocking diagnostics")
    } else if !ctx.covers(program) {
        Some("the semantic context was not produced for this program")
    } else {
        None
    };
    if let Some(detail) = unmet {
        diags.push(
            LayerError::fatal(
                Layer::Raii,
                codes::RAII_PRECONDITION,
                "cleanup analysis requires a fully checked program",
            )
            .with_detail(detail),
        );
        return None;
    }

    let mut cleaned = program.clone();
    let mut analyzer = Analyzer::new(ctx, file);
    let mut reports = Vec::new();

    for class in &mut cleaned.classes {
        let class_name = class.name.node.clone();
        for ctor in &mut class.ctors {
            if let CtorBody::Body(body) = &mut ctor.body {
                let name = format!("{class_name}::{}", ctor.kind.describe());
                reports.push(analyzer.analyze_body(name, body));
            }
        }
    }
    for func in &mut cleaned.functions {
        reports.push(analyzer.analyze_body(func.name.node.clone(), &mut func.body));
    }

    log::debug!(
        "raii pass: {} bod(ies), {} exit point(s), {} error(s)",
        reports.len(),
        reports.iter().map(|r| r.exits.len()).sum::<usize>(),
        analyzer.errors.len()
    );
    for err in analyzer.errors {
        diags.push(err);
    }

    Some(CleanedProgram {
        program: cleaned,
        reports,
    })
}

struct Analyzer<'a> {
    ctx: &'a Context,
    file: &'a SourceFile,
    trackers: Vec<ScopeDestructorTracker>,
    exits: Vec<ExitCleanup>,
    errors: Vec<LayerError>,
}

impl<'a> Analyzer<'a> {
    fn new(ctx: &'a Context, file: &'a SourceFile) -> Self {
        Self {
            ctx,
            file,
            trackers: Vec::new(),
            exits: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn analyze_body(&mut self, function: String, body: &mut Block) -> CleanupReport {
        log::trace!("analyzing cleanup for `{function}`");
        self.process_block(body, ScopeKind::Body, None);
        CleanupReport {
            function,
            exits: std::mem::take(&mut self.exits),
        }
    }

    /// Rewrite `block` in place and return the effects its parent must replay.
    fn process_block(
        &mut self,
        block: &mut Block,
        kind: ScopeKind,
        loop_var: Option<SymbolId>,
    ) -> Vec<DeferEffect> {
        let mut tracker = match self.trackers.last() {
            Some(parent) => ScopeDestructorTracker::nested(parent, block.id, block.span, kind),
            None => ScopeDestructorTracker::root(block.id, block.span, kind),
        };
        if let Some(var) = loop_var {
            tracker.declare(var);
        }
        self.trackers.push(tracker);

        // Re-analysis regenerates cleanup instead of stacking it.
        let stmts: Vec<Stmt> = std::mem::take(&mut block.stmts)
            .into_iter()
            .filter(|s| !matches!(s, Stmt::Cleanup(_)))
            .collect();

        let mut return_follows = vec![false; stmts.len()];
        let mut seen_return = false;
        for (i, stmt) in stmts.iter().enumerate().rev() {
            return_follows[i] = seen_return;
            seen_return |= matches!(stmt, Stmt::Return(_));
        }

        let mut out = Vec::with_capacity(stmts.len());
        for (stmt, return_follows) in stmts.into_iter().zip(return_follows) {
            match stmt {
                Stmt::VarDecl(decl) => {
                    let sym = self.ctx.decl_symbols.get(&decl.id).copied();
                    if let (Some(sym), Some(tracker)) = (sym, self.trackers.last_mut()) {
                        tracker.declare(sym);
                    }
                    out.push(Stmt::VarDecl(decl));
                }
                Stmt::Defer(defer) => {
                    self.apply_defer(&defer, return_follows);
                    out.push(Stmt::Defer(defer));
                }
                Stmt::Return(ret) => {
                    for tracker in &mut self.trackers {
                        tracker.has_return = true;
                    }
                    let sequence = match self.trackers.last() {
                        Some(tracker) => {
                            let order: Vec<_> = tracker.return_order().collect();
                            self.cleanup_sequence(tracker, &order, ret.span)
                        }
                        None => Vec::new(),
                    };
                    self.record_exit(ExitKind::Return, ret.span, &sequence);
                    out.extend(sequence.into_iter().map(Stmt::Cleanup));
                    out.push(Stmt::Return(ret));
                }
                Stmt::Block(mut inner) => {
                    let effects = self.process_block(&mut inner, ScopeKind::Block, None);
                    self.replay(effects);
                    out.push(Stmt::Block(inner));
                }
                Stmt::If(mut s) => {
                    self.process_block(&mut s.then_block, ScopeKind::Then, None);
                    if let Some(else_block) = &mut s.else_block {
                        self.process_block(else_block, ScopeKind::Else, None);
                    }
                    out.push(Stmt::If(s));
                }
                Stmt::While(mut s) => {
                    self.process_block(&mut s.body, ScopeKind::While, None);
                    out.push(Stmt::While(s));
                }
                Stmt::For(mut s) => {
                    let var = self.ctx.decl_symbols.get(&s.id).copied();
                    self.process_block(&mut s.body, ScopeKind::For, var);
                    out.push(Stmt::For(s));
                }
                other => out.push(other),
            }
            debug_assert!(
                self.trackers
                    .iter()
                    .all(ScopeDestructorTracker::is_consistent)
            );
        }

        if !matches!(out.last(), Some(Stmt::Return(_))) {
            let close = closing_brace(block.span);
            let sequence = match self.trackers.last() {
                Some(tracker) => self.cleanup_sequence(tracker, &tracker.fall_off_order(), close),
                None => Vec::new(),
            };
            self.record_exit(ExitKind::FallOff, close, &sequence);
            out.extend(sequence.into_iter().map(Stmt::Cleanup));
        }
        block.stmts = out;

        match self.trackers.pop() {
            Some(tracker) if !tracker.is_conditional => tracker.inherited,
            _ => Vec::new(),
        }
    }

    fn apply_defer(&mut self, defer: &DeferStmt, return_follows: bool) {
        let Some(tracker) = self.trackers.last() else {
            return;
        };

        let mut vars: Vec<(SymbolId, Span)> = Vec::new();
        for arg in &defer.call.args {
            if arg.as_var().is_none() {
                continue;
            }
            let Some(sym) = self.ctx.resolve(arg.id) else {
                continue;
            };
            if tracker.tracks(sym) && !vars.iter().any(|(v, _)| *v == sym) {
                vars.push((sym, arg.span));
            }
        }

        let Some(&(first, _)) = vars.first() else {
            let err = LayerError::error(
                Layer::Raii,
                codes::RAII_DEFER_WITHOUT_LOCAL,
                format!(
                    "`defer {}(...)` does not name a local variable",
                    defer.call.callee.node
                ),
            )
            .at(self.file, defer.call.span)
            .with_scope(tracker.scope_ref())
            .with_suggestion("pass the variable to clean up as an argument");
            self.errors.push(err);
            return;
        };

        let first_name = self.ctx.symbols.name(first).to_string();
        // Right-to-left so the first argument ends up at the front.
        let effects: Vec<DeferEffect> = vars
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &(var, span))| DeferEffect {
                var,
                span,
                action: if i == 0 {
                    CleanupAction::Deferred(defer.call.clone())
                } else {
                    CleanupAction::ReleasedBy(first_name.clone())
                },
            })
            .collect();

        if tracker.is_conditional && !return_follows {
            let violations: Vec<LayerError> = effects
                .iter()
                .filter(|e| !tracker.is_local(e.var))
                .map(|e| rule_c_violation(self.file, self.ctx, tracker, e))
                .collect();
            if !violations.is_empty() {
                self.errors.extend(violations);
                return;
            }
        }

        let Some(tracker) = self.trackers.last_mut() else {
            return;
        };
        for effect in effects {
            log::trace!(
                "defer: `{}` to front of {}",
                self.ctx.symbols.name(effect.var),
                tracker.kind.label()
            );
            tracker.apply(&effect);
            if !tracker.is_local(effect.var) {
                tracker.inherited.push(effect);
            }
        }
    }

    /// Apply effects an unconditional child produced on variables it did not
    /// own. They were validated where the `defer` stood; a conditional parent
    /// absorbs them into its own copy, which is dropped when it ends.
    fn replay(&mut self, effects: Vec<DeferEffect>) {
        let Some(parent) = self.trackers.last_mut() else {
            return;
        };
        for effect in effects {
            parent.apply(&effect);
            if !parent.is_local(effect.var) && !parent.is_conditional {
                parent.inherited.push(effect);
            }
        }
    }

    fn cleanup_sequence(
        &self,
        tracker: &ScopeDestructorTracker,
        order: &[SymbolId],
        span: Span,
    ) -> Vec<CleanupStmt> {
        let mut sequence = Vec::with_capacity(order.len());
        for var in order {
            let Some(sym) = self.ctx.symbols.get(*var) else {
                continue;
            };
            sequence.extend(tracker.actions(*var).into_iter().map(|action| CleanupStmt {
                span,
                var: Spanned::new(span, sym.name.clone()),
                decl: sym.decl,
                action,
            }));
        }
        sequence
    }

    fn record_exit(&mut self, kind: ExitKind, span: Span, sequence: &[CleanupStmt]) {
        let Some(tracker) = self.trackers.last() else {
            return;
        };
        log::trace!(
            "{kind:?} exit of {}: [{}]",
            tracker.kind.label(),
            sequence
                .iter()
                .map(|c| c.var.node.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.exits.push(ExitCleanup {
            kind,
            block: tracker.block,
            span,
            sequence: sequence.to_vec(),
        });
    }
}

fn rule_c_violation(
    file: &SourceFile,
    ctx: &Context,
    tracker: &ScopeDestructorTracker,
    effect: &DeferEffect,
) -> LayerError {
    let name = ctx.symbols.name(effect.var);
    LayerError::error(
        Layer::Raii,
        codes::RAII_CONDITIONAL_ANCESTOR_DEFER,
        format!(
            "`defer` of `{name}` inside {} needs a `return` in the same scope",
            tracker.kind.label()
        ),
    )
    .at(file, effect.span)
    .with_scope(tracker.scope_ref())
    .with_detail(format!(
        "`{name}` is declared in an enclosing scope, so reordering its cleanup here would only apply on some paths"
    ))
    .with_suggestion(format!(
        "add `return;` after the `defer`, or move it next to the declaration of `{name}`"
    ))
}

/// One-byte span on the `}` that closes `block`.
fn closing_brace(block: Span) -> Span {
    let end = block.offset() + block.len();
    keel_ast::span(end.saturating_sub(1), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ScopeDestructorTracker {
        let mut t = ScopeDestructorTracker::root(NodeId(0), keel_ast::span(0, 1), ScopeKind::Body);
        for i in 0..3 {
            t.declare(SymbolId(i));
        }
        t
    }

    #[test]
    fn bump_moves_to_front_of_both_orders() {
        let mut t = tracker();
        t.bump(SymbolId(2));
        let ret: Vec<_> = t.return_order().collect();
        let end: Vec<_> = t.scope_end_order().collect();
        assert_eq!(ret, vec![SymbolId(2), SymbolId(0), SymbolId(1)]);
        assert_eq!(ret, end);
        assert!(t.is_consistent());
    }

    #[test]
    fn bump_of_front_variable_is_a_no_op() {
        let mut t = tracker();
        t.bump(SymbolId(1));
        let before = t.clone();
        t.bump(SymbolId(1));
        assert_eq!(t, before);
    }

    #[test]
    fn nested_tracker_inherits_return_order_but_owns_no_locals() {
        let mut parent = tracker();
        parent.bump(SymbolId(1));
        let mut child =
            ScopeDestructorTracker::nested(&parent, NodeId(1), keel_ast::span(0, 1), ScopeKind::Then);
        assert!(child.is_conditional);
        child.declare(SymbolId(9));
        let ret: Vec<_> = child.return_order().collect();
        assert_eq!(ret, vec![SymbolId(1), SymbolId(0), SymbolId(2), SymbolId(9)]);
        assert_eq!(child.fall_off_order(), vec![SymbolId(9)]);
        assert!(child.tracks(SymbolId(0)) && !child.is_local(SymbolId(0)));
    }

    #[test]
    fn unregistered_variables_get_their_destructor() {
        let mut t = tracker();
        t.apply(&DeferEffect {
            var: SymbolId(0),
            span: keel_ast::span(0, 1),
            action: CleanupAction::ReleasedBy("a".to_string()),
        });
        assert_eq!(
            t.actions(SymbolId(0)),
            vec![CleanupAction::ReleasedBy("a".to_string())]
        );
        assert_eq!(t.actions(SymbolId(1)), vec![CleanupAction::Destructor]);
    }

    #[test]
    fn later_registrations_run_first() {
        let mut t = tracker();
        for owner in ["first", "second"] {
            t.apply(&DeferEffect {
                var: SymbolId(1),
                span: keel_ast::span(0, 1),
                action: CleanupAction::ReleasedBy(owner.to_string()),
            });
        }
        assert_eq!(
            t.actions(SymbolId(1)),
            vec![
                CleanupAction::ReleasedBy("second".to_string()),
                CleanupAction::ReleasedBy("first".to_string()),
            ]
        );
        let ret: Vec<_> = t.return_order().collect();
        assert_eq!(ret, vec![SymbolId(1), SymbolId(0), SymbolId(2)]);
    }

    #[test]
    fn closing_brace_is_last_byte() {
        let s = closing_brace(keel_ast::span(10, 5));
        assert_eq!((s.offset(), s.len()), (14, 1));
    }
}
