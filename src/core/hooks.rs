//! Static hook graph over the four deploy phases.
//!
//! Every extra step of a deploy is declared once in [`HOOKS`]: the phase or
//! hook it attaches to, whether it runs before, within, or after that anchor,
//! and what its failure means for the rest of the run. The table is validated
//! and flattened into an [`ExecutionPlan`] before anything touches a host;
//! nothing registers hooks at runtime.
//!
//! A phase expands to its before-hooks, its within-hooks, its own body, then
//! its after-hooks. A hook expands to the hooks anchored before it, itself,
//! then the hooks anchored after it. Siblings keep declaration order.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Setup,
    Update,
    Symlink,
    Cleanup,
}

impl Phase {
    /// Phases of a full deploy, in order.
    pub const DEPLOY: [Phase; 4] = [Phase::Setup, Phase::Update, Phase::Symlink, Phase::Cleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Update => "update",
            Phase::Symlink => "symlink",
            Phase::Cleanup => "cleanup",
        }
    }

    /// Cleanup runs after `current` has switched, so a release directory it
    /// cannot remove does not fail the deploy.
    pub fn policy(&self) -> FailurePolicy {
        match self {
            Phase::Cleanup => FailurePolicy::Continue,
            Phase::Setup | Phase::Update | Phase::Symlink => FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookId {
    InitSettings,
    SymlinkShared,
    BackupDb,
    Updatedb,
    CacheClear,
    TagPush,
    Createdb,
    TagCleanup,
}

impl HookId {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookId::InitSettings => "init-settings",
            HookId::SymlinkShared => "symlink-shared",
            HookId::BackupDb => "backup-db",
            HookId::Updatedb => "updatedb",
            HookId::CacheClear => "cache-clear",
            HookId::TagPush => "tag-push",
            HookId::Createdb => "createdb",
            HookId::TagCleanup => "tag-cleanup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Phase(Phase),
    Hook(HookId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Before,
    /// Part of the phase body, ahead of the phase's own work.
    Within,
    After,
}

/// What a failed step means for the rest of its host's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and surface the error.
    Abort,
    /// Record the failure and keep going.
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub struct HookDecl {
    pub hook: HookId,
    pub anchor: Anchor,
    pub position: Position,
    pub policy: FailurePolicy,
}

const fn decl(hook: HookId, anchor: Anchor, position: Position, policy: FailurePolicy) -> HookDecl {
    HookDecl {
        hook,
        anchor,
        position,
        policy,
    }
}

pub const HOOKS: &[HookDecl] = &[
    decl(
        HookId::InitSettings,
        Anchor::Phase(Phase::Symlink),
        Position::Before,
        FailurePolicy::Abort,
    ),
    decl(
        HookId::SymlinkShared,
        Anchor::Phase(Phase::Symlink),
        Position::Within,
        FailurePolicy::Abort,
    ),
    decl(
        HookId::BackupDb,
        Anchor::Hook(HookId::Updatedb),
        Position::Before,
        FailurePolicy::Continue,
    ),
    decl(
        HookId::Updatedb,
        Anchor::Phase(Phase::Symlink),
        Position::After,
        FailurePolicy::Continue,
    ),
    decl(
        HookId::CacheClear,
        Anchor::Phase(Phase::Symlink),
        Position::After,
        FailurePolicy::Continue,
    ),
    decl(
        HookId::TagPush,
        Anchor::Phase(Phase::Symlink),
        Position::After,
        FailurePolicy::Continue,
    ),
    decl(
        HookId::Createdb,
        Anchor::Phase(Phase::Setup),
        Position::After,
        FailurePolicy::Continue,
    ),
    decl(
        HookId::TagCleanup,
        Anchor::Phase(Phase::Cleanup),
        Position::After,
        FailurePolicy::Continue,
    ),
];

/// A unit of work in a plan: a phase body or a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Phase(Phase),
    Hook(HookId),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Phase(phase) => phase.as_str(),
            Step::Hook(hook) => hook.as_str(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Phase(_) => StepKind::Phase,
            Step::Hook(_) => StepKind::Hook,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Phase,
    Hook,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub name: &'static str,
    pub kind: StepKind,
    pub policy: FailurePolicy,
    #[serde(skip)]
    pub step: Step,
}

/// Ordered, immutable list of steps for one invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    phases: Vec<Phase>,
    steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Plan `phases` against the built-in [`HOOKS`] table.
    pub fn for_phases(phases: &[Phase]) -> Result<Self> {
        Self::compile(HOOKS, phases)
    }

    pub fn compile(decls: &[HookDecl], phases: &[Phase]) -> Result<Self> {
        validate(decls)?;

        let mut steps = Vec::new();
        for &phase in phases {
            expand(decls, Anchor::Phase(phase), &mut steps);
        }

        Ok(Self {
            phases: phases.to_vec(),
            steps,
        })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn attached(decls: &[HookDecl], anchor: Anchor, position: Position) -> impl Iterator<Item = &HookDecl> {
    decls
        .iter()
        .filter(move |d| d.anchor == anchor && d.position == position)
}

fn expand(decls: &[HookDecl], anchor: Anchor, steps: &mut Vec<PlannedStep>) {
    for before in attached(decls, anchor, Position::Before) {
        expand_hook(decls, before, steps);
    }

    if let Anchor::Phase(phase) = anchor {
        for within in attached(decls, anchor, Position::Within) {
            expand_hook(decls, within, steps);
        }
        steps.push(PlannedStep {
            name: phase.as_str(),
            kind: StepKind::Phase,
            policy: phase.policy(),
            step: Step::Phase(phase),
        });
    }

    for after in attached(decls, anchor, Position::After) {
        expand_hook(decls, after, steps);
    }
}

fn expand_hook(decls: &[HookDecl], decl: &HookDecl, steps: &mut Vec<PlannedStep>) {
    let anchor = Anchor::Hook(decl.hook);

    for before in attached(decls, anchor, Position::Before) {
        expand_hook(decls, before, steps);
    }
    steps.push(PlannedStep {
        name: decl.hook.as_str(),
        kind: StepKind::Hook,
        policy: decl.policy,
        step: Step::Hook(decl.hook),
    });
    for after in attached(decls, anchor, Position::After) {
        expand_hook(decls, after, steps);
    }
}

/// Reject tables that could not be flattened into a finite, unambiguous plan.
fn validate(decls: &[HookDecl]) -> Result<()> {
    for (idx, decl) in decls.iter().enumerate() {
        if decls[..idx].iter().any(|d| d.hook == decl.hook) {
            return Err(Error::hook_graph_invalid(format!(
                "Hook '{}' is declared more than once",
                decl.hook.as_str()
            )));
        }

        if let Anchor::Hook(target) = decl.anchor {
            if decl.position == Position::Within {
                return Err(Error::hook_graph_invalid(format!(
                    "Hook '{}' can only run within a phase, not within hook '{}'",
                    decl.hook.as_str(),
                    target.as_str()
                )));
            }
            if !decls.iter().any(|d| d.hook == target) {
                return Err(Error::hook_graph_invalid(format!(
                    "Hook '{}' is anchored to unknown hook '{}'",
                    decl.hook.as_str(),
                    target.as_str()
                )));
            }
        }
    }

    // Each hook has exactly one anchor, so any chain longer than the table loops.
    for decl in decls {
        let mut chain = vec![decl.hook];
        let mut anchor = decl.anchor;
        while let Anchor::Hook(target) = anchor {
            if chain.contains(&target) {
                let names: Vec<&str> = chain.iter().map(HookId::as_str).collect();
                return Err(Error::hook_graph_invalid(format!(
                    "Hook anchors form a cycle: {} -> {}",
                    names.join(" -> "),
                    target.as_str()
                )));
            }
            chain.push(target);
            anchor = decls
                .iter()
                .find(|d| d.hook == target)
                .map(|d| d.anchor)
                .unwrap_or(Anchor::Phase(Phase::Setup));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        assert!(validate(HOOKS).is_ok());
    }

    #[test]
    fn symlink_phase_orders_hooks_around_body() {
        let plan = ExecutionPlan::for_phases(&[Phase::Symlink]).unwrap();
        assert_eq!(
            plan.names(),
            vec![
                "init-settings",
                "symlink-shared",
                "symlink",
                "backup-db",
                "updatedb",
                "cache-clear",
                "tag-push",
            ]
        );
    }

    #[test]
    fn setup_and_cleanup_carry_their_after_hooks() {
        let plan = ExecutionPlan::for_phases(&[Phase::Setup]).unwrap();
        assert_eq!(plan.names(), vec!["setup", "createdb"]);

        let plan = ExecutionPlan::for_phases(&[Phase::Cleanup]).unwrap();
        assert_eq!(plan.names(), vec!["cleanup", "tag-cleanup"]);

        let plan = ExecutionPlan::for_phases(&[Phase::Update]).unwrap();
        assert_eq!(plan.names(), vec!["update"]);
    }

    #[test]
    fn deploy_plan_runs_every_step_once() {
        let plan = ExecutionPlan::for_phases(&Phase::DEPLOY).unwrap();
        assert_eq!(
            plan.names(),
            vec![
                "setup",
                "createdb",
                "update",
                "init-settings",
                "symlink-shared",
                "symlink",
                "backup-db",
                "updatedb",
                "cache-clear",
                "tag-push",
                "cleanup",
                "tag-cleanup",
            ]
        );
    }

    #[test]
    fn policies_follow_the_table() {
        let plan = ExecutionPlan::for_phases(&Phase::DEPLOY).unwrap();
        let abort: Vec<&str> = plan
            .steps()
            .iter()
            .filter(|s| s.policy == FailurePolicy::Abort)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            abort,
            vec!["setup", "update", "init-settings", "symlink-shared", "symlink"]
        );

        let cleanup = plan.steps().iter().find(|s| s.name == "cleanup").unwrap();
        assert_eq!(cleanup.policy, FailurePolicy::Continue);
    }

    #[test]
    fn cycle_is_rejected() {
        let decls = [
            decl(
                HookId::BackupDb,
                Anchor::Hook(HookId::Updatedb),
                Position::Before,
                FailurePolicy::Continue,
            ),
            decl(
                HookId::Updatedb,
                Anchor::Hook(HookId::BackupDb),
                Position::After,
                FailurePolicy::Continue,
            ),
        ];
        let err = ExecutionPlan::compile(&decls, &[Phase::Symlink]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::HookGraphInvalid);
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn unknown_hook_anchor_is_rejected() {
        let decls = [decl(
            HookId::BackupDb,
            Anchor::Hook(HookId::Updatedb),
            Position::Before,
            FailurePolicy::Continue,
        )];
        let err = ExecutionPlan::compile(&decls, &[Phase::Symlink]).unwrap_err();
        assert!(err.message.contains("unknown hook 'updatedb'"));
    }

    #[test]
    fn within_a_hook_is_rejected() {
        let decls = [
            decl(
                HookId::Updatedb,
                Anchor::Phase(Phase::Symlink),
                Position::After,
                FailurePolicy::Continue,
            ),
            decl(
                HookId::BackupDb,
                Anchor::Hook(HookId::Updatedb),
                Position::Within,
                FailurePolicy::Continue,
            ),
        ];
        assert!(ExecutionPlan::compile(&decls, &[Phase::Symlink]).is_err());
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let decls = [
            decl(
                HookId::TagPush,
                Anchor::Phase(Phase::Symlink),
                Position::After,
                FailurePolicy::Continue,
            ),
            decl(
                HookId::TagPush,
                Anchor::Phase(Phase::Cleanup),
                Position::After,
                FailurePolicy::Continue,
            ),
        ];
        assert!(ExecutionPlan::compile(&decls, &[Phase::Symlink]).is_err());
    }
}
