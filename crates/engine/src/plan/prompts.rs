// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for plan-owned agents.
//!
//! Only the protocol matters here: which labels the orchestrator sets, how
//! the planner structures tasks, and what a worker must do before closing
//! out. Wording beyond the protocol is intentionally plain.

use bm_core::{AgentRecord, BranchStrategy, Plan, Task, TaskId, READY_LABEL};

/// Prompt for the planner: decompose the plan into tasks under the epic,
/// then exit.
pub fn planner(plan: &Plan, epic_id: &TaskId, available_agents: &[AgentRecord]) -> String {
    let agent_list = if available_agents.is_empty() {
        "none".to_string()
    } else {
        available_agents
            .iter()
            .map(|a| format!("- {} ({})", a.name, a.directory.display()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are the planner for \"{title}\".\n\n\
         Goal:\n{description}\n\n\
         Break the goal into small, independently executable tasks using the \
         task CLI in this directory. Create each task with \
         `create --parent {epic} <title>`, and express ordering by noting \
         blocking task ids in the title where needed. Do not mark anything \
         ready; that is the orchestrator's job.\n\n\
         Configured agents for reference:\n{agents}\n\n\
         When the decomposition is complete, exit the session.",
        title = plan.title,
        description = plan.description,
        epic = epic_id,
        agents = agent_list,
    )
}

/// Prompt for the orchestrator: watch the task graph and mark tasks ready.
pub fn orchestrator(plan: &Plan, epic_id: &TaskId) -> String {
    format!(
        "You are the orchestrator for \"{title}\".\n\n\
         Tasks live in the task store in this directory, under epic {epic}. \
         A task is dispatched to a worker only when you label it `{ready}` \
         AND give it both a `repo:<name>` label naming the target repository \
         and a `worktree:<slug>` label naming a short branch slug. Mark a \
         task ready only when nothing it depends on is still open. Close \
         tasks when their workers report completion. Stay running until \
         every task is closed.",
        title = plan.title,
        epic = epic_id,
        ready = READY_LABEL,
    )
}

/// Prompt for an interactive worker bound to one task.
pub fn worker(plan: &Plan, task: &Task, branch: &str) -> String {
    let completion = match plan.branch_strategy {
        BranchStrategy::FeatureBranch => format!(
            "Commit your work to the current branch (`{branch}`). Do not push; \
             the branch is folded into the plan's feature branch on completion."
        ),
        BranchStrategy::RaisePrs => format!(
            "Commit your work to the current branch (`{branch}`), push it, and \
             open a pull request. Include the PR URL in your final message."
        ),
    };
    format!(
        "You are working on task {id}: {title}\n\n\
         Your working directory is a dedicated git worktree for this task. \
         {completion}\n\n\
         When the task is done, close it with the task CLI in the plan \
         directory (`close {id} --message <summary>`), then exit the session.",
        id = task.id,
        title = task.title,
        completion = completion,
    )
}

/// Prompt for a draft-phase discussion session on the reference repository.
pub fn discussion(plan: &Plan) -> String {
    format!(
        "Help refine the plan \"{title}\".\n\n{description}\n\n\
         Explore the repository, point out risks and open questions, and \
         propose a task breakdown. This session is discussion only — make no \
         changes. Exit when the discussion concludes.",
        title = plan.title,
        description = plan.description,
    )
}

/// Prompt passed to a headless worker container.
pub fn headless_worker(plan: &Plan, task: &Task) -> String {
    let completion = match plan.branch_strategy {
        BranchStrategy::FeatureBranch => {
            "Commit your work to the current branch; it is integrated after review."
        }
        BranchStrategy::RaisePrs => {
            "Commit, push, and open a pull request via the tool proxy; include the PR URL in a message."
        }
    };
    format!(
        "Task {id}: {title}\n\nWork in /workspace. {completion}",
        id = task.id,
        title = task.title,
        completion = completion,
    )
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
