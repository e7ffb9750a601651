// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the daemon control socket.
//!
//! Each connection is served by its own task. A connection either issues
//! request/response frames in a loop, or sends `Subscribe` once and becomes
//! a one-way notification stream.

use crate::event_bus::EventBus;
use crate::protocol::{self, Request, Response};
use bm_engine::repos::RepoPatch;
use bm_engine::{CreatePlan, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Idle limit for the first frame on a connection.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ListenCtx {
    pub runtime: Arc<Runtime>,
    pub event_bus: EventBus,
    pub shutdown: Arc<Notify>,
}

pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Accept until the socket is closed, one task per connection.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            match e {
                                protocol::ProtocolError::ConnectionClosed => {
                                    debug!("client disconnected")
                                }
                                protocol::ProtocolError::Timeout => warn!("connection timed out"),
                                other => error!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }
}

async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), protocol::ProtocolError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut first = true;
    loop {
        let request: Request = if first {
            protocol::read_message_timeout(&mut reader, FIRST_FRAME_TIMEOUT).await?
        } else {
            protocol::read_message(&mut reader).await?
        };
        first = false;

        match request {
            Request::Subscribe => {
                // Subscribe before acknowledging, so nothing emitted after
                // the client sees Ok can be missed.
                let rx = ctx.event_bus.subscribe();
                protocol::write_message(&mut writer, &Response::Ok).await?;
                return stream_events(writer, rx).await;
            }
            Request::Shutdown => {
                protocol::write_message(&mut writer, &Response::Ok).await?;
                ctx.shutdown.notify_one();
                return Ok(());
            }
            request => {
                let response = dispatch(&ctx.runtime, request).await;
                protocol::write_message(&mut writer, &response).await?;
            }
        }
    }
}

/// Forward bus events until the subscriber goes away.
async fn stream_events<W>(
    mut writer: W,
    mut rx: tokio::sync::broadcast::Receiver<bm_core::Event>,
) -> Result<(), protocol::ProtocolError>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        match rx.recv().await {
            Ok(event) => {
                protocol::write_message(&mut writer, &Response::Notification { event }).await?;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged, frames dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

macro_rules! reply {
    ($result:expr, $map:expr) => {
        match $result {
            Ok(value) => $map(value),
            Err(ref e) => protocol::error_response(e),
        }
    };
}

pub(crate) async fn dispatch(runtime: &Arc<Runtime>, request: Request) -> Response {
    match request {
        // Subscribe/Shutdown handled at the connection layer.
        Request::Subscribe | Request::Shutdown => Response::Ok,
        Request::Ping => Response::Ok,

        // -- workspaces --
        Request::ListAgents => Response::Agents { agents: runtime.list_agents() },
        Request::SaveAgent { agent } => Response::Agent { agent: runtime.save_agent(agent) },
        Request::DeleteAgent { agent_id } => {
            reply!(runtime.delete_agent(&agent_id), |_| Response::Ok)
        }

        // -- terminals --
        Request::CreateTerminal { agent_id, initial_prompt, extra_dirs } => {
            reply!(
                runtime.create_terminal(&agent_id, initial_prompt, extra_dirs).await,
                |terminal_id| Response::Terminal { terminal_id }
            )
        }
        Request::WriteTerminal { terminal_id, data } => {
            runtime.write_terminal(&terminal_id, data.as_bytes());
            Response::Ok
        }
        Request::ResizeTerminal { terminal_id, cols, rows } => {
            runtime.resize_terminal(&terminal_id, cols, rows);
            Response::Ok
        }
        Request::CloseTerminal { terminal_id } => {
            runtime.close_terminal(&terminal_id);
            Response::Ok
        }

        // -- state --
        Request::GetState => Response::State { snapshot: runtime.get_state() },
        Request::SetFocused { agent_id } => {
            reply!(runtime.state.set_focused(agent_id), |_| Response::Ok)
        }
        Request::StopAgent { agent_id } => {
            runtime.stop_agent(&agent_id);
            Response::Ok
        }

        // -- tabs --
        Request::CreateTab { name } => Response::Tab { tab: runtime.state.create_tab(&name) },
        Request::RenameTab { tab_id, name } => {
            reply!(runtime.state.rename_tab(&tab_id, &name), |_| Response::Ok)
        }
        Request::DeleteTab { tab_id } => {
            match runtime.state.delete_tab(&tab_id) {
                Ok(agent_ids) => {
                    // The tab's agents are the caller's to shut down, but
                    // their execution stops with the tab.
                    for agent_id in &agent_ids {
                        runtime.stop_agent(agent_id);
                    }
                    Response::TabDeleted { agent_ids }
                }
                Err(ref e) => protocol::error_response(e),
            }
        }
        Request::SetActiveTab { tab_id } => {
            reply!(runtime.state.set_active_tab(&tab_id), |_| Response::Ok)
        }
        Request::ReorderInTab { tab_id, agent_id, position } => {
            reply!(
                runtime.state.reorder_in_tab(&tab_id, &agent_id, position),
                |_| Response::Ok
            )
        }
        Request::MoveAgentToTab { agent_id, tab_id, position } => {
            reply!(
                runtime.state.move_agent_to_tab(&agent_id, &tab_id, position),
                |_| Response::Ok
            )
        }

        // -- attention --
        Request::GetAttentionQueue => {
            Response::AttentionQueue { queue: runtime.state.attention_queue() }
        }
        Request::AcknowledgeAttention { agent_id } => {
            runtime.acknowledge_attention(&agent_id);
            Response::Ok
        }

        // -- preferences --
        Request::GetPreferences => {
            Response::Preferences { preferences: runtime.get_preferences() }
        }
        Request::SetPreferences { preferences } => {
            Response::Preferences { preferences: runtime.set_preferences(preferences) }
        }

        // -- plans --
        Request::CreatePlan {
            title,
            description,
            reference_agent_id,
            max_parallel_agents,
            branch_strategy,
            dispatch_mode,
            base_branch,
        } => Response::Plan {
            plan: runtime.plans.create_plan(CreatePlan {
                title,
                description,
                reference_agent_id,
                max_parallel_agents,
                branch_strategy,
                dispatch_mode,
                base_branch,
            }),
        },
        Request::ListPlans => Response::Plans { plans: runtime.plans.list_plans() },
        Request::ExecutePlan { plan_id, reference_agent_id } => {
            reply!(
                runtime.plans.execute_plan(&plan_id, &reference_agent_id).await,
                |plan| Response::Plan { plan }
            )
        }
        Request::StartDiscussion { plan_id, reference_agent_id } => {
            reply!(
                runtime.plans.start_discussion(&plan_id, &reference_agent_id).await,
                |plan| Response::Plan { plan }
            )
        }
        Request::CancelDiscussion { plan_id } => {
            reply!(runtime.plans.cancel_discussion(&plan_id), |plan| Response::Plan { plan })
        }
        Request::CancelPlan { plan_id } => {
            reply!(runtime.plans.cancel_plan(&plan_id), |plan| Response::Plan { plan })
        }
        Request::RestartPlan { plan_id } => {
            reply!(runtime.plans.restart_plan(&plan_id).await, |plan| Response::Plan { plan })
        }
        Request::CompletePlan { plan_id } => {
            reply!(runtime.plans.complete_plan(&plan_id).await, |plan| Response::Plan { plan })
        }
        Request::DeletePlan { plan_id } => {
            reply!(runtime.plans.delete_plan(&plan_id), |_| Response::Ok)
        }
        Request::DeletePlans { plan_ids } => {
            Response::PlanIds { plan_ids: runtime.plans.delete_plans(&plan_ids) }
        }
        Request::ClonePlan { plan_id } => {
            reply!(runtime.plans.clone_plan(&plan_id), |plan| Response::Plan { plan })
        }
        Request::GetTaskAssignments { plan_id } => {
            Response::Assignments { assignments: runtime.plans.assignments(&plan_id) }
        }
        Request::GetPlanActivities { plan_id } => {
            Response::Activities { activities: runtime.plans.activities(&plan_id) }
        }

        // -- headless --
        Request::GetHeadlessInfo { task_id } => {
            Response::HeadlessInfo { info: runtime.headless_info(&task_id) }
        }
        Request::ListHeadlessForPlan { plan_id } => {
            Response::HeadlessList { infos: runtime.headless_for_plan(&plan_id) }
        }
        Request::StopHeadless { task_id } => {
            runtime.stop_headless(&task_id);
            Response::Ok
        }
        Request::DestroyHeadless { task_id } => {
            runtime.destroy_headless(&task_id).await;
            Response::Ok
        }
        Request::StartStandaloneHeadless { directory, prompt, name } => {
            reply!(
                runtime.start_standalone_headless(directory, prompt, name).await,
                |task_id| Response::Task { task_id }
            )
        }
        Request::StandaloneConfirmDone { task_id } => {
            reply!(runtime.standalone_confirm_done(&task_id).await, |_| Response::Ok)
        }
        Request::StandaloneStartFollowup { task_id, prompt } => {
            reply!(
                runtime.standalone_start_followup(&task_id, prompt).await,
                |_| Response::Ok
            )
        }
        Request::StandaloneRestart { task_id } => {
            reply!(runtime.standalone_restart(&task_id).await, |_| Response::Ok)
        }

        // -- auth --
        Request::GetToken => Response::Token { token: runtime.get_token() },
        Request::SetToken { token } => reply!(runtime.set_token(&token), |_| Response::Ok),
        Request::HasToken => Response::Flag { value: runtime.has_token() },
        Request::ClearToken => {
            runtime.clear_token();
            Response::Ok
        }
        Request::RunSetup => reply!(runtime.run_token_setup().await, |_| Response::Ok),

        // -- repositories --
        Request::DetectRepo { path } => {
            reply!(runtime.detect_repo(&path).await, |repository| Response::Repo { repository })
        }
        Request::ListRepos => Response::Repos { repositories: runtime.list_repos() },
        Request::UpdateRepo {
            repo_id,
            purpose,
            completion_criteria,
            protected_branches,
            default_branch,
        } => {
            let patch =
                RepoPatch { purpose, completion_criteria, protected_branches, default_branch };
            reply!(runtime.update_repo(&repo_id, patch), |repository| Response::Repo {
                repository
            })
        }

        // -- tool proxy --
        Request::ProxyStart => reply!(runtime.proxy_start().await, |_| Response::Ok),
        Request::ProxyStop => {
            runtime.proxy_stop();
            Response::Ok
        }
        Request::ProxyIsRunning => Response::Flag { value: runtime.proxy_is_running() },
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
