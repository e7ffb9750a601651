// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for the daemon socket.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

mod request;
mod response;
mod wire;

pub use request::Request;
pub use response::Response;
pub use wire::{
    encode, read_message, read_message_timeout, write_message, ProtocolError,
};

/// Map an engine error onto the wire error kinds.
pub fn error_response(e: &bm_engine::EngineError) -> Response {
    use bm_engine::EngineError as E;
    let kind = match e {
        E::NotFound(_) => "not_found",
        E::InvalidState(_) => "invalid_state",
        E::AlreadyExists(_) => "already_exists",
        E::ResourceUnavailable(_) => "resource_unavailable",
        E::ExternalTool(_) => "external_tool_failed",
        E::Timeout(_) => "timeout",
        E::Parse(_) => "parse_error",
        E::Persistence(_) => "persistence",
        E::Auth(_) => "auth",
    };
    Response::error(kind, e.to_string())
}
