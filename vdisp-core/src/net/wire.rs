//! Frames exchanged over the TCP substrate.
//!
//! # Wire Protocol
//!
//! ```text
//! Client ──[Call{id, endpoint, request}]──────► Server
//! Client ◄──────────[Reply{id, Response}]────── Server
//!
//! Client ──[Subscribe{id, topic}]─────────────► Server
//! Client ◄──────────[Reply{id, Subscribed}]──── Server
//! Client ◄──[Message{subscription: id, data}]── Server   (latched value first)
//! Client ──[Unsubscribe{subscription: id}]────► Server   (no reply)
//! ```
//!
//! Every request frame except `Unsubscribe` is answered by exactly one
//! `Reply` with the same id. Rejections carry the server's reason text.

use serde::{Deserialize, Serialize};

use crate::transport::{ParamValue, Request, Response};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    Call {
        id: u64,
        endpoint: String,
        request: Request,
    },
    HasEndpoint {
        id: u64,
        endpoint: String,
    },
    GetParam {
        id: u64,
        key: String,
    },
    SetParam {
        id: u64,
        key: String,
        value: ParamValue,
    },
    /// `id` doubles as the subscription id in later `Message` frames.
    Subscribe {
        id: u64,
        topic: String,
    },
    Unsubscribe {
        subscription: u64,
    },
    Publish {
        id: u64,
        topic: String,
        data: String,
    },
}

/// Successful answer to a request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Response(Response),
    Bool(bool),
    Param(Option<ParamValue>),
    Subscribed,
    Done,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    Reply {
        id: u64,
        result: Result<Reply, String>,
    },
    Message {
        subscription: u64,
        data: String,
    },
}
