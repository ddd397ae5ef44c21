// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Best-effort status fan-out.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use serde_json::Value;

/// Best-effort fan-out of job snapshots to live subscribers. Delivery is
/// ordered per job (each job has a single writer) but carries no
/// guarantee when nobody is subscribed.
pub trait UpdatePublisher: Send + Sync {
    fn publish(&self, job_id: &str, snapshot: Value);
}

/// Channel-backed publisher. Subscribers attach per job id and receive
/// every snapshot published after they attach; disconnected receivers are
/// pruned on the next publish.
#[derive(Debug, Default)]
pub struct ChannelPublisher {
    subscribers: Mutex<HashMap<String, Vec<Sender<Value>>>>,
}

impl ChannelPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, job_id: &str) -> Receiver<Value> {
        let (tx, rx) = mpsc::channel();
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.entry(job_id.to_owned()).or_default().push(tx);
        rx
    }
}

impl UpdatePublisher for ChannelPublisher {
    fn publish(&self, job_id: &str, snapshot: Value) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(senders) = subscribers.get_mut(job_id) {
            senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
            if senders.is_empty() {
                subscribers.remove(job_id);
            }
        }
    }
}
