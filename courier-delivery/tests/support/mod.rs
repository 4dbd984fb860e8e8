//! Provider test doubles shared by the integration tests

#![allow(dead_code, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use courier_delivery::{AttemptResult, Message, Provider, ProviderRegistry};
use parking_lot::Mutex;
use tokio::time::Instant;

pub const FIRST: &str = "user1@example.com";
pub const SECOND: &str = "user2@example.com";

/// A provider invocation as observed by a test double
#[derive(Debug, Clone)]
pub struct Call {
    pub provider: String,
    pub sender: String,
    pub at: Instant,
}

/// Invocations across every double sharing the log, in order
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    fn push(&self, provider: &str, message: &Message) {
        self.0.lock().push(Call {
            provider: provider.to_string(),
            sender: message.sender.clone(),
            at: Instant::now(),
        });
    }
}

/// Results handed out in order to whichever provider is called next, then
/// `default` once exhausted
#[derive(Debug, Clone)]
pub struct Script {
    results: Arc<Mutex<VecDeque<AttemptResult>>>,
    default: AttemptResult,
}

impl Script {
    pub fn new(results: impl IntoIterator<Item = AttemptResult>, default: AttemptResult) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into_iter().collect())),
            default,
        }
    }

    pub fn constant(result: AttemptResult) -> Self {
        Self::new([], result)
    }

    fn next(&self) -> AttemptResult {
        self.results.lock().pop_front().unwrap_or(self.default)
    }
}

/// Answers from a [`Script`] and records every call
pub struct ScriptedProvider {
    name: String,
    script: Script,
    log: CallLog,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            script,
            log,
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_send(&self, message: &Message) -> AttemptResult {
        self.log.push(&self.name, message);
        self.script.next()
    }
}

/// Never answers; records the call first
pub struct HangingProvider {
    name: String,
    log: CallLog,
}

impl HangingProvider {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
        }
    }
}

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_send(&self, message: &Message) -> AttemptResult {
        self.log.push(&self.name, message);
        std::future::pending().await
    }
}

/// Rejects until a shared budget of rejections is spent, then never answers
pub struct RejectThenHang {
    name: String,
    rejections: Arc<AtomicU32>,
    log: CallLog,
}

#[async_trait]
impl Provider for RejectThenHang {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_send(&self, message: &Message) -> AttemptResult {
        self.log.push(&self.name, message);

        let spent = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if spent.is_ok() {
            return AttemptResult::Rejected;
        }

        std::future::pending().await
    }
}

/// Two providers sharing one script and one call log
pub fn shared_pair(script: &Script) -> (Arc<ProviderRegistry>, CallLog) {
    let log = CallLog::default();
    let providers: [Arc<dyn Provider>; 2] = [
        Arc::new(ScriptedProvider::new(FIRST, script.clone(), log.clone())),
        Arc::new(ScriptedProvider::new(SECOND, script.clone(), log.clone())),
    ];

    (registry(providers), log)
}

/// Two providers that never answer
pub fn hanging_pair() -> (Arc<ProviderRegistry>, CallLog) {
    let log = CallLog::default();
    let providers: [Arc<dyn Provider>; 2] = [
        Arc::new(HangingProvider::new(FIRST, log.clone())),
        Arc::new(HangingProvider::new(SECOND, log.clone())),
    ];

    (registry(providers), log)
}

pub fn registry(providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::from_providers(providers).expect("unique provider names"))
}

/// Two providers that reject `rejections` calls between them, then hang
pub fn reject_then_hang_pair(rejections: u32) -> (Arc<ProviderRegistry>, CallLog) {
    let log = CallLog::default();
    let budget = Arc::new(AtomicU32::new(rejections));
    let providers: [Arc<dyn Provider>; 2] = [FIRST, SECOND].map(|name| {
        Arc::new(RejectThenHang {
            name: name.to_string(),
            rejections: budget.clone(),
            log: log.clone(),
        }) as Arc<dyn Provider>
    });

    (registry(providers), log)
}
