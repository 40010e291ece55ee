//! Scripted resolver for tests
//!
//! Replies are consumed in order; once exhausted the last reply repeats.
//! Every call is counted and its request kept for inspection.

use async_trait::async_trait;
use pcm_matcher::models::ConfidenceTier;
use pcm_matcher::services::{Resolver, ResolverError, ResolverProposal, ResolverRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Scripted {
    /// Propose this label with High confidence
    Label(&'static str),
    /// Propose nothing
    Empty,
    /// Fail with a malformed-response error
    Malformed,
    /// Sleep before proposing (exercises the caller timeout)
    Slow(Duration, &'static str),
}

pub struct MockResolver {
    replies: Mutex<Vec<Scripted>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ResolverRequest>>,
}

impl MockResolver {
    pub fn new(replies: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Scripted) -> Self {
        Self::new(vec![reply])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ResolverRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Scripted {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or(Scripted::Empty)
        }
    }
}

fn proposal(label: &str) -> ResolverProposal {
    ResolverProposal {
        label: Some(label.to_string()),
        confidence: ConfidenceTier::High,
        rationale: format!("matched {}", label),
        model: Some("mock-model".to_string()),
        usage: None,
    }
}

#[async_trait]
impl Resolver for MockResolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn propose(&self, request: &ResolverRequest) -> Result<ResolverProposal, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match self.next_reply() {
            Scripted::Label(label) => Ok(proposal(label)),
            Scripted::Empty => Ok(ResolverProposal::empty("no candidate fits")),
            Scripted::Malformed => Err(ResolverError::ParseError("no JSON object in response".to_string())),
            Scripted::Slow(delay, label) => {
                tokio::time::sleep(delay).await;
                Ok(proposal(label))
            }
        }
    }
}
