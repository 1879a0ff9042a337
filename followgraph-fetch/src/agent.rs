use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.67",
];

pub trait UserAgentProvider: Send + Sync {
    /// The agent to send with the next request. Implementations may rotate on every call.
    fn current_user_agent(&self) -> String;
}

/// Hands out user agents round-robin.
#[derive(Debug)]
pub struct UserAgentRotation {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentRotation {
    /// An empty list falls back to the built-in browser agents.
    pub fn new(agents: Vec<String>) -> Self {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        if agents.is_empty() {
            return Self::default();
        }

        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentRotation {
    fn default() -> Self {
        Self {
            agents: DEFAULT_USER_AGENTS.iter().map(|a| a.to_string()).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl UserAgentProvider for UserAgentRotation {
    fn current_user_agent(&self) -> String {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        self.agents[idx].clone()
    }
}
