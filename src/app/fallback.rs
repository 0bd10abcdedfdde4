//! Ordered "first success wins" runner shared by capture candidates, dump forms and
//! hierarchy sources.

use std::fmt;

use tracing::{debug, warn};

type Strategy<'a, T> = Box<dyn FnMut() -> Result<T, String> + 'a>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub label: String,
    pub error: String,
}

#[derive(Debug)]
pub struct Resolved<T> {
    pub value: T,
    pub label: String,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub chain: String,
    pub failures: Vec<Failure>,
}

impl Exhausted {
    pub fn last_error(&self) -> Option<&str> {
        self.failures.last().map(|failure| failure.error.as_str())
    }
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.last() {
            Some(last) => write!(
                f,
                "{} exhausted after {} attempt(s); last `{}`: {}",
                self.chain,
                self.failures.len(),
                last.label,
                last.error
            ),
            None => write!(f, "{} has no strategies", self.chain),
        }
    }
}

pub struct FallbackChain<'a, T> {
    name: String,
    strategies: Vec<(String, Strategy<'a, T>)>,
}

impl<'a, T> FallbackChain<'a, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        label: impl Into<String>,
        strategy: impl FnMut() -> Result<T, String> + 'a,
    ) -> &mut Self {
        self.strategies.push((label.into(), Box::new(strategy)));
        self
    }

    /// Runs strategies in insertion order and stops at the first `Ok`.
    pub fn run(self, trace_id: &str) -> Result<Resolved<T>, Exhausted> {
        let mut failures = Vec::new();
        for (label, mut strategy) in self.strategies {
            match strategy() {
                Ok(value) => {
                    debug!(
                        trace_id = %trace_id,
                        chain = %self.name,
                        candidate = %label,
                        skipped = failures.len(),
                        "strategy succeeded"
                    );
                    return Ok(Resolved {
                        value,
                        label,
                        failures,
                    });
                }
                Err(error) => {
                    debug!(
                        trace_id = %trace_id,
                        chain = %self.name,
                        candidate = %label,
                        error = %error,
                        "strategy failed"
                    );
                    failures.push(Failure { label, error });
                }
            }
        }
        let exhausted = Exhausted {
            chain: self.name,
            failures,
        };
        warn!(trace_id = %trace_id, error = %exhausted, "fallback chain exhausted");
        Err(exhausted)
    }
}
