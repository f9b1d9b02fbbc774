//! Topic-keyed event bus with wildcard subscriptions.
//!
//! Handlers are registered under a topic string. A topic containing `*` is a
//! pattern: `*` matches any run of characters, so `Queue.Worker.Process:*`
//! receives every job notification. Dispatch runs exact-topic handlers first,
//! then matching pattern handlers, each group in registration order. Any
//! handler may return [`Propagation::Stop`] to end the dispatch early.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type HandlerFn<E> =
    dyn for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<Propagation>> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

impl From<bool> for Propagation {
    fn from(stop: bool) -> Self {
        if stop {
            Propagation::Stop
        } else {
            Propagation::Continue
        }
    }
}

pub fn boxed<'a, T>(fut: impl Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}

pub struct EventBus<E> {
    exact: HashMap<String, Vec<Arc<HandlerFn<E>>>>,
    patterns: Vec<(String, Arc<HandlerFn<E>>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut topics: Vec<&str> = self.exact.keys().map(String::as_str).collect();
        topics.sort_unstable();
        f.debug_struct("EventBus")
            .field("topics", &topics)
            .field(
                "patterns",
                &self.patterns.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, topic: &str, handler: F)
    where
        F: for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<Propagation>>
            + Send
            + Sync
            + 'static,
    {
        let handler: Arc<HandlerFn<E>> = Arc::new(handler);
        if topic.contains('*') {
            self.patterns.push((topic.to_string(), handler));
        } else {
            self.exact
                .entry(topic.to_string())
                .or_default()
                .push(handler);
        }
    }

    pub fn has_listeners(&self, topic: &str) -> bool {
        self.exact.get(topic).is_some_and(|h| !h.is_empty())
            || self.patterns.iter().any(|(p, _)| topic_matches(p, topic))
    }

    /// Run every handler for `topic` against `event`.
    ///
    /// Returns `Ok(true)` when a handler stopped propagation. A handler error
    /// aborts the dispatch and is returned as is.
    pub async fn dispatch(&self, topic: &str, event: &E) -> anyhow::Result<bool> {
        let exact = self.exact.get(topic).into_iter().flatten();
        let patterns = self
            .patterns
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, topic))
            .map(|(_, handler)| handler);

        for handler in exact.chain(patterns) {
            if handler(event).await? == Propagation::Stop {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Glob match where `*` stands for any (possibly empty) run of characters.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = topic.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn wildcard_matching() {
        assert!(topic_matches("*", "Queue.Worker.Process:Anything"));
        assert!(topic_matches("Queue.Worker.Process:*", "Queue.Worker.Process:TestWork"));
        assert!(topic_matches("Queue.Worker.Process:*", "Queue.Worker.Process:"));
        assert!(topic_matches("Queue.*.Process:Test*", "Queue.Worker.Process:TestWork"));
        assert!(!topic_matches("Queue.Worker.Process:*", "Queue.Worker.Loop"));
        assert!(!topic_matches("Queue.Worker.Loop", "Queue.Worker.Loop2"));
        assert!(topic_matches("a*b*c", "aXXbYYbc"));
    }

    #[tokio::test]
    async fn exact_handlers_run_before_patterns_and_stop_interrupts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus: EventBus<u32> = EventBus::new();

        let s = seen.clone();
        bus.on("job:*", move |n| {
            let s = s.clone();
            boxed(async move {
                s.lock().unwrap().push(format!("pattern:{n}"));
                Ok(Propagation::Continue)
            })
        });
        let s = seen.clone();
        bus.on("job:a", move |n| {
            let s = s.clone();
            boxed(async move {
                s.lock().unwrap().push(format!("exact:{n}"));
                Ok(Propagation::from(*n == 2))
            })
        });

        assert!(!bus.dispatch("job:a", &1).await.unwrap());
        assert!(bus.dispatch("job:a", &2).await.unwrap());
        assert!(!bus.dispatch("job:b", &3).await.unwrap());
        assert!(!bus.dispatch("other", &4).await.unwrap());

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["exact:1", "pattern:1", "exact:2", "pattern:3"]
        );
    }

    #[tokio::test]
    async fn handler_errors_abort_dispatch() {
        let mut bus: EventBus<()> = EventBus::new();
        bus.on("t", |_| boxed(async { anyhow::bail!("boom") }));
        bus.on("t", |_| boxed(async { Ok(Propagation::Stop) }));

        let err = bus.dispatch("t", &()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(bus.has_listeners("t"));
        assert!(!bus.has_listeners("u"));
    }
}
