//! Producer Abstraction
//!
//! A producer is a long-running task that decides what one or more blocks
//! show. It gets a [`ProducerContext`] carrying its [`Emitter`] and the shared
//! cancellation token, and returns when it is done or when shutdown starts.
//!
//! Returning `Ok(())` early is fine: the supervisor retires the producer and
//! removes its blocks. Returning an error stops the whole bar.

use std::future::Future;

use async_trait::async_trait;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

use crate::emitter::Emitter;

/// A source of blocks
#[async_trait]
pub trait Producer: Send + 'static {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Run until done or cancelled
    ///
    /// Implementations should observe `ctx` at every suspension point and
    /// return promptly once it is cancelled.
    async fn run(self: Box<Self>, ctx: ProducerContext) -> anyhow::Result<()>;
}

/// Everything a running producer gets from the supervisor
#[derive(Clone, Debug)]
pub struct ProducerContext {
    emitter: Emitter,
    cancel: CancellationToken,
}

impl ProducerContext {
    /// Bundle an emitter with a cancellation token
    #[must_use]
    pub fn new(emitter: Emitter, cancel: CancellationToken) -> Self {
        Self { emitter, cancel }
    }

    /// The producer's emitter
    #[must_use]
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Whether shutdown has started
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once shutdown has started
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Clone of the cancellation token, for sub-tasks
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the next interval tick
    ///
    /// Returns false if shutdown started first. Typical loop:
    ///
    /// ```ignore
    /// let mut interval = tokio::time::interval(Duration::from_secs(1));
    /// while ctx.tick(&mut interval).await {
    ///     ctx.emitter().emit(render())?;
    /// }
    /// ```
    pub async fn tick(&self, interval: &mut Interval) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            _ = interval.tick() => true,
        }
    }
}

/// Producer built from a closure, see [`producer_fn`]
pub struct FnProducer<F> {
    name: String,
    run: F,
}

/// Wrap an async closure as a [`Producer`]
///
/// Handy for small producers and for tests:
///
/// ```ignore
/// supervisor.add_producer(producer_fn("hello", |ctx| async move {
///     ctx.emitter().emit(Block::new("00-hello").with_full_text("hi"))?;
///     ctx.cancelled().await;
///     anyhow::Ok(())
/// }));
/// ```
pub fn producer_fn<F, Fut>(name: impl Into<String>, run: F) -> FnProducer<F>
where
    F: FnOnce(ProducerContext) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnProducer {
        name: name.into(),
        run,
    }
}

#[async_trait]
impl<F, Fut> Producer for FnProducer<F>
where
    F: FnOnce(ProducerContext) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, ctx: ProducerContext) -> anyhow::Result<()> {
        let this = *self;
        (this.run)(ctx).await
    }
}
