use std::{fmt, pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

/// Which collaborator produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Simulated,
    Manual,
    Replay,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Simulated => "simulated",
            Origin::Manual => "manual",
            Origin::Replay => "replay",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub origin: Origin,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T, origin: Origin) -> Self {
        Self {
            payload,
            origin,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// One tick source wired through validation into a sink.
pub struct Pipeline<S, T, K> {
    pub name: &'static str,
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        tracing::info!(pipeline = self.name, "pipeline started");
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let res = self.sink.run(stream).await;
        match &res {
            Ok(()) => tracing::info!(pipeline = self.name, "pipeline finished"),
            Err(e) => tracing::error!(pipeline = self.name, error = %e, "pipeline failed"),
        }
        res
    }
}
