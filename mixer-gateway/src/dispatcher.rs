//! The dispatcher and cache processor: routes a typed request through an
//! ordered pipeline of processors. The concrete system uses exactly one processor (the
//! cache processor), but the [`Processor`] interface is general.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::{cache_key, decode_envelope, encode_envelope, DynCacheBackend};
use crate::requests::CacheableRequest;

/// Whether a processor handled the request itself or wants the pipeline to continue to
/// the next stage (and, after the last processor, the backend call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorOutcome {
    Continue,
    Done,
}

/// Per-request state threaded through the pipeline: the request itself, the skip-cache
/// marker carried on the request context (set from the `x-skip-cache` header), and the
/// response a processor installs on the context on a cache hit.
pub struct RequestContext<R: CacheableRequest> {
    pub request: R,
    pub skip_cache: bool,
    pub current_response: Option<R::Response>,
}

impl<R: CacheableRequest> RequestContext<R> {
    pub fn new(request: R, skip_cache: bool) -> Self {
        RequestContext {
            request,
            skip_cache,
            current_response: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Processor<R: CacheableRequest>: Send + Sync {
    async fn pre_process(&self, ctx: &mut RequestContext<R>) -> ProcessorOutcome;
    async fn post_process(&self, ctx: &mut RequestContext<R>);
}

/// The cache processor: consults the response cache on the way in, populates it on the
/// way out.
pub struct CacheProcessor {
    pub cache: DynCacheBackend,
    pub ttl: Duration,
    /// The self-describing type tag stamped on this request kind's cache envelope.
    pub type_tag: &'static str,
}

impl CacheProcessor {
    pub fn new(cache: DynCacheBackend, type_tag: &'static str) -> Self {
        CacheProcessor {
            cache,
            ttl: crate::cache::DEFAULT_TTL,
            type_tag,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait::async_trait]
impl<R: CacheableRequest> Processor<R> for CacheProcessor {
    #[instrument(skip(self, ctx))]
    async fn pre_process(&self, ctx: &mut RequestContext<R>) -> ProcessorOutcome {
        if ctx.skip_cache {
            return ProcessorOutcome::Continue;
        }
        let key = match cache_key(&ctx.request) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "failed to compute cache key, skipping cache");
                return ProcessorOutcome::Continue;
            }
        };
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match decode_envelope::<R::Response>(&bytes, self.type_tag) {
                Ok(response) => {
                    ctx.current_response = Some(response);
                    ProcessorOutcome::Done
                }
                Err(e) => {
                    warn!(error = %e, "cache hit decoded to a malformed envelope, treating as miss");
                    ProcessorOutcome::Continue
                }
            },
            Ok(None) => {
                debug!(key, "cache miss");
                ProcessorOutcome::Continue
            }
            Err(e) => {
                // Cache read errors are cache-transient: logged, never fatal.
                warn!(error = %e, "cache read failed");
                ProcessorOutcome::Continue
            }
        }
    }

    #[instrument(skip(self, ctx))]
    async fn post_process(&self, ctx: &mut RequestContext<R>) {
        if ctx.skip_cache {
            return;
        }
        let Some(response) = &ctx.current_response else {
            return;
        };
        let key = match cache_key(&ctx.request) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "failed to compute cache key, not caching response");
                return;
            }
        };
        let Ok(bytes) = encode_envelope(self.type_tag, response) else {
            warn!("failed to encode response for caching");
            return;
        };
        if let Err(e) = self.cache.set(&key, bytes, self.ttl).await {
            warn!(error = %e, "cache write failed");
        }
    }
}

/// Runs the pipeline end to end: PreProcess on every processor (short-circuiting on the
/// first `Done`), the backend call on a full miss, then PostProcess on every processor.
/// PreProcess always runs synchronously before any backend call, and PostProcess
/// synchronously after all backend calls complete.
pub async fn dispatch<R, F, Fut>(
    processors: &[Arc<dyn Processor<R>>],
    mut ctx: RequestContext<R>,
    backend: F,
) -> R::Response
where
    R: CacheableRequest,
    F: FnOnce(R) -> Fut,
    Fut: std::future::Future<Output = R::Response>,
{
    let mut done = false;
    for processor in processors {
        if processor.pre_process(&mut ctx).await == ProcessorOutcome::Done {
            done = true;
            break;
        }
    }

    if !done {
        let response = backend(ctx.request.clone()).await;
        ctx.current_response = Some(response);
    }

    for processor in processors {
        processor.post_process(&mut ctx).await;
    }

    ctx.current_response.expect("backend or cache always installs a response")
}
