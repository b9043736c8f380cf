//! gRPC service implementation for per-key id allocation.
//!
//! This module defines [`IdService`], the implementation of the
//! [`IdAllocator`] service from `hilo.proto`. Every request is served from a
//! single shared [`Registry`], so all requests for a key in this process share
//! one generator and its single-flight reservation.
//!
//! ## Responsibilities
//!
//! - Validate `NextId` / `NextIds` requests and enforce the batch limit.
//! - Map allocation failures onto gRPC status codes.
//! - Refuse new work and drain in-flight requests on shutdown.

use crate::server::{
    config::ServerConfig,
    telemetry::{
        increment_errors, increment_ids_issued, increment_requests, record_request_duration,
    },
};
use core::{future::Future, time::Duration};
use hilo_tonic_core::{
    Error,
    proto::{
        NextIdRequest, NextIdResponse, NextIdsRequest, NextIdsResponse,
        id_allocator_server::IdAllocator,
    },
    types::Registry,
};
use portable_atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

const NEXT_ID: &str = "next_id";
const NEXT_IDS: &str = "next_ids";

struct Lifecycle {
    /// Cancelled once shutdown starts; new requests are refused.
    draining: CancellationToken,
    /// Cancelled once the drain period is over; in-flight requests are
    /// abandoned.
    aborted: CancellationToken,
    inflight: AtomicUsize,
}

struct InflightGuard<'a>(&'a AtomicUsize);

impl<'a> InflightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// gRPC service handing out Hi-Lo allocated ids.
///
/// Cloning is cheap; clones share the registry and the shutdown state.
#[derive(Clone)]
pub struct IdService {
    config: ServerConfig,
    registry: Arc<Registry>,
    lifecycle: Arc<Lifecycle>,
}

impl IdService {
    pub fn new(config: ServerConfig, registry: Registry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            lifecycle: Arc::new(Lifecycle {
                draining: CancellationToken::new(),
                aborted: CancellationToken::new(),
                inflight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of requests currently being served.
    pub fn inflight(&self) -> usize {
        self.lifecycle.inflight.load(Ordering::Acquire)
    }

    /// Stops accepting requests and waits for in-flight ones.
    ///
    /// New requests fail with `UNAVAILABLE` immediately. Requests already
    /// running get up to `shutdown_timeout` to finish; any still running after
    /// that are abandoned with `UNAVAILABLE`. Abandoning a request mid
    /// reservation is harmless: at worst the reserved range goes unused.
    pub async fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.lifecycle.draining.cancel();

        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight requests ({} active)", self.inflight());
        let drained = timeout(self.config.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight requests drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} requests still active)",
                    self.inflight()
                );
            }
        }

        self.lifecycle.aborted.cancel();
    }

    /// Runs `work` unless the service is shutting down.
    async fn serve<T>(&self, work: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        let _inflight = InflightGuard::enter(&self.lifecycle.inflight);
        if self.lifecycle.draining.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        tokio::select! {
            biased;
            () = self.lifecycle.aborted.cancelled() => Err(Error::ServiceShutdown),
            result = work => result,
        }
    }

    fn validate_key(key: &str) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "Key must not be empty".to_owned(),
            });
        }
        Ok(())
    }

    fn validate_count(&self, count: u32) -> Result<usize, Error> {
        if count == 0 {
            return Err(Error::InvalidRequest {
                reason: "Count must be greater than 0".to_owned(),
            });
        }
        if count > self.config.max_batch {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Count {count} exceeds maximum allowed ({})",
                    self.config.max_batch
                ),
            });
        }
        Ok(count as usize)
    }
}

/// Records duration, issued ids and failures for one request.
fn finish<T>(
    method: &'static str,
    start: Instant,
    result: Result<T, Error>,
    issued: impl FnOnce(&T) -> usize,
) -> Result<T, Status> {
    record_request_duration(method, start.elapsed().as_secs_f64() * 1_000.0);
    match result {
        Ok(value) => {
            increment_ids_issued(method, issued(&value) as u64);
            Ok(value)
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("{method} failed: {e}");
            let status = Status::from(e);
            increment_errors(method, status.code());
            Err(status)
        }
    }
}

#[tonic::async_trait]
impl IdAllocator for IdService {
    /// Returns the next id for a key.
    ///
    /// Usually answered from the key's held range without touching the store.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(key = %req.get_ref().key)))]
    async fn next_id(
        &self,
        req: Request<NextIdRequest>,
    ) -> Result<Response<NextIdResponse>, Status> {
        let start = Instant::now();
        increment_requests(NEXT_ID);
        let NextIdRequest { key } = req.into_inner();

        let result = self
            .serve(async {
                Self::validate_key(&key)?;
                Ok::<_, Error>(self.registry.next_id(&key).await?)
            })
            .await;

        finish(NEXT_ID, start, result, |_| 1).map(|id| Response::new(NextIdResponse { id }))
    }

    /// Returns `count` strictly increasing ids for a key.
    ///
    /// The ids are only contiguous when no other request for the key
    /// interleaves and no chunk boundary is crossed.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(key = %req.get_ref().key, count = req.get_ref().count)))]
    async fn next_ids(
        &self,
        req: Request<NextIdsRequest>,
    ) -> Result<Response<NextIdsResponse>, Status> {
        let start = Instant::now();
        increment_requests(NEXT_IDS);
        let NextIdsRequest { key, count } = req.into_inner();

        let result = self
            .serve(async {
                Self::validate_key(&key)?;
                let count = self.validate_count(count)?;
                Ok::<_, Error>(self.registry.next_ids(&key, count).await?)
            })
            .await;

        finish(NEXT_IDS, start, result, Vec::len).map(|ids| Response::new(NextIdsResponse { ids }))
    }
}
