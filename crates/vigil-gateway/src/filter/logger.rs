//! Structured access-logging filter.
//!
//! Emits `tracing` events on both the request and response path, recording
//! path, method, request id, admission tags, response status and latency.

use async_trait::async_trait;
use tracing::{info, warn};
use vigil_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayError, GatewayFilter, GatewayResponse,
};

const START_ATTR: &str = "log.request_start_ms";

/// Records inbound requests and admission decisions.
#[derive(Default)]
pub struct LoggingFilter;

impl LoggingFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    // Runs ahead of the gate so rejected requests are timed too.
    fn order(&self) -> FilterOrder {
        FilterOrder::PRE_AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        info!(
            request_id  = %ctx.request.id,
            method      = ctx.request.method.as_str(),
            path        = %ctx.request.path,
            "→ inbound request"
        );
        ctx.set_attr(START_ATTR, &now_ms());
        Ok(FilterAction::Continue)
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        let start_ms: u64 = ctx.get_attr(START_ATTR).unwrap_or(0);
        let elapsed = now_ms().saturating_sub(start_ms);

        if resp.status >= 400 {
            warn!(
                request_id  = %ctx.request.id,
                path        = %ctx.request.path,
                status      = resp.status,
                tags        = ?ctx.tags,
                latency_ms  = elapsed,
                "← request refused"
            );
        } else {
            info!(
                request_id  = %ctx.request.id,
                path        = %ctx.request.path,
                status      = resp.status,
                latency_ms  = elapsed,
                "← request admitted"
            );
        }

        resp.latency_ms = elapsed;
        Ok(())
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_kernel::gateway::{GatewayRequest, HttpMethod};

    #[tokio::test]
    async fn records_start_and_latency() {
        let filter = LoggingFilter::new();
        let mut ctx = GatewayContext::new(GatewayRequest::new("req-1", "/", HttpMethod::Get));

        assert_eq!(filter.on_request(&mut ctx).await.unwrap(), FilterAction::Continue);
        assert!(ctx.get_attr::<u64>(START_ATTR).is_some());

        let mut resp = GatewayResponse::new(401);
        filter.on_response(&ctx, &mut resp).await.unwrap();
        assert!(resp.latency_ms < 60_000);
    }
}
