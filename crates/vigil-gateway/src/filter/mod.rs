//! Filter module.

mod logger;

pub use logger::LoggingFilter;

use std::collections::HashSet;
use std::sync::Arc;
use vigil_kernel::gateway::{
    FilterAction, GatewayContext, GatewayError, GatewayFilter, GatewayResponse,
};

/// Ordered list of boxed filters executed as a pipeline.
///
/// Filters are sorted by [`FilterOrder`](vigil_kernel::gateway::FilterOrder) in
/// ascending order (lowest value runs first on request path).
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from a list of filters, sorted by their declared order.
    ///
    /// Fails on an empty list or on two filters sharing a name.
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Result<Self, GatewayError> {
        if filters.is_empty() {
            return Err(GatewayError::EmptyFilterChain);
        }
        let mut names = HashSet::new();
        for filter in &filters {
            if !names.insert(filter.name().to_string()) {
                return Err(GatewayError::DuplicateFilter(filter.name().to_string()));
            }
        }

        // stable: equal orders keep registration order
        filters.sort_by_key(|f| f.order());
        Ok(Self { filters })
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run all filters' `on_request` hooks in ascending order.
    ///
    /// Returns `Ok(FilterAction::Continue)` if all filters continue.
    /// Short-circuits on the first `Reject` or `Redirect` action.
    pub async fn run_request(
        &self,
        ctx: &mut GatewayContext,
    ) -> Result<FilterAction, GatewayError> {
        for filter in &self.filters {
            match filter.on_request(ctx).await? {
                FilterAction::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(FilterAction::Continue)
    }

    /// Run all filters' `on_response` hooks in descending order
    /// (outermost filter last, so it can finalize latency, etc.).
    pub async fn run_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_kernel::gateway::{FilterOrder, GatewayRequest, HttpMethod};

    struct Fixed {
        name: &'static str,
        order: FilterOrder,
        action: FilterAction,
    }

    #[async_trait]
    impl GatewayFilter for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> FilterOrder {
            self.order
        }

        async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
            ctx.add_tag(self.name);
            Ok(self.action.clone())
        }

        async fn on_response(
            &self,
            _ctx: &GatewayContext,
            resp: &mut GatewayResponse,
        ) -> Result<(), GatewayError> {
            resp.headers.insert(format!("x-seen-{}", self.name), "1".into());
            Ok(())
        }
    }

    fn fixed(name: &'static str, order: FilterOrder, action: FilterAction) -> Arc<dyn GatewayFilter> {
        Arc::new(Fixed { name, order, action })
    }

    fn ctx() -> GatewayContext {
        GatewayContext::new(GatewayRequest::new("req-1", "/", HttpMethod::Get))
    }

    #[tokio::test]
    async fn runs_in_order_and_short_circuits() {
        let pipeline = FilterPipeline::new(vec![
            fixed("log", FilterOrder::LOGGING, FilterAction::Continue),
            fixed("auth", FilterOrder::AUTH, FilterAction::Reject(401, "Unauthorized".into())),
            fixed("pre", FilterOrder::PRE_AUTH, FilterAction::Continue),
        ])
        .unwrap();
        assert_eq!(pipeline.names(), vec!["pre", "auth", "log"]);

        let mut c = ctx();
        let action = pipeline.run_request(&mut c).await.unwrap();
        assert_eq!(action, FilterAction::Reject(401, "Unauthorized".into()));
        assert_eq!(c.tags, vec!["pre", "auth"]);
    }

    #[tokio::test]
    async fn response_hooks_see_every_filter() {
        let pipeline = FilterPipeline::new(vec![
            fixed("a", FilterOrder::AUTH, FilterAction::Continue),
            fixed("b", FilterOrder::LOGGING, FilterAction::Continue),
        ])
        .unwrap();
        let mut resp = GatewayResponse::new(200);
        pipeline.run_response(&ctx(), &mut resp).await.unwrap();
        assert!(resp.headers.contains_key("x-seen-a"));
        assert!(resp.headers.contains_key("x-seen-b"));
    }

    #[test]
    fn rejects_bad_chains() {
        assert!(matches!(
            FilterPipeline::new(Vec::new()),
            Err(GatewayError::EmptyFilterChain)
        ));
        let dup = FilterPipeline::new(vec![
            fixed("a", FilterOrder::AUTH, FilterAction::Continue),
            fixed("a", FilterOrder::LOGGING, FilterAction::Continue),
        ]);
        assert!(matches!(dup, Err(GatewayError::DuplicateFilter(name)) if name == "a"));
    }
}
