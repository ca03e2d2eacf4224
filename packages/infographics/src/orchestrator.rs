//! Report assembly for one location.

use std::sync::Arc;

use accident_map_report_models::{LocationContext, Report, WidgetResult};
use futures::stream::{self, StreamExt as _};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::localize;
use crate::registry::{WidgetDescriptor, WidgetRegistry};
use crate::widget::DataSource;

/// Default number of widgets computed at once.
pub const DEFAULT_WIDGET_CONCURRENCY: usize = 4;

/// Hex SHA-256 of the serialized items.
#[must_use]
pub fn digest(items: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(items.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Runs the relevant widgets of a registry against a data source.
#[derive(Clone)]
pub struct WidgetOrchestrator {
    registry: Arc<WidgetRegistry>,
    source: Arc<dyn DataSource>,
    concurrency: usize,
}

impl WidgetOrchestrator {
    /// Creates an orchestrator computing up to `concurrency` widgets at once.
    /// Size it to the source's concurrent-connection budget.
    #[must_use]
    pub fn new(
        registry: Arc<WidgetRegistry>,
        source: Arc<dyn DataSource>,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// The registry widgets are drawn from.
    #[must_use]
    pub const fn registry(&self) -> &Arc<WidgetRegistry> {
        &self.registry
    }

    /// The data source widgets query.
    #[must_use]
    pub const fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Widgets that apply to `ctx` within one cache tier, in registration
    /// order.
    #[must_use]
    pub fn select(&self, ctx: &LocationContext, for_cache_tier: bool) -> Vec<&WidgetDescriptor> {
        self.registry
            .all_descriptors()
            .iter()
            .filter(|d| d.cacheable == for_cache_tier && d.is_relevant(ctx))
            .collect()
    }

    /// Computes every relevant widget of one tier and assembles them into an
    /// unlocalized report.
    ///
    /// A widget that fails or has nothing to show is left out; the others
    /// are unaffected.
    pub async fn assemble(&self, ctx: &LocationContext, for_cache_tier: bool) -> Report {
        let selected = self.select(ctx, for_cache_tier);
        let location_key = ctx.location_key();

        log::debug!(
            "Assembling {} {} widgets for {location_key}",
            selected.len(),
            if for_cache_tier { "cached-tier" } else { "live" }
        );

        let source = self.source.as_ref();
        let computed: Vec<_> = stream::iter(selected.into_iter().map(|descriptor| async move {
            let result = descriptor.widget.compute(ctx, source).await;
            (descriptor, result)
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut included = computed
            .into_iter()
            .filter_map(|(descriptor, result)| match result {
                Ok(items) if descriptor.widget.is_included(&items) => Some((descriptor, items)),
                Ok(_) => {
                    log::debug!("Widget {} has no data for {location_key}", descriptor.name);
                    None
                }
                Err(e) => {
                    log::warn!(
                        "Widget {} failed for {location_key}: {e}",
                        descriptor.name
                    );
                    None
                }
            })
            .collect::<Vec<_>>();
        included.sort_by_key(|(descriptor, _)| descriptor.order_key());

        let widgets = included
            .into_iter()
            .map(|(descriptor, items)| {
                let digest = digest(&items);
                WidgetResult::new(descriptor.name, descriptor.rank, items, digest)
            })
            .collect();

        Report::new(ctx, localize::location_text(ctx), widgets)
    }
}

impl std::fmt::Debug for WidgetOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetOrchestrator")
            .field("widgets", &self.registry.len())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
