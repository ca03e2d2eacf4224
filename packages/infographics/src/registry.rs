//! Widget registry.
//!
//! Populated once during startup, then frozen behind an `Arc` and handed to
//! the orchestrator. Registration order is kept and breaks rank ties.

use std::sync::{Arc, OnceLock};

use accident_map_report_models::LocationContext;

use crate::widget::Widget;

/// A registered widget and its registration position.
#[derive(Clone)]
pub struct WidgetDescriptor {
    /// Unique widget name.
    pub name: &'static str,
    /// Display order.
    pub rank: i32,
    /// Whether the widget belongs to the cached tier.
    pub cacheable: bool,
    /// Position in registration order.
    pub index: usize,
    /// The widget itself.
    pub widget: Arc<dyn Widget>,
}

impl WidgetDescriptor {
    /// Whether the widget applies to `ctx`.
    #[must_use]
    pub fn is_relevant(&self, ctx: &LocationContext) -> bool {
        self.widget.is_relevant(ctx)
    }

    /// Sort key: rank, then registration order.
    #[must_use]
    pub const fn order_key(&self) -> (i32, usize) {
        (self.rank, self.index)
    }
}

impl std::fmt::Debug for WidgetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetDescriptor")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("cacheable", &self.cacheable)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Table of widgets by name, in registration order.
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    descriptors: Vec<WidgetDescriptor>,
}

impl WidgetRegistry {
    /// An empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Registers `widget` and returns its descriptor.
    ///
    /// A second registration under an existing name is logged and ignored;
    /// the first registration stays and is returned.
    pub fn register(&mut self, widget: Arc<dyn Widget>) -> &WidgetDescriptor {
        let name = widget.name();

        if let Some(pos) = self.position(name) {
            log::warn!("Widget {name} is already registered; ignoring duplicate registration");
            return &self.descriptors[pos];
        }

        let index = self.descriptors.len();
        self.descriptors.push(WidgetDescriptor {
            name,
            rank: widget.rank(),
            cacheable: widget.is_cacheable(),
            index,
            widget,
        });
        &self.descriptors[index]
    }

    /// Builder-style [`Self::register`].
    #[must_use]
    pub fn with(mut self, widget: Arc<dyn Widget>) -> Self {
        self.register(widget);
        self
    }

    /// Every descriptor, in registration order.
    #[must_use]
    pub fn all_descriptors(&self) -> &[WidgetDescriptor] {
        &self.descriptors
    }

    /// Descriptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WidgetDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Registration position of `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    /// Number of registered widgets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

static BUILTIN: OnceLock<Arc<WidgetRegistry>> = OnceLock::new();

/// The process-wide registry of built-in widgets, built on first use.
#[must_use]
pub fn builtin() -> Arc<WidgetRegistry> {
    Arc::clone(BUILTIN.get_or_init(|| {
        let mut registry = WidgetRegistry::new();
        crate::widgets::register_builtin(&mut registry);
        log::debug!("Registered {} built-in widgets", registry.len());
        Arc::new(registry)
    }))
}

#[cfg(test)]
mod tests {
    use accident_map_report_models::LocationContext;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::widget::{DataSource, WidgetError};

    const EXPECTED_WIDGET_COUNT: usize = 16;

    struct Fixed {
        name: &'static str,
        rank: i32,
    }

    #[async_trait]
    impl Widget for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn rank(&self) -> i32 {
            self.rank
        }

        fn is_relevant(&self, _ctx: &LocationContext) -> bool {
            true
        }

        async fn compute(
            &self,
            _ctx: &LocationContext,
            _source: &dyn DataSource,
        ) -> Result<Value, WidgetError> {
            Ok(json!([self.rank]))
        }
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let mut registry = WidgetRegistry::new();
        registry.register(Arc::new(Fixed { name: "a", rank: 1 }));
        registry.register(Arc::new(Fixed { name: "b", rank: 2 }));
        let kept = registry.register(Arc::new(Fixed { name: "a", rank: 9 }));

        assert_eq!(kept.rank, 1);
        assert_eq!(kept.index, 0);
        assert_eq!(registry.len(), 2);

        let names = registry
            .all_descriptors()
            .iter()
            .map(|d| d.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn registers_all_builtin_widgets() {
        assert_eq!(builtin().len(), EXPECTED_WIDGET_COUNT);
    }

    #[test]
    fn builtin_widget_names_are_unique() {
        let registry = builtin();
        let mut names = registry
            .all_descriptors()
            .iter()
            .map(|d| d.name)
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EXPECTED_WIDGET_COUNT);
    }

    #[test]
    fn builtin_widgets_have_labels() {
        for descriptor in builtin().all_descriptors() {
            let title =
                crate::localize::title(descriptor.name, accident_map_accident_models::Language::En);
            assert_ne!(
                title,
                format!("{}.title", descriptor.name),
                "{} has no title",
                descriptor.name
            );
        }
    }

    #[test]
    fn builtin_is_shared() {
        assert!(Arc::ptr_eq(&builtin(), &builtin()));
    }
}
