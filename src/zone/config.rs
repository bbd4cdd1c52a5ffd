//! Zone manager configuration

/// Default depth of every region in a zone (`2^10` pages, 4 MiB with 4 KiB pages)
pub const DEFAULT_ZONE_MIN_ORDER: usize = 10;

/// Default number of buddy regions in a zone
pub const DEFAULT_INSTANCE_COUNT: usize = 4;

/// Construction parameters of a [`ZoneManager`](super::ZoneManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Number of same-sized buddy regions.
    pub instance_count: usize,
    /// Depth of every region's tree; each region spans `2^min_order` pages.
    pub min_order: usize,
    /// Requests with `order >= fast_path_threshold` are small and go to the fast pool.
    pub fast_path_threshold: usize,
    /// Number of regions reserved for small requests. `None` picks half of
    /// the regions, leaving at least one slow-path region when there are two
    /// or more.
    pub fast_path_instances: Option<usize>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            instance_count: DEFAULT_INSTANCE_COUNT,
            min_order: DEFAULT_ZONE_MIN_ORDER,
            fast_path_threshold: DEFAULT_ZONE_MIN_ORDER - 2,
            fast_path_instances: None,
        }
    }
}

impl ZoneConfig {
    pub const fn with_instance_count(mut self, instance_count: usize) -> Self {
        self.instance_count = instance_count;
        self
    }

    pub const fn with_min_order(mut self, min_order: usize) -> Self {
        self.min_order = min_order;
        self
    }

    pub const fn with_fast_path_threshold(mut self, threshold: usize) -> Self {
        self.fast_path_threshold = threshold;
        self
    }

    pub const fn with_fast_path_instances(mut self, count: usize) -> Self {
        self.fast_path_instances = Some(count);
        self
    }

    /// Number of fast-path regions this configuration produces.
    pub fn fast_path_count(&self) -> usize {
        match self.fast_path_instances {
            Some(count) => count,
            None if self.instance_count <= 1 => 0,
            None => (self.instance_count / 2).max(1),
        }
    }

    /// Panics on a configuration no zone can be built from.
    pub(crate) fn validate(&self) {
        assert!(self.instance_count > 0, "zone needs at least one instance");
        assert!(
            self.fast_path_count() <= self.instance_count,
            "{} fast-path instances requested out of {}",
            self.fast_path_count(),
            self.instance_count
        );
        assert!(
            self.fast_path_threshold <= self.min_order,
            "fast-path threshold order {} exceeds min order {}",
            self.fast_path_threshold,
            self.min_order
        );
    }
}
