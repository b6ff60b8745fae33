//! Heap configuration.

use crate::error::{Error, Result};

/// Largest supported attribute bucket exponent (65536 buckets).
pub const MAX_ATTR_BUCKET_BITS: u32 = 16;

/// Tunables for a [`Heap`](crate::Heap). All fields have working defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Attribute maps use `1 << attr_bucket_bits` buckets and never grow.
    pub attr_bucket_bits: u32,
    /// Upper bound on live nodes; `None` means bounded only by memory.
    pub max_nodes: Option<usize>,
    /// Record debug labels on nodes (string content, type names).
    pub debug_tags: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attr_bucket_bits: 4,
            max_nodes: None,
            debug_tags: cfg!(debug_assertions),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attr_bucket_bits(mut self, bits: u32) -> Self {
        self.attr_bucket_bits = bits;
        self
    }

    pub fn with_max_nodes(mut self, limit: usize) -> Self {
        self.max_nodes = Some(limit);
        self
    }

    pub fn with_debug_tags(mut self, enabled: bool) -> Self {
        self.debug_tags = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.attr_bucket_bits > MAX_ATTR_BUCKET_BITS {
            return Err(Error::Config(format!(
                "attr_bucket_bits must be at most {}, got {}",
                MAX_ATTR_BUCKET_BITS, self.attr_bucket_bits
            )));
        }
        if self.max_nodes == Some(0) {
            return Err(Error::Config("max_nodes must be non-zero".to_string()));
        }
        Ok(())
    }
}
