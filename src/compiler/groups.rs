//! Resource-group cache.

use std::collections::HashMap;

use crate::device::{DeviceResult, GraphicsDevice, ResourceGroupHandle, ResourceGroupLayout};

/// Resource groups keyed by the binding layout of the passes that use them.
///
/// Private to one frame graph and kept across frames.
#[derive(Debug, Default)]
pub struct ResourceGroupCache {
    groups: HashMap<ResourceGroupLayout, ResourceGroupHandle>,
}

impl ResourceGroupCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the group for `layout`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        layout: &ResourceGroupLayout,
    ) -> DeviceResult<ResourceGroupHandle> {
        if let Some(group) = self.groups.get(layout) {
            return Ok(*group);
        }
        let group = device.create_resource_group(layout)?;
        log::debug!(
            "Created resource group {:?} for {} bindings",
            group,
            layout.bindings.len()
        );
        self.groups.insert(layout.clone(), group);
        Ok(group)
    }

    /// Number of cached groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
