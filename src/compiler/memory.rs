//! Backing memory pools.
//!
//! One pool per [`MemoryLocation`]. A pool keeps its allocation across frames
//! and only grows: when a frame needs more than the largest size ever
//! allocated, the device is drained, the old allocation freed and a new one
//! made at the new watermark.

use std::fmt;
use std::sync::Arc;

use crate::device::{DeviceMemory, DeviceResult, GraphicsDevice, MemoryBinding};
use crate::types::MemoryLocation;

/// Growable allocation for one memory location.
#[derive(Debug)]
pub struct MemoryPool {
    location: MemoryLocation,
    memory: Option<DeviceMemory>,
    watermark: u64,
    reallocations: u32,
}

impl MemoryPool {
    /// Create an empty pool.
    pub fn new(location: MemoryLocation) -> Self {
        Self {
            location,
            memory: None,
            watermark: 0,
            reallocations: 0,
        }
    }

    /// Memory location served by this pool.
    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// Largest size ever allocated.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Current allocation.
    pub fn memory(&self) -> Option<&DeviceMemory> {
        self.memory.as_ref()
    }

    /// Number of times the pool (re)allocated.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }

    /// Make sure the pool holds at least `required` bytes.
    pub fn reserve(&mut self, device: &dyn GraphicsDevice, required: u64) -> DeviceResult<()> {
        if required <= self.watermark {
            return Ok(());
        }
        log::info!(
            "Growing {:?} pool from {} to {} bytes",
            self.location,
            self.watermark,
            required
        );
        device.wait_idle();
        if let Some(old) = self.memory.take() {
            device.free_memory(old);
            self.watermark = 0;
        }
        let memory = device.allocate_memory(required, self.location)?;
        self.memory = Some(memory);
        self.watermark = required;
        self.reallocations += 1;
        Ok(())
    }

    /// Bind resources into the current allocation.
    pub fn bind(&self, device: &dyn GraphicsDevice, bindings: &[MemoryBinding]) -> DeviceResult<()> {
        match &self.memory {
            Some(memory) if !bindings.is_empty() => device.bind_memory(memory, bindings),
            _ => Ok(()),
        }
    }

    /// Write bytes into the current allocation (host-visible pools only).
    pub fn write(&self, device: &dyn GraphicsDevice, offset: u64, data: &[u8]) -> DeviceResult<()> {
        match &self.memory {
            Some(memory) => device.write_memory(memory, offset, data),
            None => Ok(()),
        }
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(memory) = self.memory.take() {
            device.free_memory(memory);
        }
    }
}

/// Backing memory used by compiled frames.
///
/// A context is typically owned per frame in flight and passed to
/// [`FrameGraph::compile`](crate::FrameGraph::compile) every frame.
pub struct MemoryContext {
    device: Arc<dyn GraphicsDevice>,
    pools: [MemoryPool; 2],
}

impl MemoryContext {
    /// Create a context with empty pools.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            pools: MemoryLocation::ALL.map(MemoryPool::new),
        }
    }

    /// Largest size ever allocated for a location.
    pub fn watermark(&self, location: MemoryLocation) -> u64 {
        self.pool(location).watermark()
    }

    /// Pool of a location.
    pub fn pool(&self, location: MemoryLocation) -> &MemoryPool {
        &self.pools[location.index()]
    }

    pub(crate) fn pool_mut(&mut self, location: MemoryLocation) -> (&dyn GraphicsDevice, &mut MemoryPool) {
        (self.device.as_ref(), &mut self.pools[location.index()])
    }
}

impl fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryContext")
            .field("device", &self.device.name())
            .field("pools", &self.pools)
            .finish()
    }
}

impl Drop for MemoryContext {
    fn drop(&mut self) {
        let device = self.device.as_ref();
        for pool in &mut self.pools {
            pool.release(device);
        }
    }
}
