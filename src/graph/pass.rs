//! Pass declarations.

use std::fmt;

use crate::compiler::PassContext;

use super::{Framebuffer, ViewRef};

/// Closure executed when the compiled graph is replayed.
pub type PassFn = Box<dyn FnMut(&mut PassContext<'_>) + Send>;

/// Execution hint of a pass.
///
/// The hint selects the queue class a backend would use and whether the pass
/// takes part in resource tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassHint {
    /// Rasterization; may carry a framebuffer.
    Raster,
    /// Compute shaders.
    Compute,
    /// Copy operations.
    Transfer,
    /// Ray tracing shaders.
    RayTracing,
    /// Executed verbatim, bypassing resource tracking (markers, raw commands).
    Immediate,
}

impl PassHint {
    /// Returns true if the pass takes part in resource tracking.
    pub fn is_tracked(self) -> bool {
        self != Self::Immediate
    }
}

/// Index of a pass in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassIndex(pub(crate) u32);

impl PassIndex {
    /// Numeric index.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Resources a pass accesses.
///
/// # Example
///
/// ```ignore
/// let params = PassParams::new()
///     .with_view(gbuffer_read)
///     .with_view(lights_cbv)
///     .with_framebuffer(Framebuffer::new().with_color(hdr_target));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassParams {
    /// Views accessed by shaders or copies, in binding order.
    pub views: Vec<ViewRef>,
    /// Render attachments (raster passes only).
    pub framebuffer: Option<Framebuffer>,
}

impl PassParams {
    /// Create empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accessed view.
    pub fn with_view(mut self, view: ViewRef) -> Self {
        self.views.push(view);
        self
    }

    /// Add several accessed views.
    pub fn with_views(mut self, views: impl IntoIterator<Item = ViewRef>) -> Self {
        self.views.extend(views);
        self
    }

    /// Attach a framebuffer.
    pub fn with_framebuffer(mut self, framebuffer: Framebuffer) -> Self {
        self.framebuffer = Some(framebuffer);
        self
    }

    /// Every view referenced, bindings first then attachments.
    pub fn all_views(&self) -> impl Iterator<Item = ViewRef> + '_ {
        self.views.iter().copied().chain(
            self.framebuffer
                .iter()
                .flat_map(|fb| fb.attachments().map(|a| a.view)),
        )
    }
}

/// A declared pass.
pub struct Pass {
    /// Debug name; used for the marker bracketing the pass.
    pub name: String,
    /// Execution hint.
    pub hint: PassHint,
    /// Accessed views and attachments.
    pub params: PassParams,
    pub(crate) execute: Option<PassFn>,
}

impl Pass {
    pub(crate) fn new(
        name: impl Into<String>,
        params: PassParams,
        hint: PassHint,
        execute: PassFn,
    ) -> Self {
        Self {
            name: name.into(),
            hint,
            params,
            execute: Some(execute),
        }
    }

    /// Returns true if the pass renders into a framebuffer.
    pub fn is_raster_with_framebuffer(&self) -> bool {
        self.hint == PassHint::Raster && self.params.framebuffer.is_some()
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("hint", &self.hint)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
