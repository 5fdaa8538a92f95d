//! Plan compiler for Blockwright.
//!
//! Turns a source artifact into an ordered [`PlacementPlan`], its
//! [`MaterialHistogram`], and a content digest. Compilation is pure:
//! identical bytes and options always give an identical plan, which is what
//! makes resuming from a stored cursor safe.
//!
//! # Modules
//!
//! - [`raster`] -- images, nearest-neighbour resampling, colour matching
//! - [`blueprint`] -- Sponge schematics (gzip NBT)
//! - [`palette`] -- built-in material colour table
//! - [`digest`] -- SHA-256 plan digest
//! - [`library`] -- plan source directories
//! - [`error`] -- [`PlanError`]

pub mod blueprint;
pub mod digest;
pub mod error;
pub mod library;
pub mod palette;
pub mod raster;

use blockwright_types::{CompileOptions, MaterialHistogram, PlacementPlan, PlanSource};

pub use digest::plan_digest;
pub use error::PlanError;
pub use library::PlanLibrary;
pub use raster::RasterSettings;

/// Output of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPlan {
    /// Ordered ops.
    pub plan: PlacementPlan,
    /// Material totals of the whole plan.
    pub histogram: MaterialHistogram,
    /// Hex SHA-256 of the plan.
    pub digest: String,
}

/// Stateless compiler configured with raster limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanCompiler {
    settings: RasterSettings,
}

impl PlanCompiler {
    /// Compiler with the given raster settings.
    pub const fn new(settings: RasterSettings) -> Self {
        Self { settings }
    }

    /// Raster settings in effect.
    pub const fn settings(&self) -> &RasterSettings {
        &self.settings
    }

    /// Compile `bytes` according to the kind of `source`.
    ///
    /// Blueprints carry their own dimensions; `options` only affects images.
    pub fn compile(
        &self,
        source: &PlanSource,
        bytes: &[u8],
        options: &CompileOptions,
    ) -> Result<CompiledPlan, PlanError> {
        let plan = match source {
            PlanSource::Image { .. } => raster::compile_image(bytes, options, &self.settings)?,
            PlanSource::Blueprint { .. } => blueprint::compile_blueprint(bytes)?,
        };
        let histogram = plan.histogram();
        let digest = plan_digest(&plan);
        tracing::info!(
            source = %source,
            dimensions = %plan.dimensions(),
            total = plan.total_count(),
            materials = histogram.len(),
            "Plan compiled"
        );
        Ok(CompiledPlan {
            plan,
            histogram,
            digest,
        })
    }
}
