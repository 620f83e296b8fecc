//! # Region Engine for Orthophoto Annotation
//!
//! The core of an interactive, semi-automatic delineation tool: raw binary
//! masks (from model inference or manual painting) become editable vector
//! regions that can be merged, split, refined, grouped and tracked across
//! edits.
//!
//! ## Core Features
//!
//! - **Dual representation**: every region is a polygon with holes whose
//!   mask is recomputed exactly on demand; the mask is canonical during any
//!   boolean operation, the polygon is the stored export artifact
//! - **Region algebra**: pure union/subtract/divide/dilate/erode/fill/
//!   attach operations over region values
//! - **Border editing**: a small state machine turning drawn polylines into
//!   border replacements, cuts and freehand regions
//! - **Versioned store**: id management, groups, point queries and
//!   snapshot-based undo/redo
//!
//! ## Quick Start
//!
//! ```rust
//! use image::{GrayImage, Luma};
//! use regions::{RegionAlgebra, RegionStore, VersionedHistory};
//!
//! // a mask produced by some segmentation tool
//! let mut mask = GrayImage::new(32, 32);
//! for y in 4..20 {
//!     for x in 4..20 {
//!         mask.put_pixel(x, y, Luma([255u8]));
//!     }
//! }
//!
//! let algebra = RegionAlgebra::new();
//! let mut store = RegionStore::new();
//! let mut history = VersionedHistory::new();
//!
//! history.record(&store);
//! let found = algebra.from_mask(&mask, (0, 0), 4)?;
//! store.add_all(found)?;
//!
//! assert_eq!(store.len(), 1);
//! history.undo(&mut store);
//! assert!(store.is_empty());
//! # Ok::<(), regions::RegionError>(())
//! ```

// Core modules
pub mod algebra;
pub mod border;
pub mod codec;
pub mod error;
pub mod history;
pub mod io;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use algebra::RegionAlgebra;
pub use border::{BorderEditor, DrawState};
pub use codec::{FillRule, MaskCodec};
pub use error::{RegionError, Result};
pub use history::VersionedHistory;
pub use io::*;
pub use store::{IdAllocator, RegionStore, StoreEvent, StoreObserver, StoreSnapshot};
pub use types::{BoundingBox, Group, Region, RegionGeometry, RegionMask, RegionRecord};
