//! Image-side pipeline stages: stitching, splitting, masking, layout, and
//! final composition. Each stage is a pure function over images and region
//! records so it can be tested without any remote collaborator.

pub mod composer;
pub mod layout_solver;
pub mod mask_builder;
pub mod smart_split;
pub mod stitcher;
