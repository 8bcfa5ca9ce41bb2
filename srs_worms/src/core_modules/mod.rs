pub mod contour;
pub mod endpoints;
pub mod fiji;
pub mod field_norm;
pub mod filename;
pub mod geometry;
pub mod hyperstack;
pub mod labeling;
pub mod layout;
pub mod mask_ops;
pub mod morphology;
pub mod spline;
pub mod stack;
pub mod tiles;
pub mod unmix;
