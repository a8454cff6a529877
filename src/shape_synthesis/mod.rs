//! Decorative route shapes: balanced clusters, loops around them, smoothing
//! and the quadrant layout that keeps the four loops apart.

pub mod cluster;
pub mod layout;
pub mod shape;
pub mod smoothing;
