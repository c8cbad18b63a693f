// Analytics over the match record store: career statistics, point-in-time
// features, category encodings, the runs regressor, and the serving path.

pub mod artifacts;
pub mod encoding;
pub mod features;
pub mod model;
pub mod predict;
pub mod stats;
pub mod training;
