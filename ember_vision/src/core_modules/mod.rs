pub mod color_segmenter;
pub mod contour;
pub mod decision_engine;
pub mod exclusion_filter;
pub mod flicker_tracker;
pub mod hsv;
pub mod motion_estimator;
pub mod optical_flow;
pub mod shape_classifier;
