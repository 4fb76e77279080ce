pub mod error;
pub mod json_extract;
pub mod token_estimator;

pub use json_extract::extract_json_object;
pub use token_estimator::{estimator_for, TokenEstimator};
