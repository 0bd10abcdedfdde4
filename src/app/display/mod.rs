pub mod topology;
pub mod variant;
