pub mod detection_capability;
pub mod detector_gateway;
pub mod face;
