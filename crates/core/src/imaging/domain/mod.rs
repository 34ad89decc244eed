pub mod image_resource;
pub mod image_resource_manager;
pub mod locator;
