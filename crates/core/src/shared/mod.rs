pub mod byte_buffer;
pub mod constants;
pub mod model_resolver;
