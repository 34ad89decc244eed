pub mod memory_file;
pub mod path_file;
