pub mod file_decoder;
pub mod raw_file;
