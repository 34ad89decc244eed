pub mod temp_file_locator_store;
