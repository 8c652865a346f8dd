
mod closed_loop;


#[cfg(feature = "allow_filesystem")]
mod config_file;
