pub mod loader;

pub use loader::{DataLoadError, load_catalog, load_engine_config, load_pack_dir, load_pack_file};
