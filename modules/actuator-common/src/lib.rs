pub mod config;

pub use config::{
    load_config, load_or_default, DispatcherConfig, FileConfig, LoggingConfig, ReaderSection,
};
